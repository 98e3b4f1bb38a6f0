//! Flat CSV form of processed transactions, used as the persisted store.

use super::country::CountryCode;
use super::transaction::{
    CanonicalTransaction, ProcessedTransaction, Side, Subtype, TransactionType,
};
use super::warnings::Warning;
use brokertax_derive::CsvSchema;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};

/// Column description generated by `#[derive(CsvSchema)]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvField {
    pub name: &'static str,
    pub required: bool,
    pub value_type: &'static str,
    pub description: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("row {row}: invalid {field} '{value}'")]
    InvalidField {
        row: usize,
        field: &'static str,
        value: String,
    },
}

/// One row of the processed transaction store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, CsvSchema)]
pub struct ProcessedCsvRecord {
    /// Owner of the transaction
    pub user: String,
    /// Hex SHA-256 of datetime, raw description and amount
    pub content_hash: String,
    /// Transaction date and time (YYYY-MM-DDThh:mm:ss)
    pub datetime: NaiveDateTime,
    /// Broker the record was imported from
    pub source: String,
    /// Product name
    pub product: String,
    /// ISIN, first two letters give the country
    pub isin: Option<String>,
    /// Quantity, zero for non-trades
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    /// Unit price in the transaction currency
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    /// ISO currency code of amount and price
    pub currency: String,
    /// Signed amount, outflows negative
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    /// STOCK, OPTION, DIVIDEND, FEE, CASH or UNKNOWN
    pub kind: String,
    /// CALL, PUT, TAX, DEPOSIT, SWEEP, WITHDRAWAL or empty
    pub subtype: Option<String>,
    /// BUY or SELL for trades
    pub side: Option<String>,
    /// Broker order identifier
    pub order_id: Option<String>,
    /// Commission paid on the order, absolute
    #[serde(with = "rust_decimal::serde::str")]
    pub commission: Decimal,
    /// Sanitised source text
    pub description: String,
    /// Units of currency per unit of reporting currency
    #[serde(with = "rust_decimal::serde::str")]
    pub exchange_rate: Decimal,
    /// Amount in the reporting currency
    #[serde(with = "rust_decimal::serde::str")]
    pub amount_reporting: Decimal,
    /// Alpha-2 country code or UNKNOWN
    pub country: String,
    /// Semicolon-separated warning codes
    pub warnings: Option<String>,
}

impl From<&ProcessedTransaction> for ProcessedCsvRecord {
    fn from(p: &ProcessedTransaction) -> Self {
        let tx = &p.transaction;
        let warnings = p
            .warnings
            .iter()
            .map(Warning::code)
            .collect::<Vec<_>>()
            .join(";");
        ProcessedCsvRecord {
            user: p.user.clone(),
            content_hash: p.content_hash.clone(),
            datetime: tx.datetime,
            source: tx.source.clone(),
            product: tx.product.clone(),
            isin: tx.isin.clone(),
            quantity: tx.quantity,
            price: tx.price,
            currency: tx.currency.clone(),
            amount: tx.amount,
            kind: tx.kind.as_str().to_string(),
            subtype: non_empty(tx.subtype.as_str()),
            side: tx.side.map(|s| s.as_str().to_string()),
            order_id: tx.order_id.clone(),
            commission: tx.commission,
            description: tx.description.clone(),
            exchange_rate: p.exchange_rate,
            amount_reporting: p.amount_reporting,
            country: p.country.to_string(),
            warnings: non_empty(&warnings),
        }
    }
}

impl ProcessedCsvRecord {
    fn into_processed(self, row: usize) -> Result<ProcessedTransaction, RecordError> {
        let invalid = |field: &'static str, value: &str| RecordError::InvalidField {
            row,
            field,
            value: value.to_string(),
        };
        let kind = TransactionType::parse(&self.kind).ok_or_else(|| invalid("kind", &self.kind))?;
        let subtype = match self.subtype.as_deref() {
            Some(s) => Subtype::parse(s).ok_or_else(|| invalid("subtype", s))?,
            None => Subtype::None,
        };
        let side = match self.side.as_deref() {
            Some(s) => Some(Side::parse(s).ok_or_else(|| invalid("side", s))?),
            None => None,
        };
        let warnings = self
            .warnings
            .as_deref()
            .unwrap_or_default()
            .split(';')
            .filter(|code| !code.trim().is_empty())
            .map(|code| Warning::from_code(code).ok_or_else(|| invalid("warnings", code)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProcessedTransaction {
            user: self.user,
            content_hash: self.content_hash,
            transaction: CanonicalTransaction {
                source: self.source,
                datetime: self.datetime,
                product: self.product,
                isin: self.isin,
                quantity: self.quantity,
                price: self.price,
                currency: self.currency,
                amount: self.amount,
                kind,
                subtype,
                side,
                order_id: self.order_id,
                commission: self.commission,
                description: self.description,
            },
            exchange_rate: self.exchange_rate,
            amount_reporting: self.amount_reporting,
            country: CountryCode::from(self.country),
            warnings,
        })
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

pub fn write_processed<W: Write>(
    transactions: &[ProcessedTransaction],
    writer: W,
) -> Result<(), RecordError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for tx in transactions {
        wtr.serialize(ProcessedCsvRecord::from(tx))?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn read_processed<R: Read>(reader: R) -> Result<Vec<ProcessedTransaction>, RecordError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut transactions = Vec::new();
    for (index, result) in rdr.deserialize::<ProcessedCsvRecord>().enumerate() {
        // header is line 1
        transactions.push(result?.into_processed(index + 2)?);
    }
    log::info!("Read {} processed transactions", transactions.len());
    Ok(transactions)
}

#[derive(Debug, Deserialize)]
struct QuoteRecord {
    instrument: String,
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
}

/// Market prices in the reporting currency keyed by ISIN or product name
pub fn read_quotes<R: Read>(reader: R) -> Result<HashMap<String, Decimal>, RecordError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut quotes = HashMap::new();
    for result in rdr.deserialize::<QuoteRecord>() {
        let quote = result?;
        quotes.insert(quote.instrument, quote.price);
    }
    Ok(quotes)
}
