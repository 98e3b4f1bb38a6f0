//! DEGIRO account statement (CSV).
//!
//! Columns are read by position since header names are localised and the
//! amount/balance columns are unnamed.

use super::{FileFormatError, ParsedStatement};
use crate::core::classify::{self, Classification};
use crate::core::{CanonicalTransaction, Subtype, TransactionType};
use crate::utils::parse_decimal;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::collections::HashMap;

pub const SOURCE: &str = "degiro";

const MIN_COLUMNS: usize = 12;

/// One statement row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    date: String,
    time: String,
    product: String,
    isin: String,
    description: String,
    currency: String,
    amount: String,
    order_id: String,
}

impl From<&csv::StringRecord> for Record {
    fn from(row: &csv::StringRecord) -> Self {
        let col = |i: usize| row.get(i).unwrap_or_default().trim().to_string();
        Record {
            date: col(0),
            time: col(1),
            product: col(3),
            isin: col(4),
            description: col(5),
            currency: col(7),
            amount: col(8),
            order_id: col(11),
        }
    }
}

impl Record {
    fn datetime(&self) -> Option<NaiveDateTime> {
        let date = NaiveDate::parse_from_str(&self.date, "%d-%m-%Y").ok()?;
        let time = NaiveTime::parse_from_str(&self.time, "%H:%M").unwrap_or(NaiveTime::MIN);
        Some(date.and_time(time))
    }

    fn order_id(&self) -> Option<String> {
        (!self.order_id.is_empty()).then(|| self.order_id.clone())
    }
}

fn check_header(header: &csv::StringRecord) -> Result<(), FileFormatError> {
    let first_is_date = header
        .get(0)
        .map(|h| h.trim_start_matches('\u{feff}').trim().eq_ignore_ascii_case("date"))
        .unwrap_or(false);
    let has_isin = header.iter().any(|h| h.trim().eq_ignore_ascii_case("isin"));
    if header.len() < MIN_COLUMNS || !first_is_date || !has_isin {
        return Err(FileFormatError::MissingHeader(
            header.iter().collect::<Vec<_>>().join(","),
        ));
    }
    Ok(())
}

pub fn parse(bytes: &[u8]) -> Result<ParsedStatement, FileFormatError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    check_header(rdr.headers()?)?;

    let mut rows = Vec::new();
    for (index, result) in rdr.records().enumerate() {
        let row = result?;
        if row.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        // header is line 1
        rows.push((index + 2, Record::from(&row)));
    }

    let mut statement = ParsedStatement::default();
    let mut pending = Vec::new();
    for (line, record) in rows {
        let Some(datetime) = record.datetime() else {
            statement.skip(line, None, &record.description, format!("invalid date '{}'", record.date));
            continue;
        };
        let Some(amount) = parse_decimal(&record.amount) else {
            statement.skip(line, Some(datetime), &record.description, format!("invalid amount '{}'", record.amount));
            continue;
        };
        let category = match classify::classify(&record.description) {
            Classification::Classified(category) => category,
            Classification::Unrecognized => {
                statement.skip(line, Some(datetime), &record.description, "unrecognised description");
                continue;
            }
        };
        if category.kind == TransactionType::ProductChange {
            statement.skip(line, Some(datetime), &record.description, "product change");
            continue;
        }

        let mut tx = CanonicalTransaction {
            source: SOURCE.to_string(),
            datetime,
            product: record.product.clone(),
            isin: (!record.isin.is_empty()).then(|| record.isin.clone()),
            quantity: Decimal::ZERO,
            price: Decimal::ZERO,
            currency: record.currency.clone(),
            amount: normalize_sign(category.kind, category.subtype, amount),
            kind: category.kind,
            subtype: category.subtype,
            side: None,
            order_id: record.order_id(),
            commission: Decimal::ZERO,
            description: record.description.clone(),
        };
        if let Some(trade) = category.trade {
            if tx.product.is_empty() {
                tx.product = trade.product;
            }
            // the product column carries the option suffix more reliably
            if let Some(subtype) = classify::option_subtype(&tx.product) {
                tx.kind = TransactionType::Option;
                tx.subtype = subtype;
            }
            tx.side = Some(trade.side);
            tx.quantity = trade.quantity;
            tx.price = trade.price;
        }
        pending.push(tx);
    }

    let commissions = commissions_by_order(&pending);
    for mut tx in pending {
        if tx.kind.is_trade() {
            if let Some(commission) = tx.order_id.as_ref().and_then(|id| commissions.get(id)) {
                tx.commission = *commission;
            }
        }
        statement.transactions.push(tx);
    }
    Ok(statement)
}

/// Fees and withholding tax are outflows whatever the raw sign
fn normalize_sign(kind: TransactionType, subtype: Subtype, amount: Decimal) -> Decimal {
    match (kind, subtype) {
        (TransactionType::Fee, _) | (TransactionType::Dividend, Subtype::Tax) => -amount.abs(),
        _ => amount,
    }
}

/// Σ|amount| of fee rows per order id
fn commissions_by_order(transactions: &[CanonicalTransaction]) -> HashMap<String, Decimal> {
    let mut commissions: HashMap<String, Decimal> = HashMap::new();
    for tx in transactions.iter().filter(|tx| tx.kind == TransactionType::Fee) {
        if let Some(order_id) = &tx.order_id {
            *commissions.entry(order_id.clone()).or_default() += tx.amount.abs();
        }
    }
    commissions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Side;
    use rust_decimal_macros::dec;

    const HEADER: &str = "Date,Time,Value date,Product,ISIN,Description,FX,Change,,Balance,,Order Id\n";

    fn parse_rows(rows: &str) -> ParsedStatement {
        parse(format!("{HEADER}{rows}").as_bytes()).unwrap()
    }

    #[test]
    fn buy_with_fee_sharing_order_id() {
        let statement = parse_rows(
            "02-01-2024,09:05,02-01-2024,APPLE INC,US0378331005,\"Buy 10 APPLE INC@150 USD (US0378331005)\",,USD,\"-1500,00\",USD,\"-1500,00\",abc-1\n\
             02-01-2024,09:05,02-01-2024,APPLE INC,US0378331005,DEGIRO Transaction and/or third party fees,,EUR,\"-2,00\",EUR,\"98,00\",abc-1\n\
             02-01-2024,09:05,02-01-2024,APPLE INC,US0378331005,DEGIRO Exchange Connection Fee,,EUR,-0.50,EUR,97.50,abc-1\n",
        );
        assert_eq!(statement.transactions.len(), 3);
        let buy = &statement.transactions[0];
        assert_eq!(buy.kind, TransactionType::Stock);
        assert_eq!(buy.side, Some(Side::Buy));
        assert_eq!(buy.quantity, dec!(10));
        assert_eq!(buy.price, dec!(150));
        assert_eq!(buy.amount, dec!(-1500));
        assert_eq!(buy.commission, dec!(2.5));
        assert_eq!(
            buy.datetime,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(9, 5, 0).unwrap()
        );
        assert_eq!(statement.transactions[1].kind, TransactionType::Fee);
        assert_eq!(statement.transactions[1].commission, Decimal::ZERO);
    }

    #[test]
    fn fee_and_withholding_forced_negative() {
        let statement = parse_rows(
            "15-05-2024,07:30,14-05-2024,APPLE INC,US0378331005,Dividend Tax,,USD,3.75,USD,,\n\
             15-05-2024,07:30,14-05-2024,APPLE INC,US0378331005,Dividend,,USD,25.00,USD,,\n\
             01-06-2024,10:00,01-06-2024,,,DEGIRO Exchange Connection Fee 2024,,EUR,2.50,EUR,,\n",
        );
        let amounts: Vec<_> = statement.transactions.iter().map(|t| t.amount).collect();
        assert_eq!(amounts, vec![dec!(-3.75), dec!(25), dec!(-2.5)]);
        assert_eq!(statement.transactions[0].subtype, Subtype::Tax);
    }

    #[test]
    fn unclassifiable_and_product_change_rows_are_skipped() {
        let statement = parse_rows(
            "03-01-2024,10:00,03-01-2024,,,Something unexpected,,EUR,1.00,EUR,,\n\
             04-01-2024,10:00,04-01-2024,OLD NAME,NL0000000001,Product change,,EUR,0.00,EUR,,\n\
             05-01-2024,10:00,05-01-2024,,,iDEAL Deposit,,EUR,500.00,EUR,500.00,\n",
        );
        assert_eq!(statement.transactions.len(), 1);
        assert_eq!(statement.transactions[0].subtype, Subtype::Deposit);
        assert_eq!(statement.skipped.len(), 2);
        assert_eq!(statement.skipped[0].position, 2);
        assert_eq!(statement.skipped[1].reason, "product change");
    }

    #[test]
    fn option_detected_from_product_suffix() {
        let statement = parse_rows(
            "10-01-2023,15:00,10-01-2023,AAPL C150.00 20JAN23,,\"Sell 1 AAPL C150.00 20JAN23@2,50 USD\",,USD,250.00,USD,,x9\n",
        );
        let tx = &statement.transactions[0];
        assert_eq!((tx.kind, tx.subtype), (TransactionType::Option, Subtype::Call));
        assert_eq!(tx.side, Some(Side::Sell));
        assert_eq!(tx.isin, None);
    }

    #[test]
    fn missing_header_is_a_format_error() {
        let err = parse(b"foo,bar\n1,2\n").unwrap_err();
        assert!(matches!(err, FileFormatError::MissingHeader(_)));
    }

    #[test]
    fn invalid_date_is_skipped() {
        let statement = parse_rows("2024/01/02,10:00,,,,Dividend,,EUR,1.00,EUR,,\n");
        assert!(statement.transactions.is_empty());
        assert_eq!(statement.skipped.len(), 1);
    }
}
