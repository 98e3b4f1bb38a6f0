//! Turns canonical transactions into persistable processed transactions.

use super::classify::{self, Classification, RowClassificationError};
use super::country::CountryTable;
use super::fx::{Conversion, CurrencyConverter, FxError};
use super::sanitize::{self, FieldLimits, ValidationError};
use super::transaction::{CanonicalTransaction, ProcessedTransaction, TransactionType};
use super::warnings::Warning;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Internal inconsistencies. Fatal for the whole batch.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProcessError {
    #[error("amount {amount} of row '{description}' cannot be converted at rate {rate}")]
    InconsistentAmount {
        description: String,
        amount: Decimal,
        rate: Decimal,
    },
}

/// Why a single row was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Invalid(ValidationError),
    Unclassified(RowClassificationError),
    /// Administrative product change, not a financial event
    ProductChange,
    /// Content hash already persisted or repeated within the batch
    Duplicate(String),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Invalid(err) => write!(f, "{err}"),
            Rejection::Unclassified(err) => write!(f, "{err}"),
            Rejection::ProductChange => f.write_str("product change"),
            Rejection::Duplicate(hash) => write!(f, "duplicate of {hash}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub datetime: NaiveDateTime,
    pub description: String,
    pub reason: Rejection,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub processed: Vec<ProcessedTransaction>,
    pub rejected: Vec<RejectedRow>,
}

impl BatchOutcome {
    pub fn duplicate_count(&self) -> usize {
        self.rejected
            .iter()
            .filter(|r| matches!(r.reason, Rejection::Duplicate(_)))
            .count()
    }

    pub fn approximate_count(&self) -> usize {
        self.processed
            .iter()
            .filter(|p| p.has_approximate_rate())
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub user: String,
    pub limits: FieldLimits,
}

impl ProcessorConfig {
    pub fn new(user: impl Into<String>) -> Self {
        ProcessorConfig {
            user: user.into(),
            limits: FieldLimits::default(),
        }
    }
}

/// Hex SHA-256 over (datetime, raw description, amount).
pub fn content_hash(datetime: NaiveDateTime, description: &str, amount: Decimal) -> String {
    let mut hasher = Sha256::new();
    hasher.update(datetime.format("%Y-%m-%dT%H:%M:%S").to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(description.as_bytes());
    hasher.update(b"|");
    hasher.update(amount.normalize().to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Processes canonical transactions against shared, read-only reference data.
pub struct Processor<'a> {
    config: &'a ProcessorConfig,
    fx: &'a CurrencyConverter,
    countries: &'a CountryTable,
}

impl<'a> Processor<'a> {
    pub fn new(
        config: &'a ProcessorConfig,
        fx: &'a CurrencyConverter,
        countries: &'a CountryTable,
    ) -> Self {
        Processor {
            config,
            fx,
            countries,
        }
    }

    /// Process one row. `Ok(Err(_))` is a rejected row, `Err(_)` aborts the batch.
    pub fn process(
        &self,
        tx: CanonicalTransaction,
    ) -> Result<Result<ProcessedTransaction, Rejection>, ProcessError> {
        let raw_description = tx.description.clone();
        let tx = match reclassify(tx) {
            Ok(tx) => tx,
            Err(rejection) => return Ok(Err(rejection)),
        };
        let tx = match self.sanitize(tx) {
            Ok(tx) => tx,
            Err(err) => {
                log::debug!("Invalid {} in '{raw_description}'", err.field());
                return Ok(Err(Rejection::Invalid(err)));
            }
        };

        let conversion = match self.fx.convert(tx.amount, &tx.currency, tx.date()) {
            Ok(conversion) => conversion,
            Err(FxError::MissingRate(err)) => {
                log::warn!("{err}; '{}' left unconverted", tx.description);
                Conversion::unconverted(tx.amount)
            }
            Err(FxError::Overflow { amount, rate }) => {
                return Err(ProcessError::InconsistentAmount {
                    description: tx.description.clone(),
                    amount,
                    rate,
                })
            }
        };

        let mut warnings = Vec::new();
        if conversion.approximate {
            warnings.push(Warning::MissingRate);
        }

        let country = self.countries.country_of_isin(tx.isin.as_deref());
        let content_hash = content_hash(tx.datetime, &raw_description, tx.amount);

        Ok(Ok(ProcessedTransaction {
            user: self.config.user.clone(),
            content_hash,
            transaction: tx,
            exchange_rate: conversion.rate,
            amount_reporting: conversion.amount,
            country,
            warnings,
        }))
    }

    /// Process a batch, skipping hashes already in `known_hashes` or repeated in the batch.
    pub fn process_batch(
        &self,
        transactions: Vec<CanonicalTransaction>,
        known_hashes: &HashSet<String>,
    ) -> Result<BatchOutcome, ProcessError> {
        let mut outcome = BatchOutcome::default();
        let mut seen: HashSet<String> = HashSet::new();

        for tx in transactions {
            let datetime = tx.datetime;
            let description = tx.description.clone();
            let reason = match self.process(tx)? {
                Ok(processed) => {
                    let hash = processed.content_hash.clone();
                    if known_hashes.contains(&hash) || !seen.insert(hash.clone()) {
                        Rejection::Duplicate(hash)
                    } else {
                        log::debug!("Processed {} {}", processed.kind(), description);
                        outcome.processed.push(processed);
                        continue;
                    }
                }
                Err(reason) => reason,
            };
            log::warn!("Skipping row {datetime} '{description}': {reason}");
            outcome.rejected.push(RejectedRow {
                datetime,
                description,
                reason,
            });
        }

        log::info!(
            "Processed {} transactions, rejected {} ({} duplicates)",
            outcome.processed.len(),
            outcome.rejected.len(),
            outcome.duplicate_count()
        );
        Ok(outcome)
    }

    fn sanitize(&self, mut tx: CanonicalTransaction) -> Result<CanonicalTransaction, ValidationError> {
        let limits = &self.config.limits;
        tx.description = sanitize::required_text("description", &tx.description, limits.description)?;
        tx.product = if tx.kind.is_trade() {
            sanitize::required_text("product", &tx.product, limits.product)?
        } else {
            sanitize::optional_text("product", Some(&tx.product), limits.product)?
                .unwrap_or_default()
        };
        tx.isin = sanitize::isin(tx.isin.as_deref())?;
        tx.order_id = sanitize::optional_text("order_id", tx.order_id.as_deref(), limits.order_id)?;
        tx.currency = sanitize::required_text("currency", &tx.currency, 3)?.to_uppercase();
        Ok(tx)
    }
}

/// Fallback classification for rows an adapter left as UNKNOWN.
fn reclassify(mut tx: CanonicalTransaction) -> Result<CanonicalTransaction, Rejection> {
    if tx.kind == TransactionType::Unknown {
        match classify::classify(&tx.description) {
            Classification::Classified(category) => {
                tx.kind = category.kind;
                tx.subtype = category.subtype;
                if let Some(trade) = category.trade {
                    tx.side = Some(trade.side);
                    tx.quantity = trade.quantity;
                    tx.price = trade.price;
                    if tx.product.trim().is_empty() {
                        tx.product = trade.product;
                    }
                }
            }
            Classification::Unrecognized => {
                return Err(Rejection::Unclassified(RowClassificationError {
                    text: tx.description.clone(),
                }))
            }
        }
    }
    if tx.kind == TransactionType::ProductChange {
        return Err(Rejection::ProductChange);
    }
    if tx.kind.is_trade() && tx.side.is_none() {
        return Err(Rejection::Unclassified(RowClassificationError {
            text: tx.description.clone(),
        }));
    }
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::country::{CountryCode, Country};
    use crate::core::transaction::{Side, Subtype};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn tx(kind: TransactionType, description: &str, amount: Decimal, currency: &str) -> CanonicalTransaction {
        CanonicalTransaction {
            source: "test".to_string(),
            datetime: dt("2024-03-01"),
            product: "APPLE INC".to_string(),
            isin: Some("US0378331005".to_string()),
            quantity: Decimal::ZERO,
            price: Decimal::ZERO,
            currency: currency.to_string(),
            amount,
            kind,
            subtype: Subtype::None,
            side: None,
            order_id: None,
            commission: Decimal::ZERO,
            description: description.to_string(),
        }
    }

    fn fixtures() -> (ProcessorConfig, CurrencyConverter, CountryTable) {
        let mut fx = CurrencyConverter::new("EUR");
        fx.insert(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), "USD", dec!(1.25));
        let countries = CountryTable::new(vec![Country {
            name: "United States".to_string(),
            alpha2: "US".to_string(),
            alpha3: "USA".to_string(),
            numeric: "840".to_string(),
        }])
        .unwrap();
        (ProcessorConfig::new("user-1"), fx, countries)
    }

    #[test]
    fn converts_and_derives_country() {
        let (config, fx, countries) = fixtures();
        let processor = Processor::new(&config, &fx, &countries);
        let processed = processor
            .process(tx(TransactionType::Dividend, "Dividend", dec!(12.5), "USD"))
            .unwrap()
            .unwrap();
        assert_eq!(processed.exchange_rate, dec!(1.25));
        assert_eq!(processed.amount_reporting, dec!(10));
        assert_eq!(processed.country, CountryCode::Known("US".to_string()));
        assert_eq!(processed.user, "user-1");
        assert!(processed.warnings.is_empty());
    }

    #[test]
    fn reporting_currency_is_exact() {
        let (config, fx, countries) = fixtures();
        let processor = Processor::new(&config, &fx, &countries);
        let processed = processor
            .process(tx(TransactionType::Fee, "Fee", dec!(-0.333333333), "EUR"))
            .unwrap()
            .unwrap();
        assert_eq!(processed.exchange_rate, Decimal::ONE);
        assert_eq!(processed.amount_reporting, dec!(-0.333333333));
    }

    #[test]
    fn missing_rate_attaches_warning() {
        let (config, fx, countries) = fixtures();
        let processor = Processor::new(&config, &fx, &countries);
        let processed = processor
            .process(tx(TransactionType::Dividend, "Dividend", dec!(40), "GBP"))
            .unwrap()
            .unwrap();
        assert_eq!(processed.exchange_rate, Decimal::ONE);
        assert_eq!(processed.amount_reporting, dec!(40));
        assert_eq!(processed.warnings, vec![Warning::MissingRate]);
    }

    #[test]
    fn unknown_rows_are_reclassified() {
        let (config, fx, countries) = fixtures();
        let processor = Processor::new(&config, &fx, &countries);
        let processed = processor
            .process(tx(TransactionType::Unknown, "Sell 4 APPLE INC@150 USD", dec!(600), "USD"))
            .unwrap()
            .unwrap();
        assert_eq!(processed.kind(), TransactionType::Stock);
        assert_eq!(processed.transaction.side, Some(Side::Sell));
        assert_eq!(processed.transaction.quantity, dec!(4));
    }

    #[test]
    fn dividend_fund_purchase_stays_a_trade() {
        let (config, fx, countries) = fixtures();
        let processor = Processor::new(&config, &fx, &countries);
        let processed = processor
            .process(tx(
                TransactionType::Unknown,
                "Buy 10 ISHARES STOXX GLOBAL SELECT DIVIDEND 100@30 EUR (DE000A0F5UH1)",
                dec!(-300),
                "EUR",
            ))
            .unwrap()
            .unwrap();
        assert_eq!(processed.kind(), TransactionType::Stock);
        assert_eq!(processed.transaction.side, Some(Side::Buy));
        assert_eq!(processed.transaction.quantity, dec!(10));
    }

    #[test]
    fn option_round_trip_realizes_contract_value() {
        let (config, fx, countries) = fixtures();
        let processor = Processor::new(&config, &fx, &countries);
        let option = |side: Side, price: Decimal, amount: Decimal, hour: u32| {
            let mut t = tx(TransactionType::Option, "AAPL 20JAN23 150 C", amount, "USD");
            t.datetime = NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap();
            t.isin = None;
            t.product = "AAPL 20JAN23 150 C".to_string();
            t.subtype = Subtype::Call;
            t.side = Some(side);
            t.quantity = Decimal::ONE;
            t.price = price;
            processor.process(t).unwrap().unwrap()
        };
        let buy = option(Side::Buy, dec!(2.1), dec!(-210), 10);
        let sell = option(Side::Sell, dec!(3), dec!(300), 15);

        let report = crate::core::fifo::match_lots(&[buy, sell]);
        assert_eq!(report.records.len(), 1);
        // 90 USD at 1.25 USD per EUR
        assert_eq!(report.records[0].sale_value, dec!(240));
        assert_eq!(report.records[0].purchase_value, dec!(168));
        assert_eq!(report.records[0].delta, dec!(72));
    }

    #[test]
    fn unclassifiable_and_product_change_are_rejected() {
        let (config, fx, countries) = fixtures();
        let processor = Processor::new(&config, &fx, &countries);
        let unknown = processor
            .process(tx(TransactionType::Unknown, "Something odd", dec!(1), "EUR"))
            .unwrap();
        assert!(matches!(unknown, Err(Rejection::Unclassified(_))));

        let change = processor
            .process(tx(TransactionType::ProductChange, "Product change", dec!(0), "EUR"))
            .unwrap();
        assert_eq!(change, Err(Rejection::ProductChange));
    }

    #[test]
    fn oversized_row_rejected_batch_continues() {
        let (mut config, fx, countries) = fixtures();
        config.limits.description = 10;
        let processor = Processor::new(&config, &fx, &countries);
        let outcome = processor
            .process_batch(
                vec![
                    tx(TransactionType::Dividend, "Dividend", dec!(5), "EUR"),
                    tx(TransactionType::Fee, "A very long fee description", dec!(-1), "EUR"),
                    tx(TransactionType::Fee, "Costs", dec!(-2), "EUR"),
                ],
                &HashSet::new(),
            )
            .unwrap();
        assert_eq!(outcome.processed.len(), 2);
        assert_eq!(outcome.rejected.len(), 1);
        assert!(matches!(
            outcome.rejected[0].reason,
            Rejection::Invalid(ValidationError::TooLong { field: "description", .. })
        ));
    }

    #[test]
    fn duplicates_are_dropped() {
        let (config, fx, countries) = fixtures();
        let processor = Processor::new(&config, &fx, &countries);
        let dividend = tx(TransactionType::Dividend, "Dividend", dec!(5), "EUR");
        let known: HashSet<String> =
            [content_hash(dividend.datetime, "Costs", dec!(-2))].into_iter().collect();
        let outcome = processor
            .process_batch(
                vec![
                    dividend.clone(),
                    dividend,
                    tx(TransactionType::Fee, "Costs", dec!(-2), "EUR"),
                ],
                &known,
            )
            .unwrap();
        assert_eq!(outcome.processed.len(), 1);
        assert_eq!(outcome.duplicate_count(), 2);
    }

    #[test]
    fn content_hash_depends_on_each_input() {
        let base = content_hash(dt("2024-01-01"), "Dividend", dec!(10));
        assert_eq!(base, content_hash(dt("2024-01-01"), "Dividend", dec!(10)));
        assert_eq!(base, content_hash(dt("2024-01-01"), "Dividend", dec!(10.00)));
        assert_ne!(base, content_hash(dt("2024-01-02"), "Dividend", dec!(10)));
        assert_ne!(base, content_hash(dt("2024-01-01"), "Dividend Tax", dec!(10)));
        assert_ne!(base, content_hash(dt("2024-01-01"), "Dividend", dec!(-10)));
        assert_eq!(base.len(), 64);
    }
}
