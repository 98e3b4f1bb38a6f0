//! Year/country/instrument summaries and holdings snapshots.

use super::fifo::{FifoReport, RealizedGainRecord};
use super::transaction::{ProcessedTransaction, Subtype, TransactionType};
use chrono::Datelike;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Dividend income and withholding for one (year, country)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct DividendBucket {
    #[schemars(with = "f64")]
    pub gross_amt: Decimal,
    /// Withholding tax, negative
    #[schemars(with = "f64")]
    pub taxed_amt: Decimal,
}

pub type DividendSummary = BTreeMap<i32, BTreeMap<String, DividendBucket>>;

/// Group dividends and withholding tax by year and country.
pub fn dividend_summary(transactions: &[ProcessedTransaction], year: Option<i32>) -> DividendSummary {
    let mut summary = DividendSummary::new();
    for tx in transactions
        .iter()
        .filter(|tx| tx.kind() == TransactionType::Dividend)
        .filter(|tx| in_year(tx.date().year(), year))
    {
        let bucket = summary
            .entry(tx.date().year())
            .or_default()
            .entry(tx.country.to_string())
            .or_default();
        match tx.transaction.subtype {
            Subtype::Tax => bucket.taxed_amt += tx.amount_reporting,
            _ => bucket.gross_amt += tx.amount_reporting,
        }
    }
    summary
}

/// Realized gains of one instrument in one year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct GainSummary {
    pub year: i32,
    pub instrument: String,
    pub product: String,
    #[schemars(with = "f64")]
    pub quantity: Decimal,
    #[schemars(with = "f64")]
    pub sale_value: Decimal,
    #[schemars(with = "f64")]
    pub purchase_value: Decimal,
    #[schemars(with = "f64")]
    pub delta: Decimal,
}

pub fn gains_by_year_and_instrument(
    records: &[RealizedGainRecord],
    year: Option<i32>,
) -> Vec<GainSummary> {
    let mut grouped: BTreeMap<(i32, &str), GainSummary> = BTreeMap::new();
    for record in records.iter().filter(|r| in_year(r.year(), year)) {
        let entry = grouped
            .entry((record.year(), record.instrument.as_str()))
            .or_insert_with(|| GainSummary {
                year: record.year(),
                instrument: record.instrument.clone(),
                product: record.product.clone(),
                quantity: Decimal::ZERO,
                sale_value: Decimal::ZERO,
                purchase_value: Decimal::ZERO,
                delta: Decimal::ZERO,
            });
        entry.quantity += record.quantity;
        entry.sale_value += record.sale_value;
        entry.purchase_value += record.purchase_value;
        entry.delta += record.delta;
    }
    grouped.into_values().collect()
}

/// Current position in one instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct Holding {
    pub instrument: String,
    pub product: String,
    pub country: String,
    #[schemars(with = "f64")]
    pub quantity: Decimal,
    #[schemars(with = "f64")]
    pub cost_basis: Decimal,
    #[schemars(with = "Option<f64>")]
    pub market_value: Option<Decimal>,
}

/// Open lots valued at cost, and at market when a quote exists for the instrument.
pub fn holdings(report: &FifoReport, quotes: &HashMap<String, Decimal>) -> Vec<Holding> {
    report
        .open_positions
        .iter()
        .map(|position| {
            let quantity = position.quantity();
            Holding {
                instrument: position.instrument.clone(),
                product: position.product.clone(),
                country: position.country.to_string(),
                quantity,
                cost_basis: position.cost_basis(),
                market_value: quotes
                    .get(&position.instrument)
                    .or_else(|| quotes.get(&position.product))
                    .map(|price| quantity * price),
            }
        })
        .collect()
}

fn in_year(actual: i32, wanted: Option<i32>) -> bool {
    wanted.map_or(true, |y| y == actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::country::CountryCode;
    use crate::core::fifo::{OpenPosition, PurchaseLot};
    use crate::core::transaction::CanonicalTransaction;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn dividend(date: &str, subtype: Subtype, amount: Decimal, country: &str) -> ProcessedTransaction {
        ProcessedTransaction {
            user: "u1".to_string(),
            content_hash: format!("{date}{amount}"),
            transaction: CanonicalTransaction {
                source: "test".to_string(),
                datetime: day(date).and_hms_opt(0, 0, 0).unwrap(),
                product: "APPLE INC".to_string(),
                isin: Some("US0378331005".to_string()),
                quantity: Decimal::ZERO,
                price: Decimal::ZERO,
                currency: "EUR".to_string(),
                amount,
                kind: TransactionType::Dividend,
                subtype,
                side: None,
                order_id: None,
                commission: Decimal::ZERO,
                description: "Dividend".to_string(),
            },
            exchange_rate: Decimal::ONE,
            amount_reporting: amount,
            country: CountryCode::from(country.to_string()),
            warnings: vec![],
        }
    }

    fn gain(date: &str, instrument: &str, quantity: Decimal, delta: Decimal) -> RealizedGainRecord {
        RealizedGainRecord {
            instrument: instrument.to_string(),
            product: instrument.to_string(),
            country: CountryCode::Unknown,
            sale_date: day(date),
            quantity,
            sale_value: delta,
            purchase_date: Some(day("2020-01-01")),
            purchase_value: Decimal::ZERO,
            delta,
            zero_cost_basis: false,
        }
    }

    #[test]
    fn dividend_and_withholding_share_a_bucket() {
        let txs = vec![
            dividend("2023-05-01", Subtype::None, dec!(100), "US"),
            dividend("2023-05-01", Subtype::Tax, dec!(-15), "US"),
        ];
        let summary = dividend_summary(&txs, None);
        assert_eq!(
            summary[&2023]["US"],
            DividendBucket {
                gross_amt: dec!(100),
                taxed_amt: dec!(-15),
            }
        );
    }

    #[test]
    fn dividends_split_by_year_and_country() {
        let txs = vec![
            dividend("2022-12-31", Subtype::None, dec!(10), "US"),
            dividend("2023-01-01", Subtype::None, dec!(20), "NL"),
            dividend("2023-02-01", Subtype::None, dec!(5), ""),
        ];
        let summary = dividend_summary(&txs, None);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[&2022]["US"].gross_amt, dec!(10));
        assert_eq!(summary[&2023]["NL"].gross_amt, dec!(20));
        assert_eq!(summary[&2023]["UNKNOWN"].gross_amt, dec!(5));

        let only_2023 = dividend_summary(&txs, Some(2023));
        assert_eq!(only_2023.keys().collect::<Vec<_>>(), vec![&2023]);
    }

    #[test]
    fn gains_grouped_by_year_and_instrument() {
        let records = vec![
            gain("2023-01-05", "AAA", dec!(1), dec!(10)),
            gain("2023-06-05", "AAA", dec!(2), dec!(-4)),
            gain("2023-06-05", "BBB", dec!(1), dec!(7)),
            gain("2024-01-05", "AAA", dec!(1), dec!(3)),
        ];
        let summary = gains_by_year_and_instrument(&records, None);
        assert_eq!(summary.len(), 3);
        assert_eq!((summary[0].year, summary[0].instrument.as_str()), (2023, "AAA"));
        assert_eq!(summary[0].quantity, dec!(3));
        assert_eq!(summary[0].delta, dec!(6));

        let filtered = gains_by_year_and_instrument(&records, Some(2024));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].delta, dec!(3));
    }

    #[test]
    fn holdings_value_at_cost_and_market() {
        let report = FifoReport {
            records: vec![],
            open_positions: vec![OpenPosition {
                instrument: "US0378331005".to_string(),
                product: "APPLE INC".to_string(),
                country: CountryCode::Known("US".to_string()),
                lots: vec![
                    PurchaseLot {
                        acquired: day("2023-01-01"),
                        quantity: dec!(2),
                        unit_cost: dec!(100),
                    },
                    PurchaseLot {
                        acquired: day("2023-02-01"),
                        quantity: dec!(3),
                        unit_cost: dec!(120),
                    },
                ],
            }],
            warnings: vec![],
        };
        let quotes = HashMap::from([("US0378331005".to_string(), dec!(150))]);
        let holdings = holdings(&report, &quotes);
        assert_eq!(holdings[0].quantity, dec!(5));
        assert_eq!(holdings[0].cost_basis, dec!(560));
        assert_eq!(holdings[0].market_value, Some(dec!(750)));

        let unquoted = super::holdings(&report, &HashMap::new());
        assert_eq!(unquoted[0].market_value, None);
    }
}
