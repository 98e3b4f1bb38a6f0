use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Domain warnings attached to records during processing and matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type")]
pub enum Warning {
    /// No historical rate for (date, currency); rate 1.0 was used and the
    /// reporting amount equals the source amount.
    MissingRate,
    /// A sale exceeded the lots available for its instrument. The remainder
    /// was recorded with a zero cost basis.
    UnmatchedSale {
        instrument: String,
        date: NaiveDate,
        #[schemars(with = "f64")]
        unmatched: Decimal,
        #[schemars(with = "f64")]
        requested: Decimal,
    },
}

impl Warning {
    /// Short code used in the CSV store
    pub fn code(&self) -> &'static str {
        match self {
            Warning::MissingRate => "missing_rate",
            Warning::UnmatchedSale { .. } => "unmatched_sale",
        }
    }

    pub fn from_code(code: &str) -> Option<Warning> {
        match code.trim() {
            "missing_rate" => Some(Warning::MissingRate),
            _ => None,
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::MissingRate => f.write_str("no exchange rate, amount left unconverted"),
            Warning::UnmatchedSale {
                instrument,
                date,
                unmatched,
                requested,
            } => write!(
                f,
                "sale of {requested} {instrument} on {date} exceeds open lots by {unmatched}"
            ),
        }
    }
}
