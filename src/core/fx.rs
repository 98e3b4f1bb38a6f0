//! Historical daily exchange rates and conversion into the reporting currency.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::io::Read;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("no {currency} rate for {date}")]
pub struct MissingRateError {
    pub currency: String,
    pub date: NaiveDate,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FxError {
    #[error(transparent)]
    MissingRate(#[from] MissingRateError),
    #[error("converting {amount} at rate {rate} overflows")]
    Overflow { amount: Decimal, rate: Decimal },
}

#[derive(Debug, thiserror::Error)]
pub enum RateTableError {
    #[error("invalid rate table: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid date '{0}' in rate table")]
    InvalidDate(String),
    #[error("invalid rate '{value}' for {currency} on {date}")]
    InvalidRate {
        currency: String,
        date: NaiveDate,
        value: String,
    },
}

#[derive(Debug, Deserialize)]
struct RateFile {
    data: RateData,
}

#[derive(Debug, Deserialize)]
struct RateData {
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    #[serde(rename = "TIME_PERIOD")]
    time_period: String,
    #[serde(rename = "CURRENCY")]
    currency: String,
    #[serde(rename = "OBS_VALUE", deserialize_with = "number_or_string")]
    value: String,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected number or string, got {other}"
        ))),
    }
}

/// Result of converting an amount into the reporting currency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    /// Units of source currency per unit of reporting currency
    pub rate: Decimal,
    pub amount: Decimal,
    /// True when no rate was found and the amount was passed through unconverted
    pub approximate: bool,
}

/// Read-only table of daily rates keyed by (date, currency).
///
/// Rates are quoted as units of the foreign currency per one unit of the
/// reporting currency, so `reporting = amount / rate`.
#[derive(Debug, Clone)]
pub struct CurrencyConverter {
    reporting_currency: String,
    rates: HashMap<(NaiveDate, String), Decimal>,
}

impl Conversion {
    /// Fallback when no rate is available: rate 1, amount passed through
    pub fn unconverted(amount: Decimal) -> Self {
        Conversion {
            rate: Decimal::ONE,
            amount,
            approximate: true,
        }
    }
}

impl CurrencyConverter {
    pub fn new(reporting_currency: &str) -> Self {
        CurrencyConverter {
            reporting_currency: normalize_currency(reporting_currency),
            rates: HashMap::new(),
        }
    }

    /// Load observations from the rates JSON document
    pub fn from_json<R: Read>(reporting_currency: &str, reader: R) -> Result<Self, RateTableError> {
        let file: RateFile = serde_json::from_reader(reader)?;
        let mut converter = CurrencyConverter::new(reporting_currency);
        for obs in file.data.observations {
            let date = NaiveDate::parse_from_str(obs.time_period.trim(), "%Y-%m-%d")
                .map_err(|_| RateTableError::InvalidDate(obs.time_period.clone()))?;
            let rate = Decimal::from_str(obs.value.trim())
                .ok()
                .filter(|r| *r > Decimal::ZERO)
                .ok_or_else(|| RateTableError::InvalidRate {
                    currency: obs.currency.clone(),
                    date,
                    value: obs.value.clone(),
                })?;
            converter.insert(date, &obs.currency, rate);
        }
        log::info!(
            "Loaded {} {} exchange rates",
            converter.len(),
            converter.reporting_currency
        );
        Ok(converter)
    }

    pub fn insert(&mut self, date: NaiveDate, currency: &str, rate: Decimal) {
        self.rates.insert((date, normalize_currency(currency)), rate);
    }

    pub fn reporting_currency(&self) -> &str {
        &self.reporting_currency
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Exact (date, currency) lookup. The reporting currency is always 1.
    pub fn rate(&self, currency: &str, date: NaiveDate) -> Result<Decimal, MissingRateError> {
        let currency = normalize_currency(currency);
        if currency == self.reporting_currency {
            return Ok(Decimal::ONE);
        }
        self.rates
            .get(&(date, currency.clone()))
            .copied()
            .ok_or(MissingRateError { currency, date })
    }

    pub fn convert(
        &self,
        amount: Decimal,
        currency: &str,
        date: NaiveDate,
    ) -> Result<Conversion, FxError> {
        let rate = self.rate(currency, date)?;
        let converted = if rate == Decimal::ONE {
            amount
        } else {
            amount
                .checked_div(rate)
                .ok_or(FxError::Overflow { amount, rate })?
        };
        Ok(Conversion {
            rate,
            amount: converted,
            approximate: false,
        })
    }
}

fn normalize_currency(s: &str) -> String {
    s.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    const RATES: &str = r#"{
        "data": {
            "observations": [
                {"TIME_PERIOD": "2024-01-02", "CURRENCY": "USD", "OBS_VALUE": "1.25"},
                {"TIME_PERIOD": "2024-01-03", "CURRENCY": "usd", "OBS_VALUE": 1.5}
            ]
        }
    }"#;

    #[test]
    fn loads_string_and_numeric_values() {
        let fx = CurrencyConverter::from_json("EUR", RATES.as_bytes()).unwrap();
        assert_eq!(fx.len(), 2);
        assert_eq!(fx.rate("USD", day("2024-01-02")).unwrap(), dec!(1.25));
        assert_eq!(fx.rate("USD", day("2024-01-03")).unwrap(), dec!(1.5));
    }

    #[test]
    fn reporting_currency_short_circuits() {
        let fx = CurrencyConverter::new("EUR");
        let conv = fx.convert(dec!(123.456789), "eur", day("1999-01-01")).unwrap();
        assert_eq!(conv.rate, Decimal::ONE);
        assert_eq!(conv.amount, dec!(123.456789));
        assert!(!conv.approximate);
    }

    #[test]
    fn converts_by_dividing() {
        let fx = CurrencyConverter::from_json("EUR", RATES.as_bytes()).unwrap();
        let conv = fx.convert(dec!(-125), "USD", day("2024-01-02")).unwrap();
        assert_eq!(conv.amount, dec!(-100));
    }

    #[test]
    fn exact_date_required() {
        let fx = CurrencyConverter::from_json("EUR", RATES.as_bytes()).unwrap();
        assert_eq!(
            fx.rate("USD", day("2024-01-04")),
            Err(MissingRateError {
                currency: "USD".to_string(),
                date: day("2024-01-04"),
            })
        );
    }

    #[test]
    fn missing_rate_is_an_error() {
        let fx = CurrencyConverter::new("EUR");
        assert!(matches!(
            fx.convert(dec!(50), "GBP", day("2024-01-02")),
            Err(FxError::MissingRate(_))
        ));
        let fallback = Conversion::unconverted(dec!(50));
        assert_eq!(fallback.rate, Decimal::ONE);
        assert!(fallback.approximate);
    }

    #[test]
    fn rejects_non_positive_rates() {
        let json = r#"{"data": {"observations": [
            {"TIME_PERIOD": "2024-01-02", "CURRENCY": "USD", "OBS_VALUE": "0"}
        ]}}"#;
        assert!(matches!(
            CurrencyConverter::from_json("EUR", json.as_bytes()),
            Err(RateTableError::InvalidRate { .. })
        ));
    }
}
