//! Country reference data and ISIN prefix lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::Read;

/// Marker stored when a country cannot be derived
pub const UNKNOWN_COUNTRY: &str = "UNKNOWN";

#[derive(Debug, thiserror::Error)]
pub enum ReferenceDataError {
    #[error("invalid country table: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid alpha-2 code '{0}'")]
    InvalidCode(String),
}

/// One record of the country reference table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub name: String,
    pub alpha2: String,
    #[serde(default)]
    pub alpha3: String,
    #[serde(default)]
    pub numeric: String,
}

/// Derived country of a transaction: a known alpha-2 code or an explicit unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CountryCode {
    Known(String),
    Unknown,
}

impl From<String> for CountryCode {
    fn from(s: String) -> Self {
        let s = s.trim().to_uppercase();
        if s.is_empty() || s == UNKNOWN_COUNTRY {
            CountryCode::Unknown
        } else {
            CountryCode::Known(s)
        }
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.to_string()
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountryCode::Known(code) => f.write_str(code),
            CountryCode::Unknown => f.write_str(UNKNOWN_COUNTRY),
        }
    }
}

/// Read-only country table keyed by alpha-2 code
#[derive(Debug, Clone, Default)]
pub struct CountryTable {
    by_alpha2: HashMap<String, Country>,
}

impl CountryTable {
    pub fn new(countries: Vec<Country>) -> Result<Self, ReferenceDataError> {
        let mut by_alpha2 = HashMap::new();
        for country in countries {
            let code = country.alpha2.trim().to_uppercase();
            if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(ReferenceDataError::InvalidCode(country.alpha2));
            }
            by_alpha2.insert(code, country);
        }
        Ok(CountryTable { by_alpha2 })
    }

    pub fn from_json<R: Read>(reader: R) -> Result<Self, ReferenceDataError> {
        let countries: Vec<Country> = serde_json::from_reader(reader)?;
        let table = CountryTable::new(countries)?;
        log::info!("Loaded {} countries", table.by_alpha2.len());
        Ok(table)
    }

    pub fn get(&self, alpha2: &str) -> Option<&Country> {
        self.by_alpha2.get(&alpha2.trim().to_uppercase())
    }

    /// Country from the first two characters of an ISIN
    pub fn country_of_isin(&self, isin: Option<&str>) -> CountryCode {
        let Some(prefix) = isin.and_then(|i| i.trim().get(..2)) else {
            return CountryCode::Unknown;
        };
        match self.get(prefix) {
            Some(country) => CountryCode::Known(country.alpha2.trim().to_uppercase()),
            None => CountryCode::Unknown,
        }
    }
}
