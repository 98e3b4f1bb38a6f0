use super::country::CountryCode;
use super::warnings::Warning;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad category of a transaction
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Stock,
    Option,
    Dividend,
    Fee,
    Cash,
    /// Administrative change of a product (ISIN/name), not a financial event
    ProductChange,
    #[default]
    Unknown,
}

impl TransactionType {
    pub fn is_trade(self) -> bool {
        matches!(self, TransactionType::Stock | TransactionType::Option)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Stock => "STOCK",
            TransactionType::Option => "OPTION",
            TransactionType::Dividend => "DIVIDEND",
            TransactionType::Fee => "FEE",
            TransactionType::Cash => "CASH",
            TransactionType::ProductChange => "PRODUCT_CHANGE",
            TransactionType::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Option<TransactionType> {
        match s.trim().to_uppercase().as_str() {
            "STOCK" => Some(TransactionType::Stock),
            "OPTION" => Some(TransactionType::Option),
            "DIVIDEND" => Some(TransactionType::Dividend),
            "FEE" => Some(TransactionType::Fee),
            "CASH" => Some(TransactionType::Cash),
            "PRODUCT_CHANGE" => Some(TransactionType::ProductChange),
            "UNKNOWN" => Some(TransactionType::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-dependent refinement of a [`TransactionType`]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Subtype {
    #[default]
    None,
    Call,
    Put,
    Tax,
    Deposit,
    Sweep,
    Withdrawal,
}

impl Subtype {
    pub fn as_str(self) -> &'static str {
        match self {
            Subtype::None => "",
            Subtype::Call => "CALL",
            Subtype::Put => "PUT",
            Subtype::Tax => "TAX",
            Subtype::Deposit => "DEPOSIT",
            Subtype::Sweep => "SWEEP",
            Subtype::Withdrawal => "WITHDRAWAL",
        }
    }

    pub fn parse(s: &str) -> Option<Subtype> {
        match s.trim().to_uppercase().as_str() {
            "" | "NONE" => Some(Subtype::None),
            "CALL" => Some(Subtype::Call),
            "PUT" => Some(Subtype::Put),
            "TAX" => Some(Subtype::Tax),
            "DEPOSIT" => Some(Subtype::Deposit),
            "SWEEP" => Some(Subtype::Sweep),
            "WITHDRAWAL" => Some(Subtype::Withdrawal),
            _ => None,
        }
    }
}

/// Buy/sell side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Side> {
        match s.trim().to_uppercase().as_str() {
            "BUY" | "B" => Some(Side::Buy),
            "SELL" | "S" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Broker-agnostic transaction produced by a broker adapter.
///
/// Amounts follow a single sign convention: outflows negative, inflows positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalTransaction {
    /// Identifier of the broker/export the record came from (e.g. "degiro")
    pub source: String,
    #[schemars(with = "String")]
    pub datetime: NaiveDateTime,
    pub product: String,
    #[serde(default)]
    pub isin: Option<String>,
    #[schemars(with = "f64")]
    pub quantity: Decimal,
    #[schemars(with = "f64")]
    pub price: Decimal,
    pub currency: String,
    /// Signed amount in `currency`
    #[schemars(with = "f64")]
    pub amount: Decimal,
    pub kind: TransactionType,
    #[serde(default)]
    pub subtype: Subtype,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[schemars(with = "f64")]
    #[serde(default)]
    pub commission: Decimal,
    /// Raw free text as found in the source file
    pub description: String,
}

impl CanonicalTransaction {
    pub fn date(&self) -> NaiveDate {
        self.datetime.date()
    }
}

/// A canonical transaction after sanitisation, currency conversion and
/// country derivation. Ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessedTransaction {
    pub user: String,
    /// Hex SHA-256 of (datetime, raw description, amount)
    pub content_hash: String,
    #[serde(flatten)]
    pub transaction: CanonicalTransaction,
    /// Units of `currency` per unit of reporting currency, exactly 1 when they match
    #[schemars(with = "f64")]
    pub exchange_rate: Decimal,
    #[schemars(with = "f64")]
    pub amount_reporting: Decimal,
    #[schemars(with = "String")]
    pub country: CountryCode,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

impl ProcessedTransaction {
    pub fn date(&self) -> NaiveDate {
        self.transaction.date()
    }

    pub fn kind(&self) -> TransactionType {
        self.transaction.kind
    }

    /// Instrument key used for lot matching: ISIN, else product name
    pub fn instrument(&self) -> &str {
        match self.transaction.isin.as_deref() {
            Some(isin) if !isin.is_empty() => isin,
            _ => &self.transaction.product,
        }
    }

    /// Reporting-currency value of one traded unit, full precision.
    ///
    /// Taken from the booked amount so a contract multiplier (100 shares per
    /// US option) is part of the value. The quoted price is only used when no
    /// amount was booked.
    pub fn unit_value_reporting(&self) -> Decimal {
        let quantity = self.transaction.quantity.abs();
        if quantity.is_zero() || self.amount_reporting.is_zero() {
            return self.price_reporting();
        }
        self.amount_reporting.abs() / quantity
    }

    fn price_reporting(&self) -> Decimal {
        if self.exchange_rate.is_zero() {
            self.transaction.price
        } else {
            self.transaction.price / self.exchange_rate
        }
    }

    pub fn has_approximate_rate(&self) -> bool {
        self.warnings.contains(&Warning::MissingRate)
    }
}
