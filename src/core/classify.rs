//! Ordered free-text classification of broker descriptions.
//!
//! Rules are evaluated top to bottom and the first match wins. Order matters:
//! a withholding line contains "dividend", a sweep line may contain "deposit",
//! and fee lines often carry the broker name of a trade. The keyword rules
//! never fire on a trade line, whose product name may itself contain
//! "dividend" or "costs".

use super::transaction::{Side, Subtype, TransactionType};
use crate::utils::parse_decimal;
use regex::Regex;
use rust_decimal::Decimal;
use std::sync::LazyLock;

static DIVIDEND: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bdividend").unwrap());
static DIVIDEND_TAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(dividend\s*tax|withholding|dividendbelasting|tax\s+on\s+dividend)").unwrap()
});
static SWEEP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bsweep\b").unwrap());
static DEPOSIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(deposit|storting)\b").unwrap());
static WITHDRAWAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(withdrawal|terugstorting)\b").unwrap());
static FEE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(fees?|costs?|commission|connection|kosten)\b").unwrap()
});
static PRODUCT_CHANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(product\s*change|productwijziging|change\s+of\s+isin)").unwrap()
});
static TRADE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(buy|sell|koop|verkoop)\s+([0-9][0-9.,]*)\s+(.+?)\s*@\s*([0-9][0-9.,]*)")
        .unwrap()
});
static GROUPED_THOUSANDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(,\d{3})+$").unwrap());
static OPTION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s([CP])\s*\d+(?:[.,]\d+)?\s+\d{1,2}[A-Z]{3}\d{2,4}\s*$").unwrap()
});

/// A row whose description matched no rule
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("unrecognised description '{text}'")]
pub struct RowClassificationError {
    pub text: String,
}

/// Fields extracted from a trade description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeFields {
    pub side: Side,
    pub quantity: Decimal,
    pub product: String,
    pub price: Decimal,
}

/// A recognised category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub kind: TransactionType,
    pub subtype: Subtype,
    pub trade: Option<TradeFields>,
}

impl Category {
    fn simple(kind: TransactionType, subtype: Subtype) -> Self {
        Category {
            kind,
            subtype,
            trade: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Classified(Category),
    Unrecognized,
}

/// A named pattern-to-category rule
pub struct Rule {
    pub name: &'static str,
    matcher: fn(&str) -> Option<Category>,
}

/// The rules in priority order
pub const RULES: &[Rule] = &[
    Rule {
        name: "dividend",
        matcher: match_dividend,
    },
    Rule {
        name: "cash",
        matcher: match_cash,
    },
    Rule {
        name: "fee",
        matcher: match_fee,
    },
    Rule {
        name: "product_change",
        matcher: match_product_change,
    },
    Rule {
        name: "trade",
        matcher: match_trade,
    },
];

/// Classify a free-text description. Pure and deterministic.
pub fn classify(text: &str) -> Classification {
    for rule in RULES {
        if let Some(category) = (rule.matcher)(text) {
            log::trace!("'{text}' matched rule {}", rule.name);
            return Classification::Classified(category);
        }
    }
    Classification::Unrecognized
}

/// CALL/PUT when the product name carries an option strike/expiry suffix
pub fn option_subtype(product: &str) -> Option<Subtype> {
    let caps = OPTION_SUFFIX.captures(product)?;
    match caps[1].to_ascii_uppercase().as_str() {
        "C" => Some(Subtype::Call),
        _ => Some(Subtype::Put),
    }
}

fn is_trade_line(text: &str) -> bool {
    TRADE.is_match(text)
}

fn match_dividend(text: &str) -> Option<Category> {
    if is_trade_line(text) {
        return None;
    }
    if DIVIDEND_TAX.is_match(text) {
        return Some(Category::simple(TransactionType::Dividend, Subtype::Tax));
    }
    DIVIDEND
        .is_match(text)
        .then(|| Category::simple(TransactionType::Dividend, Subtype::None))
}

fn match_cash(text: &str) -> Option<Category> {
    if is_trade_line(text) {
        return None;
    }
    let subtype = if SWEEP.is_match(text) {
        Subtype::Sweep
    } else if WITHDRAWAL.is_match(text) {
        Subtype::Withdrawal
    } else if DEPOSIT.is_match(text) {
        Subtype::Deposit
    } else {
        return None;
    };
    Some(Category::simple(TransactionType::Cash, subtype))
}

fn match_fee(text: &str) -> Option<Category> {
    if is_trade_line(text) {
        return None;
    }
    FEE.is_match(text)
        .then(|| Category::simple(TransactionType::Fee, Subtype::None))
}

fn match_product_change(text: &str) -> Option<Category> {
    PRODUCT_CHANGE
        .is_match(text)
        .then(|| Category::simple(TransactionType::ProductChange, Subtype::None))
}

fn match_trade(text: &str) -> Option<Category> {
    let caps = TRADE.captures(text)?;
    let side = match caps[1].to_lowercase().as_str() {
        "buy" | "koop" => Side::Buy,
        _ => Side::Sell,
    };
    let quantity = parse_quantity(&caps[2])?;
    let product = caps[3].trim().to_string();
    let price = parse_decimal(&caps[4])?;
    let (kind, subtype) = match option_subtype(&product) {
        Some(subtype) => (TransactionType::Option, subtype),
        None => (TransactionType::Stock, Subtype::None),
    };
    Some(Category {
        kind,
        subtype,
        trade: Some(TradeFields {
            side,
            quantity,
            product,
            price,
        }),
    })
}

/// Trade quantities: `1,000` groups thousands, `2,5` is a decimal comma
fn parse_quantity(raw: &str) -> Option<Decimal> {
    if GROUPED_THOUSANDS.is_match(raw) {
        return parse_decimal(&raw.replace(',', ""));
    }
    parse_decimal(raw)
}
