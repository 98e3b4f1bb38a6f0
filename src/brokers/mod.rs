//! Broker statement adapters producing canonical transactions.

pub mod degiro;
pub mod ibkr;

use crate::core::CanonicalTransaction;
use chrono::NaiveDateTime;

#[derive(Debug, thiserror::Error)]
pub enum FileFormatError {
    #[error("missing or unexpected header: {0}")]
    MissingHeader(String),
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed statement markup: {0}")]
    Markup(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::DeError> for FileFormatError {
    fn from(err: quick_xml::DeError) -> Self {
        FileFormatError::Markup(err.to_string())
    }
}

/// A source row left out of the statement, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    /// 1-based line for CSV input, element index for markup
    pub position: usize,
    pub datetime: Option<NaiveDateTime>,
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ParsedStatement {
    pub transactions: Vec<CanonicalTransaction>,
    pub skipped: Vec<SkippedRow>,
}

impl ParsedStatement {
    fn skip(
        &mut self,
        position: usize,
        datetime: Option<NaiveDateTime>,
        text: &str,
        reason: impl Into<String>,
    ) {
        let reason = reason.into();
        log::warn!("Skipping row {position} '{text}': {reason}");
        self.skipped.push(SkippedRow {
            position,
            datetime,
            text: text.to_string(),
            reason,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Broker {
    /// Detect from the file contents
    Auto,
    /// DEGIRO account statement CSV
    Degiro,
    /// Interactive Brokers Flex Query XML
    Ibkr,
}

impl Broker {
    /// Markup statements start with `<`, everything else is treated as CSV.
    pub fn detect(bytes: &[u8]) -> Broker {
        let first = bytes
            .strip_prefix(b"\xEF\xBB\xBF".as_slice())
            .unwrap_or(bytes)
            .iter()
            .find(|b| !b.is_ascii_whitespace());
        match first {
            Some(b'<') => Broker::Ibkr,
            _ => Broker::Degiro,
        }
    }

    pub fn parse(self, bytes: &[u8]) -> Result<ParsedStatement, FileFormatError> {
        let broker = match self {
            Broker::Auto => Broker::detect(bytes),
            other => other,
        };
        let statement = match broker {
            Broker::Ibkr => ibkr::parse(bytes)?,
            _ => degiro::parse(bytes)?,
        };
        log::info!(
            "Parsed {} transactions from {:?} statement, skipped {}",
            statement.transactions.len(),
            broker,
            statement.skipped.len()
        );
        Ok(statement)
    }
}
