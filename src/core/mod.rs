pub mod aggregate;
pub mod classify;
pub mod country;
pub mod fifo;
pub mod fx;
pub mod processor;
pub mod record;
pub mod sanitize;
pub mod transaction;
pub mod warnings;

pub use aggregate::{dividend_summary, gains_by_year_and_instrument, holdings, DividendSummary, GainSummary, Holding};
pub use country::CountryTable;
pub use fifo::{match_lots, RealizedGainRecord};
pub use fx::CurrencyConverter;
pub use processor::{Processor, ProcessorConfig};
pub use record::{read_processed, read_quotes, write_processed, ProcessedCsvRecord};
pub use sanitize::FieldLimits;
pub use transaction::{CanonicalTransaction, ProcessedTransaction, Side, Subtype, TransactionType};
pub use warnings::Warning;
