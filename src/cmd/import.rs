//! Import command - parse a broker statement into processed transactions

use crate::brokers::Broker;
use crate::cmd::{open_reader, read_input};
use crate::core::{
    write_processed, CountryTable, CurrencyConverter, FieldLimits, Processor, ProcessorConfig,
};
use anyhow::Context;
use clap::Args;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead};
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct ImportCommand {
    /// Broker statement file. Reads from stdin if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Statement format
    #[arg(short, long, value_enum, default_value_t = Broker::Auto)]
    broker: Broker,

    /// Historical exchange rates (JSON)
    #[arg(short, long)]
    rates: PathBuf,

    /// Country reference table (JSON)
    #[arg(short, long)]
    countries: PathBuf,

    /// Owner of the imported transactions
    #[arg(short, long)]
    user: String,

    /// Currency all amounts are converted into
    #[arg(long, default_value = "EUR")]
    reporting_currency: String,

    /// Content hashes already stored for this user, one per line
    #[arg(long)]
    known_hashes: Option<PathBuf>,

    /// Output CSV file for processed transactions (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum length of the description field
    #[arg(long, default_value_t = FieldLimits::default().description)]
    max_description: usize,

    /// Print the import summary as JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct ImportSummary {
    reporting_currency: String,
    parsed: usize,
    skipped: usize,
    processed: usize,
    rejected: usize,
    duplicates: usize,
    approximate_rates: usize,
    issues: Vec<IssueRow>,
}

#[derive(Debug, Clone, Serialize, Tabled)]
struct IssueRow {
    #[tabled(rename = "Stage")]
    stage: &'static str,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

impl ImportCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let rates = CurrencyConverter::from_json(&self.reporting_currency, open_reader(&self.rates)?)
            .with_context(|| format!("Failed to load rates from {}", self.rates.display()))?;
        if rates.is_empty() {
            log::warn!("No exchange rates loaded, foreign currency amounts stay unconverted");
        }
        let countries = CountryTable::from_json(open_reader(&self.countries)?)
            .with_context(|| format!("Failed to load countries from {}", self.countries.display()))?;
        let known_hashes = self.read_known_hashes()?;

        let mut config = ProcessorConfig::new(&self.user);
        config.limits.description = self.max_description;

        let bytes = read_input(&self.file)?;
        let statement = self
            .broker
            .parse(&bytes)
            .with_context(|| format!("Rejected statement {}", self.file.display()))?;
        let parsed = statement.transactions.len();

        let processor = Processor::new(&config, &rates, &countries);
        let outcome = processor.process_batch(statement.transactions, &known_hashes)?;

        match &self.output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                write_processed(&outcome.processed, file)?;
            }
            None => write_processed(&outcome.processed, io::stdout().lock())?,
        }

        let mut issues: Vec<IssueRow> = statement
            .skipped
            .iter()
            .map(|s| IssueRow {
                stage: "parse",
                date: s.datetime.map(|d| d.date().to_string()).unwrap_or_default(),
                description: s.text.clone(),
                reason: s.reason.clone(),
            })
            .collect();
        issues.extend(outcome.rejected.iter().map(|r| IssueRow {
            stage: "process",
            date: r.datetime.date().to_string(),
            description: r.description.clone(),
            reason: r.reason.to_string(),
        }));

        let summary = ImportSummary {
            reporting_currency: rates.reporting_currency().to_string(),
            parsed,
            skipped: statement.skipped.len(),
            processed: outcome.processed.len(),
            rejected: outcome.rejected.len(),
            duplicates: outcome.duplicate_count(),
            approximate_rates: outcome.approximate_count(),
            issues,
        };
        if self.json {
            eprintln!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_summary(&summary);
        }
        Ok(())
    }

    fn read_known_hashes(&self) -> anyhow::Result<HashSet<String>> {
        let Some(path) = &self.known_hashes else {
            return Ok(HashSet::new());
        };
        let mut hashes = HashSet::new();
        for line in open_reader(path)?.lines() {
            let line = line?;
            let hash = line.trim();
            if !hash.is_empty() {
                hashes.insert(hash.to_lowercase());
            }
        }
        log::info!("Loaded {} known content hashes", hashes.len());
        Ok(hashes)
    }
}

/// Summary goes to stderr so stdout stays a clean CSV stream
fn print_summary(summary: &ImportSummary) {
    eprintln!();
    eprintln!("IMPORT SUMMARY ({})", summary.reporting_currency);
    eprintln!("  Parsed:            {}", summary.parsed);
    eprintln!("  Skipped on parse:  {}", summary.skipped);
    eprintln!("  Processed:         {}", summary.processed);
    eprintln!("  Rejected:          {}", summary.rejected);
    eprintln!("  Duplicates:        {}", summary.duplicates);
    eprintln!("  Approximate rates: {}", summary.approximate_rates);

    if !summary.issues.is_empty() {
        eprintln!();
        let table = Table::new(summary.issues.clone())
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::left()))
            .to_string();
        eprintln!("{}", table);
    }
}
