//! Holdings command - open lots valued at cost and market

use crate::cmd::{open_reader, read_processed};
use crate::core::{holdings, match_lots, read_quotes, Holding};
use crate::utils::{format_amount, format_quantity};
use anyhow::Context;
use chrono::Datelike;
use clap::Args;
use std::collections::HashMap;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct HoldingsCommand {
    /// Processed transactions CSV. Reads from stdin if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Holdings as of the end of this calendar year
    #[arg(short, long)]
    year: Option<i32>,

    /// Only include transactions of this user
    #[arg(short, long)]
    user: Option<String>,

    /// Market prices CSV (instrument,price) in the reporting currency
    #[arg(short, long)]
    quotes: Option<PathBuf>,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Tabled)]
struct HoldingRow {
    #[tabled(rename = "Instrument")]
    instrument: String,
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Country")]
    country: String,
    #[tabled(rename = "Quantity")]
    quantity: String,
    #[tabled(rename = "Cost Basis")]
    cost_basis: String,
    #[tabled(rename = "Market Value")]
    market_value: String,
}

impl HoldingsCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let mut transactions = read_processed(&self.file, self.user.as_deref())?;
        if let Some(year) = self.year {
            transactions.retain(|t| t.date().year() <= year);
        }
        let quotes = match &self.quotes {
            Some(path) => read_quotes(open_reader(path)?)
                .with_context(|| format!("Failed to read quotes from {}", path.display()))?,
            None => HashMap::new(),
        };

        let report = match_lots(&transactions);
        let holdings = holdings(&report, &quotes);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&holdings)?);
        } else {
            self.print_table(&holdings);
        }
        Ok(())
    }

    fn print_table(&self, holdings: &[Holding]) {
        let year_str = self.year.map_or("Current".to_string(), |y| format!("End of {}", y));
        if holdings.is_empty() {
            println!("No open positions ({})", year_str);
            return;
        }

        let rows: Vec<HoldingRow> = holdings
            .iter()
            .map(|h| HoldingRow {
                instrument: h.instrument.clone(),
                product: h.product.clone(),
                country: h.country.clone(),
                quantity: format_quantity(h.quantity),
                cost_basis: format_amount(h.cost_basis),
                market_value: h.market_value.map(format_amount).unwrap_or_else(|| "-".to_string()),
            })
            .collect();

        println!();
        println!("HOLDINGS ({})", year_str);
        println!();
        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
    }
}
