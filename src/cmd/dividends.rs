//! Dividends command - gross dividends and withholding tax by year and country

use crate::cmd::read_processed;
use crate::core::{dividend_summary, DividendSummary};
use crate::utils::format_amount;
use clap::Args;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct DividendsCommand {
    /// Processed transactions CSV. Reads from stdin if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Calendar year to report
    #[arg(short, long)]
    year: Option<i32>,

    /// Only include transactions of this user
    #[arg(short, long)]
    user: Option<String>,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Tabled)]
struct DividendRow {
    #[tabled(rename = "Year")]
    year: i32,
    #[tabled(rename = "Country")]
    country: String,
    #[tabled(rename = "Gross")]
    gross: String,
    #[tabled(rename = "Withheld")]
    taxed: String,
    #[tabled(rename = "Net")]
    net: String,
}

impl DividendsCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let transactions = read_processed(&self.file, self.user.as_deref())?;
        let summary = dividend_summary(&transactions, self.year);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            self.print_table(&summary);
        }
        Ok(())
    }

    fn print_table(&self, summary: &DividendSummary) {
        let year_str = self.year.map_or("All Years".to_string(), |y| y.to_string());
        if summary.is_empty() {
            println!("No dividends found ({})", year_str);
            return;
        }

        let rows: Vec<DividendRow> = summary
            .iter()
            .flat_map(|(year, countries)| {
                countries.iter().map(move |(country, bucket)| DividendRow {
                    year: *year,
                    country: country.clone(),
                    gross: format_amount(bucket.gross_amt),
                    taxed: format_amount(bucket.taxed_amt),
                    net: format_amount(bucket.gross_amt + bucket.taxed_amt),
                })
            })
            .collect();

        println!();
        println!("DIVIDENDS ({})", year_str);
        println!();
        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
    }
}
