//! Gains command - FIFO realized gains per sale and per (year, instrument)

use crate::cmd::read_processed;
use crate::core::{gains_by_year_and_instrument, match_lots, GainSummary, RealizedGainRecord, Warning};
use crate::utils::{format_amount, format_quantity};
use clap::Args;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct GainsCommand {
    /// Processed transactions CSV. Reads from stdin if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Only report sales in this calendar year
    #[arg(short, long)]
    year: Option<i32>,

    /// Only include transactions of this user
    #[arg(short, long)]
    user: Option<String>,

    /// Show one row per matched lot instead of per instrument
    #[arg(long)]
    detail: bool,

    /// Output as JSON instead of formatted table
    #[arg(long, conflicts_with = "csv")]
    json: bool,

    /// Output matched lots as CSV
    #[arg(long)]
    csv: bool,
}

#[derive(Debug, Serialize)]
struct GainsOutput<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    year: Option<i32>,
    records: &'a [RealizedGainRecord],
    summary: Vec<GainSummary>,
    #[serde(with = "rust_decimal::serde::str")]
    total_delta: Decimal,
    warnings: &'a [Warning],
}

/// CSV record for realized gain output
#[derive(Debug, Serialize, Deserialize)]
pub struct RealizedGainCsvRecord {
    pub sale_date: String,
    pub instrument: String,
    pub product: String,
    pub country: String,
    pub quantity: String,
    pub sale_value: String,
    pub purchase_date: String,
    pub purchase_value: String,
    pub delta: String,
    pub zero_cost_basis: bool,
}

impl From<&RealizedGainRecord> for RealizedGainCsvRecord {
    fn from(r: &RealizedGainRecord) -> Self {
        RealizedGainCsvRecord {
            sale_date: r.sale_date.format("%Y-%m-%d").to_string(),
            instrument: r.instrument.clone(),
            product: r.product.clone(),
            country: r.country.to_string(),
            quantity: r.quantity.normalize().to_string(),
            sale_value: r.sale_value.round_dp(2).to_string(),
            purchase_date: r
                .purchase_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            purchase_value: r.purchase_value.round_dp(2).to_string(),
            delta: r.delta.round_dp(2).to_string(),
            zero_cost_basis: r.zero_cost_basis,
        }
    }
}

#[derive(Debug, Tabled)]
struct DetailRow {
    #[tabled(rename = "Sold")]
    sale_date: String,
    #[tabled(rename = "Instrument")]
    instrument: String,
    #[tabled(rename = "Quantity")]
    quantity: String,
    #[tabled(rename = "Bought")]
    purchase_date: String,
    #[tabled(rename = "Sale Value")]
    sale_value: String,
    #[tabled(rename = "Purchase Value")]
    purchase_value: String,
    #[tabled(rename = "Delta")]
    delta: String,
}

#[derive(Debug, Tabled)]
struct SummaryRow {
    #[tabled(rename = "Year")]
    year: i32,
    #[tabled(rename = "Instrument")]
    instrument: String,
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Quantity")]
    quantity: String,
    #[tabled(rename = "Sale Value")]
    sale_value: String,
    #[tabled(rename = "Purchase Value")]
    purchase_value: String,
    #[tabled(rename = "Delta")]
    delta: String,
}

impl GainsCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let transactions = read_processed(&self.file, self.user.as_deref())?;
        // lots need the full history, the year filter applies to sales only
        let mut report = match_lots(&transactions);
        if let Some(year) = self.year {
            report = report.in_year(year);
        }
        let summary = gains_by_year_and_instrument(&report.records, self.year);
        let total_delta = report.total_delta();

        if self.csv {
            crate::utils::write_csv(
                report.records.iter().map(RealizedGainCsvRecord::from),
                std::io::stdout(),
            )?;
        } else if self.json {
            let output = GainsOutput {
                year: self.year,
                records: &report.records,
                summary,
                total_delta,
                warnings: &report.warnings,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            self.print_table(&report.records, &summary, total_delta, &report.warnings);
        }
        Ok(())
    }

    fn print_table(
        &self,
        records: &[RealizedGainRecord],
        summary: &[GainSummary],
        total_delta: Decimal,
        warnings: &[Warning],
    ) {
        let year_str = self.year.map_or("All Years".to_string(), |y| y.to_string());
        if records.is_empty() {
            println!("No realized gains found ({})", year_str);
            return;
        }

        println!();
        println!("REALIZED GAINS ({})", year_str);
        println!();

        let mut table = if self.detail {
            let rows: Vec<DetailRow> = records
                .iter()
                .map(|r| DetailRow {
                    sale_date: r.sale_date.format("%Y-%m-%d").to_string(),
                    instrument: r.instrument.clone(),
                    quantity: format_quantity(r.quantity),
                    purchase_date: r
                        .purchase_date
                        .map_or("zero cost".to_string(), |d| d.format("%Y-%m-%d").to_string()),
                    sale_value: format_amount(r.sale_value),
                    purchase_value: format_amount(r.purchase_value),
                    delta: format_amount(r.delta),
                })
                .collect();
            Table::new(rows)
        } else {
            let rows: Vec<SummaryRow> = summary
                .iter()
                .map(|s| SummaryRow {
                    year: s.year,
                    instrument: s.instrument.clone(),
                    product: s.product.clone(),
                    quantity: format_quantity(s.quantity),
                    sale_value: format_amount(s.sale_value),
                    purchase_value: format_amount(s.purchase_value),
                    delta: format_amount(s.delta),
                })
                .collect();
            Table::new(rows)
        };
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()));
        println!("{}", table);
        println!();
        println!("Total delta: {}", format_amount(total_delta));

        for warning in warnings {
            println!("WARNING: {}", warning);
        }
    }
}
