//! Schema command - print the processed transaction store format

use crate::core::{ProcessedCsvRecord, ProcessedTransaction};
use clap::Args;
use schemars::schema_for;

#[derive(Args, Debug)]
pub struct SchemaCommand {
    /// Output format: json-schema, csv-header or csv-fields
    #[arg(value_enum, default_value = "csv-fields")]
    format: SchemaFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SchemaFormat {
    /// JSON Schema of a processed transaction
    JsonSchema,
    /// CSV header row with column names
    CsvHeader,
    /// CSV column descriptions
    CsvFields,
}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        match self.format {
            SchemaFormat::JsonSchema => self.print_json_schema(),
            SchemaFormat::CsvHeader => self.print_csv_header(),
            SchemaFormat::CsvFields => self.print_csv_fields(),
        }
    }

    fn print_json_schema(&self) -> anyhow::Result<()> {
        let schema = schema_for!(ProcessedTransaction);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        Ok(())
    }

    fn print_csv_header(&self) -> anyhow::Result<()> {
        println!("{}", ProcessedCsvRecord::csv_header().join(","));
        Ok(())
    }

    fn print_csv_fields(&self) -> anyhow::Result<()> {
        println!("Processed Transaction CSV Format");
        println!("================================");
        println!();
        for field in ProcessedCsvRecord::csv_schema() {
            let req = if field.required { "required" } else { "optional" };
            println!(
                "{:18} ({:8}) {:14} {}",
                field.name, req, field.value_type, field.description
            );
        }
        println!();
        println!("Rate convention: exchange_rate is units of currency per unit of reporting currency");
        Ok(())
    }
}
