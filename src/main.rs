mod brokers;
mod cmd;
mod core;
mod utils;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "brokertax", version)]
#[command(about = "Import broker statements and report FIFO capital gains and dividends")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a DEGIRO or Interactive Brokers statement into processed transactions (CSV)
    Import(cmd::import::ImportCommand),
    /// Realized gains from FIFO lot matching
    Gains(cmd::gains::GainsCommand),
    /// Dividends and withholding tax by year and country
    Dividends(cmd::dividends::DividendsCommand),
    /// Open positions at cost basis and market value
    Holdings(cmd::holdings::HoldingsCommand),
    /// Describe the processed transaction CSV format
    Schema(cmd::schema::SchemaCommand),
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Import(import) => import.exec(),
        Command::Gains(gains) => gains.exec(),
        Command::Dividends(dividends) => dividends.exec(),
        Command::Holdings(holdings) => holdings.exec(),
        Command::Schema(schema) => schema.exec(),
    }
}
