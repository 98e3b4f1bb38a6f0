pub mod dividends;
pub mod gains;
pub mod holdings;
pub mod import;
pub mod schema;

use crate::core::ProcessedTransaction;
use anyhow::Context;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Read a whole input file, or stdin with "-"
pub fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if path.as_os_str() == "-" {
        io::stdin().lock().read_to_end(&mut buffer)?;
        if buffer.is_empty() {
            anyhow::bail!("No input received. Provide a file or pipe data to stdin.");
        }
    } else {
        File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?
            .read_to_end(&mut buffer)?;
    }
    Ok(buffer)
}

/// Read the processed transaction store (CSV), optionally limited to one user
pub fn read_processed(path: &Path, user: Option<&str>) -> anyhow::Result<Vec<ProcessedTransaction>> {
    let bytes = read_input(path)?;
    let transactions = crate::core::read_processed(bytes.as_slice())
        .with_context(|| format!("Failed to read processed transactions from {}", path.display()))?;
    Ok(match user {
        Some(user) => transactions.into_iter().filter(|t| t.user == user).collect(),
        None => transactions,
    })
}

pub fn open_reader(path: &Path) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}
