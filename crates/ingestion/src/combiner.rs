//! Concatenation of per-symbol series into one combined dataset.

use std::fs::{self, File};
use std::path::Path;

use intraday_core::{Record, Result};
use tracing::debug;

use crate::reader::SymbolSeries;

/// Records from every symbol, concatenated in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedDataset {
    pub records: Vec<Record>,
}

impl CombinedDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct symbols in order of first appearance.
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = Vec::new();
        for record in &self.records {
            if !symbols.contains(&record.symbol.as_str()) {
                symbols.push(record.symbol.as_str());
            }
        }
        symbols
    }

    /// First `rows` records of the concatenation.
    ///
    /// This is a positional cut, not a per-symbol sample: symbols that come
    /// late in the concatenation may be missing from the result entirely.
    pub fn head(&self, rows: usize) -> CombinedDataset {
        let sample = CombinedDataset {
            records: self.records.iter().take(rows).cloned().collect(),
        };
        debug!(
            rows = sample.len(),
            symbols = ?sample.symbols(),
            "took head sample of combined dataset"
        );
        sample
    }

    /// Write the canonical combined CSV.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        write_csv(path, &self.records)
    }
}

/// Concatenates per-symbol series.
pub struct Combiner;

impl Combiner {
    /// Concatenate series in the order given.
    pub fn combine(series: Vec<SymbolSeries>) -> CombinedDataset {
        let total = series.iter().map(SymbolSeries::len).sum();
        let mut records = Vec::with_capacity(total);
        for s in series {
            records.extend(s.records);
        }
        CombinedDataset { records }
    }
}

/// Write records with canonical column names, creating parent directories.
pub fn write_csv(path: &Path, records: &[Record]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(File::create(path)?);
    writer.write_record(intraday_core::CANONICAL_COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
