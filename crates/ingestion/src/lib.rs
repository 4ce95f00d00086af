//! Raw data ingestion for the intraday feature pipeline.
//!
//! This crate handles:
//! - Column-name resolution across raw file variants
//! - Best-effort timestamp parsing (bad rows are dropped)
//! - Per-symbol reads from a raw directory
//! - Combining series into the full and sampled datasets

pub mod combiner;
pub mod reader;

pub use combiner::{write_csv, CombinedDataset, Combiner};
pub use reader::{
    parse_timestamp, symbol_from_path, ColumnMap, ColumnResolver, IngestStats, Ingestor,
    RawField, SymbolSeries,
};
