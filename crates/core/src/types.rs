//! Core data types for the intraday feature pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feature_set::FeatureSet;

/// Canonical timestamp column.
pub const TIMESTAMP_COLUMN: &str = "timestamp";
/// Canonical entity column.
pub const SYMBOL_COLUMN: &str = "stock_symbol";

/// Canonical column order of the combined dataset.
pub const CANONICAL_COLUMNS: [&str; 7] = [
    TIMESTAMP_COLUMN,
    SYMBOL_COLUMN,
    "open_price",
    "high_price",
    "low_price",
    "close_price",
    "volume",
];

/// One timestamped OHLCV observation for one symbol.
///
/// Records are created once by ingestion and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Observation instant (UTC).
    pub timestamp: DateTime<Utc>,
    /// Symbol identifier.
    #[serde(rename = "stock_symbol")]
    pub symbol: String,
    /// Open price.
    #[serde(rename = "open_price")]
    pub open: f64,
    /// High price.
    #[serde(rename = "high_price")]
    pub high: f64,
    /// Low price.
    #[serde(rename = "low_price")]
    pub low: f64,
    /// Close price.
    #[serde(rename = "close_price")]
    pub close: f64,
    /// Traded volume (non-negative).
    pub volume: f64,
}

/// A numeric field of a [`Record`] that features can be derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl SourceField {
    /// All numeric fields in canonical column order.
    pub const ALL: [SourceField; 5] = [
        SourceField::Open,
        SourceField::High,
        SourceField::Low,
        SourceField::Close,
        SourceField::Volume,
    ];

    /// Read this field from a record.
    #[inline]
    pub fn value(self, record: &Record) -> f64 {
        match self {
            SourceField::Open => record.open,
            SourceField::High => record.high,
            SourceField::Low => record.low,
            SourceField::Close => record.close,
            SourceField::Volume => record.volume,
        }
    }

    /// Canonical column name in the combined dataset and feature table.
    pub fn column_name(self) -> &'static str {
        match self {
            SourceField::Open => "open_price",
            SourceField::High => "high_price",
            SourceField::Low => "low_price",
            SourceField::Close => "close_price",
            SourceField::Volume => "volume",
        }
    }
}

/// A record plus its derived feature values and forward label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Source observation.
    pub record: Record,
    /// Derived values, positionally matching the feature set's columns.
    pub features: Vec<f64>,
    /// Forward label (1 = close rises over the horizon, 0 otherwise).
    pub label: u8,
}

/// Feature rows ordered by (symbol, timestamp), tagged with the
/// feature-set declaration that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    /// Declaration the rows were computed with.
    pub feature_set: FeatureSet,
    /// Rows grouped by symbol, ascending timestamp within each group.
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Create a table from already-ordered rows.
    pub fn new(feature_set: FeatureSet, rows: Vec<FeatureRow>) -> Self {
        Self { feature_set, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct symbols in row order.
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = Vec::new();
        for row in &self.rows {
            if symbols.last() != Some(&row.record.symbol.as_str()) {
                symbols.push(row.record.symbol.as_str());
            }
        }
        symbols
    }

    /// Rows belonging to one symbol.
    pub fn rows_for<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a FeatureRow> + 'a {
        self.rows.iter().filter(move |r| r.record.symbol == symbol)
    }

    /// Values of a derived feature column, if the feature set declares it.
    pub fn feature_values(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.feature_set.feature_index(name)?;
        Some(self.rows.iter().map(|r| r.features[idx]).collect())
    }

    /// Labels in row order.
    pub fn labels(&self) -> Vec<u8> {
        self.rows.iter().map(|r| r.label).collect()
    }
}
