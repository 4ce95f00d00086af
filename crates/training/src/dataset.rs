//! Design matrix construction from a feature table.

use std::collections::BTreeSet;

use intraday_core::{Error, FeatureTable, Result, SourceField, SYMBOL_COLUMN};

/// Prefix of one-hot symbol indicator columns.
pub fn dummy_prefix() -> String {
    format!("{SYMBOL_COLUMN}_")
}

/// Row-major numeric inputs with binary labels.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    /// Column names, positionally matching each row.
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
}

impl DesignMatrix {
    /// Base OHLCV, the feature set's columns, then one-hot symbol indicators.
    ///
    /// Symbols are sorted and the first is dropped, so a table with a single
    /// symbol gets no indicator columns.
    pub fn from_table(table: &FeatureTable) -> Result<Self> {
        if table.is_empty() {
            return Err(Error::empty_input("feature table has no rows to train on"));
        }

        let symbols: BTreeSet<&str> = table.rows.iter().map(|r| r.record.symbol.as_str()).collect();
        let dummies: Vec<&str> = symbols.into_iter().skip(1).collect();

        let prefix = dummy_prefix();
        let mut feature_names: Vec<String> = SourceField::ALL
            .iter()
            .map(|f| f.column_name().to_string())
            .collect();
        feature_names.extend(table.feature_set.feature_names().into_iter().map(String::from));
        feature_names.extend(dummies.iter().map(|s| format!("{prefix}{s}")));

        let rows = table
            .rows
            .iter()
            .map(|row| {
                let mut values: Vec<f64> = SourceField::ALL.iter().map(|f| f.value(&row.record)).collect();
                values.extend_from_slice(&row.features);
                values.extend(
                    dummies
                        .iter()
                        .map(|s| if row.record.symbol == *s { 1.0 } else { 0.0 }),
                );
                values
            })
            .collect();

        Ok(Self {
            feature_names,
            rows,
            labels: table.labels(),
        })
    }

    pub fn n_samples(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Reorder columns to `names`.
    ///
    /// Indicator columns missing here are filled with zeros (the symbol is
    /// absent from this data); any other missing column is an error.
    pub fn align_to(&self, names: &[String]) -> Result<Self> {
        let prefix = dummy_prefix();
        let mut sources = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.feature_names.iter().position(|n| n == name) {
                Some(idx) => sources.push(Some(idx)),
                None if name.starts_with(&prefix) => sources.push(None),
                None => missing.push(name.as_str()),
            }
        }
        if !missing.is_empty() {
            return Err(Error::missing_columns(missing));
        }

        let rows = self
            .rows
            .iter()
            .map(|row| {
                sources
                    .iter()
                    .map(|src| src.map_or(0.0, |i| row[i]))
                    .collect()
            })
            .collect();

        Ok(Self {
            feature_names: names.to_vec(),
            rows,
            labels: self.labels.clone(),
        })
    }

    /// Subset of rows, in the given order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}
