//! Feature table construction.
//!
//! Records are partitioned by symbol, each partition is ordered by
//! timestamp, and every derived column is computed strictly inside its
//! partition. Rows lacking any feature value or a forward label are left
//! out of the table.

use std::collections::BTreeMap;
use std::path::Path;

use intraday_core::{
    config::FeatureConfig, Error, FeatureKind, FeatureRow, FeatureSet, FeatureTable, Record,
    Result,
};
use intraday_ingestion::Ingestor;
use tracing::{debug, info};

use crate::label::forward_labels;
use crate::rolling::{pct_change, rolling_mean, rolling_sum};

/// Builds feature tables for one declared feature set.
pub struct FeatureBuilder {
    feature_set: FeatureSet,
}

impl FeatureBuilder {
    /// Create a builder for a declared feature set.
    pub fn new(feature_set: FeatureSet) -> Self {
        Self { feature_set }
    }

    /// Create a builder from the feature configuration.
    pub fn from_config(config: &FeatureConfig) -> Result<Self> {
        Ok(Self::new(FeatureSet::from_config(config)?))
    }

    /// The declaration this builder computes.
    pub fn feature_set(&self) -> &FeatureSet {
        &self.feature_set
    }

    /// Read a combined CSV and build its feature table.
    ///
    /// Fails with `MissingColumn` when the file lacks a required field.
    pub fn build_from_csv(&self, path: &Path) -> Result<FeatureTable> {
        let mut ingestor = Ingestor::default();
        let records = ingestor.read_combined(path)?;
        debug!(
            path = %path.display(),
            rows = records.len(),
            dropped = ingestor.stats().dropped(),
            "read combined dataset"
        );
        self.build(&records)
    }

    /// Build the feature table.
    ///
    /// Output is grouped by symbol in ascending lexicographic order, then
    /// ascending timestamp; records sharing a timestamp keep input order.
    pub fn build(&self, records: &[Record]) -> Result<FeatureTable> {
        if records.is_empty() {
            return Err(Error::empty_input("combined dataset has no rows to featurize"));
        }

        let mut partitions: BTreeMap<&str, Vec<&Record>> = BTreeMap::new();
        for record in records {
            partitions.entry(record.symbol.as_str()).or_default().push(record);
        }

        let n_symbols = partitions.len();
        let mut rows = Vec::with_capacity(records.len());
        for (symbol, mut series) in partitions {
            series.sort_by_key(|r| r.timestamp);
            let before = rows.len();
            self.featurize_series(&series, &mut rows);
            debug!(
                symbol,
                rows_in = series.len(),
                rows_out = rows.len() - before,
                "featurized symbol"
            );
        }

        if rows.is_empty() {
            return Err(Error::empty_input(format!(
                "no rows left after featurizing {} rows across {} symbol(s); \
                 each series needs more than {} rows",
                records.len(),
                n_symbols,
                self.feature_set.label.horizon
            )));
        }

        let table = FeatureTable::new(self.feature_set.clone(), rows);
        info!(
            feature_set = %self.feature_set.id(),
            rows_in = records.len(),
            rows_out = table.len(),
            symbols = table.symbols().len(),
            "built feature table"
        );
        Ok(table)
    }

    /// Featurize one symbol's time-ordered series, appending kept rows.
    fn featurize_series(&self, series: &[&Record], out: &mut Vec<FeatureRow>) {
        let columns: Vec<Vec<Option<f64>>> = self
            .feature_set
            .columns
            .iter()
            .map(|column| compute_column(column.kind, series))
            .collect();

        let label = &self.feature_set.label;
        let label_source: Vec<f64> = series.iter().map(|r| label.source.value(r)).collect();
        let labels = forward_labels(&label_source, label.horizon);

        for (i, record) in series.iter().enumerate() {
            let Some(label) = labels[i] else {
                continue;
            };
            let features: Option<Vec<f64>> = columns.iter().map(|c| c[i]).collect();
            let Some(features) = features else {
                continue;
            };
            out.push(FeatureRow {
                record: (*record).clone(),
                features,
                label,
            });
        }
    }
}

/// Compute one derived column over a symbol's series.
fn compute_column(kind: FeatureKind, series: &[&Record]) -> Vec<Option<f64>> {
    let values: Vec<f64> = series.iter().map(|r| kind.source().value(r)).collect();
    match kind {
        FeatureKind::RollingMean { window, .. } => rolling_mean(&values, window),
        FeatureKind::RollingSum { window, .. } => rolling_sum(&values, window),
        FeatureKind::PctChange { periods, .. } => pct_change(&values, periods),
    }
}
