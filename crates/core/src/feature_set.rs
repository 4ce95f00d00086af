//! Versioned feature-set declarations.
//!
//! The columns a feature table carries are declared here rather than
//! hardcoded in the builder, so the registry and the trainer can bind to a
//! named, numbered version of the schema.

use serde::{Deserialize, Serialize};

use crate::config::FeatureConfig;
use crate::error::{Error, Result};
use crate::types::{SourceField, SYMBOL_COLUMN, TIMESTAMP_COLUMN};

/// Name shared by all declared versions.
pub const FEATURE_SET_NAME: &str = "minute_features";

/// Column holding the forward label. Stored, never served.
pub const LABEL_COLUMN: &str = "label";

/// Percent-change and short moving averages (`ret_1m`, `ma_5`, `ma_15`, `vol_ma_5`).
pub const INDICATORS_VERSION: u32 = 1;

/// Windowed close mean and volume aggregate over `W` rows.
pub const ROLLING_VERSION: u32 = 2;

/// How the volume window is aggregated in the rolling feature set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeAggregate {
    #[default]
    Sum,
    Mean,
}

/// How a single feature column is derived from a symbol's series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureKind {
    /// Mean over the trailing `window` rows (fewer during warm-up).
    RollingMean { source: SourceField, window: usize },
    /// Sum over the trailing `window` rows (fewer during warm-up).
    RollingSum { source: SourceField, window: usize },
    /// `value[i] / value[i - periods] - 1`; undefined for the first `periods` rows.
    PctChange { source: SourceField, periods: usize },
}

impl FeatureKind {
    /// Source field the feature reads.
    pub fn source(&self) -> SourceField {
        match *self {
            FeatureKind::RollingMean { source, .. }
            | FeatureKind::RollingSum { source, .. }
            | FeatureKind::PctChange { source, .. } => source,
        }
    }
}

/// A named derived column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    #[serde(flatten)]
    pub kind: FeatureKind,
}

impl FeatureColumn {
    pub fn new(name: impl Into<String>, kind: FeatureKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Forward label definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpec {
    /// Stored column name.
    pub name: String,
    /// Field compared against its value `horizon` rows ahead.
    pub source: SourceField,
    /// Lookahead in rows.
    pub horizon: usize,
}

/// A named, versioned feature schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub name: String,
    pub version: u32,
    /// Entity key column.
    pub entity: String,
    /// Event timestamp column.
    pub timestamp_field: String,
    /// Derived columns in storage order.
    pub columns: Vec<FeatureColumn>,
    pub label: LabelSpec,
}

impl FeatureSet {
    fn with_columns(version: u32, columns: Vec<FeatureColumn>, horizon: usize) -> Self {
        Self {
            name: FEATURE_SET_NAME.to_string(),
            version,
            entity: SYMBOL_COLUMN.to_string(),
            timestamp_field: TIMESTAMP_COLUMN.to_string(),
            columns,
            label: LabelSpec {
                name: LABEL_COLUMN.to_string(),
                source: SourceField::Close,
                horizon,
            },
        }
    }

    /// Version 1: `ret_1m`, `ma_5`, `ma_15`, `vol_ma_5`.
    pub fn indicators(horizon: usize) -> Self {
        let columns = vec![
            FeatureColumn::new(
                "ret_1m",
                FeatureKind::PctChange { source: SourceField::Close, periods: 1 },
            ),
            FeatureColumn::new(
                "ma_5",
                FeatureKind::RollingMean { source: SourceField::Close, window: 5 },
            ),
            FeatureColumn::new(
                "ma_15",
                FeatureKind::RollingMean { source: SourceField::Close, window: 15 },
            ),
            FeatureColumn::new(
                "vol_ma_5",
                FeatureKind::RollingMean { source: SourceField::Volume, window: 5 },
            ),
        ];
        Self::with_columns(INDICATORS_VERSION, columns, horizon)
    }

    /// Version 2: `rolling_close_mean_{W}` and `rolling_volume_agg_{W}`.
    pub fn rolling(window: usize, horizon: usize, volume_agg: VolumeAggregate) -> Self {
        let volume_kind = match volume_agg {
            VolumeAggregate::Sum => FeatureKind::RollingSum { source: SourceField::Volume, window },
            VolumeAggregate::Mean => FeatureKind::RollingMean { source: SourceField::Volume, window },
        };
        let columns = vec![
            FeatureColumn::new(
                format!("rolling_close_mean_{window}"),
                FeatureKind::RollingMean { source: SourceField::Close, window },
            ),
            FeatureColumn::new(format!("rolling_volume_agg_{window}"), volume_kind),
        ];
        Self::with_columns(ROLLING_VERSION, columns, horizon)
    }

    /// Resolve a declared version number.
    pub fn for_version(
        version: u32,
        window: usize,
        horizon: usize,
        volume_agg: VolumeAggregate,
    ) -> Result<Self> {
        match version {
            INDICATORS_VERSION => Ok(Self::indicators(horizon)),
            ROLLING_VERSION => Ok(Self::rolling(window, horizon, volume_agg)),
            other => Err(Error::config(format!(
                "unknown feature set version {other} (known: {INDICATORS_VERSION}, {ROLLING_VERSION})"
            ))),
        }
    }

    /// Build the declaration selected by the feature configuration.
    pub fn from_config(config: &FeatureConfig) -> Result<Self> {
        Self::for_version(
            config.feature_set_version,
            config.window,
            config.horizon,
            config.volume_agg,
        )
    }

    /// Derived column names in storage order.
    pub fn feature_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Position of a derived column.
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Columns a serving layer may expose: raw OHLCV plus derived features.
    /// The label is never included.
    pub fn servable_columns(&self) -> Vec<&str> {
        SourceField::ALL
            .iter()
            .map(|f| f.column_name())
            .chain(self.columns.iter().map(|c| c.name.as_str()))
            .collect()
    }

    /// Full stored schema, in order.
    pub fn stored_columns(&self) -> Vec<&str> {
        let mut columns = vec![self.timestamp_field.as_str(), self.entity.as_str()];
        columns.extend(self.servable_columns());
        columns.push(self.label.name.as_str());
        columns
    }

    /// Whether `other` describes the same schema (name, version, columns, label).
    pub fn is_compatible_with(&self, other: &FeatureSet) -> bool {
        self == other
    }

    /// Short identifier such as `minute_features:v2`.
    pub fn id(&self) -> String {
        format!("{}:v{}", self.name, self.version)
    }

    /// Serialize for embedding in file metadata.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an embedded declaration.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
