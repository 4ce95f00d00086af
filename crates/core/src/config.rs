//! Configuration structures for the intraday feature pipeline.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::feature_set::{FeatureSet, VolumeAggregate};

/// Main configuration for every pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input/output locations.
    pub paths: PathsConfig,
    /// Raw ingestion configuration.
    pub ingest: IngestConfig,
    /// Feature generation configuration.
    pub features: FeatureConfig,
    /// Model training configuration.
    pub training: TrainingConfig,
    /// Feature registry configuration.
    pub registry: RegistryConfig,
}

impl Config {
    /// Load a configuration file (TOML).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, or fall back to defaults if it does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.features.window == 0 {
            return Err(Error::config("features.window must be at least 1"));
        }
        if self.features.horizon == 0 {
            return Err(Error::config("features.horizon must be at least 1"));
        }
        if self.ingest.sample_rows == 0 {
            return Err(Error::config("ingest.sample_rows must be at least 1"));
        }
        if self.ingest.symbol_delimiter.is_empty() {
            return Err(Error::config("ingest.symbol_delimiter must not be empty"));
        }
        if !(self.training.test_ratio > 0.0 && self.training.test_ratio < 1.0) {
            return Err(Error::config(format!(
                "training.test_ratio must be in (0, 1), got {}",
                self.training.test_ratio
            )));
        }
        if self.training.n_trees == 0 {
            return Err(Error::config("training.n_trees must be at least 1"));
        }
        if self.training.min_samples_split < 2 {
            return Err(Error::config("training.min_samples_split must be at least 2"));
        }
        if self.training.min_samples_leaf == 0 {
            return Err(Error::config("training.min_samples_leaf must be at least 1"));
        }
        if let Some(ttl) = self.registry.ttl_seconds {
            if ttl < 0 || chrono::Duration::try_seconds(ttl).is_none() {
                return Err(Error::config(format!(
                    "registry.ttl_seconds must be non-negative and within range, got {ttl}"
                )));
            }
        }
        FeatureSet::from_config(&self.features)?;
        Ok(())
    }

    /// Combined dataset read by the feature builder.
    pub fn feature_input_path(&self) -> PathBuf {
        match self.features.input {
            DatasetVariant::Full => self.paths.full_csv_path(),
            DatasetVariant::Sample => self.paths.sample_csv_path(),
        }
    }
}

/// File locations, relative to the working directory unless absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory of raw per-symbol CSV files.
    pub raw_dir: PathBuf,
    /// Directory for combined datasets and the feature table.
    pub processed_dir: PathBuf,
    /// Full combined dataset file name.
    pub full_csv: String,
    /// Sampled combined dataset file name.
    pub sample_csv: String,
    /// Feature table file name.
    pub features_file: String,
    /// Feature registry repository directory.
    pub registry_dir: PathBuf,
    /// Directory for model and metrics outputs.
    pub outputs_dir: PathBuf,
    /// Model artifact file name.
    pub model_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw/v0"),
            processed_dir: PathBuf::from("data/processed/dataset_versions/v1"),
            full_csv: "v0_full.csv".to_string(),
            sample_csv: "v0_sample_100.csv".to_string(),
            features_file: "features_v0_sample_100.parquet".to_string(),
            registry_dir: PathBuf::from("feature_repo"),
            outputs_dir: PathBuf::from("outputs"),
            model_file: "model_v0_cls.json".to_string(),
        }
    }
}

impl PathsConfig {
    /// Re-root every relative path under `root`.
    pub fn rooted_at(&self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            raw_dir: root.join(&self.raw_dir),
            processed_dir: root.join(&self.processed_dir),
            registry_dir: root.join(&self.registry_dir),
            outputs_dir: root.join(&self.outputs_dir),
            ..self.clone()
        }
    }

    pub fn full_csv_path(&self) -> PathBuf {
        self.processed_dir.join(&self.full_csv)
    }

    pub fn sample_csv_path(&self) -> PathBuf {
        self.processed_dir.join(&self.sample_csv)
    }

    pub fn features_path(&self) -> PathBuf {
        self.processed_dir.join(&self.features_file)
    }

    pub fn model_path(&self) -> PathBuf {
        self.outputs_dir.join(&self.model_file)
    }

    pub fn train_metrics_txt_path(&self) -> PathBuf {
        self.outputs_dir.join("metrics.txt")
    }

    pub fn train_metrics_json_path(&self) -> PathBuf {
        self.outputs_dir.join("metrics_train.json")
    }

    pub fn eval_metrics_json_path(&self) -> PathBuf {
        self.outputs_dir.join("metrics.json")
    }

    pub fn eval_metrics_txt_path(&self) -> PathBuf {
        self.outputs_dir.join("metrics_eval.txt")
    }
}

/// Raw ingestion configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Symbol is the file stem up to the first occurrence of this delimiter.
    pub symbol_delimiter: String,
    /// Extension of raw files to pick up (without the dot).
    pub file_extension: String,
    /// Rows kept in the sampled combined dataset (positional head).
    pub sample_rows: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            symbol_delimiter: "__".to_string(),
            file_extension: "csv".to_string(),
            sample_rows: 100,
        }
    }
}

/// Which combined dataset feeds the feature builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetVariant {
    Full,
    #[default]
    Sample,
}

/// Feature generation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Declared feature-set version to compute.
    pub feature_set_version: u32,
    /// Rolling window size in rows.
    pub window: usize,
    /// Label lookahead in rows.
    pub horizon: usize,
    /// Volume window aggregation.
    pub volume_agg: VolumeAggregate,
    /// Combined dataset variant to read.
    pub input: DatasetVariant,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            feature_set_version: crate::feature_set::ROLLING_VERSION,
            window: 10,
            horizon: 5,
            volume_agg: VolumeAggregate::Sum,
            input: DatasetVariant::Sample,
        }
    }
}

/// Model training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fraction of rows held out for evaluation.
    pub test_ratio: f64,
    /// Seed for the split and the forest.
    pub seed: u64,
    /// Number of trees.
    pub n_trees: usize,
    /// Maximum tree depth (unlimited when absent).
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node.
    pub min_samples_split: usize,
    /// Minimum samples in each leaf.
    pub min_samples_leaf: usize,
    /// Features considered per split (ceil(sqrt(n)) when absent).
    pub max_features: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.2,
            seed: 42,
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

/// Feature registry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Feature view name.
    pub view_name: String,
    /// Whether the view is marked for online serving.
    pub online: bool,
    /// Maximum age of a feature row at retrieval time (no limit when absent).
    pub ttl_seconds: Option<i64>,
    /// Event time for the offline retrieval check (each symbol's last row when absent).
    pub check_timestamp: Option<DateTime<Utc>>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            view_name: crate::feature_set::FEATURE_SET_NAME.to_string(),
            online: true,
            ttl_seconds: None,
            check_timestamp: None,
        }
    }
}
