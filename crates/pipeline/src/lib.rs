//! Batch stages of the intraday feature pipeline.
//!
//! Each stage reads its inputs from disk, writes its outputs to disk and
//! returns a small summary. Stages share nothing in memory; the binaries
//! under `src/bin` run exactly one stage each.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use intraday_core::{Config, Error, FeatureSet, Result};
use intraday_features::{read_feature_table, write_feature_table, FeatureBuilder};
use intraday_ingestion::{Combiner, Ingestor};
use intraday_registry::{EntityRow, FeatureStore, FeatureView};
use intraday_training::{
    evaluation_report, training_report, write_json, write_text, ModelArtifact, Trainer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "PIPELINE_CONFIG";

/// Configuration file used when the environment variable is unset.
pub const DEFAULT_CONFIG_FILE: &str = "pipeline.toml";

/// Initialize logging (`RUST_LOG` overrides the default `info` level).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Load configuration from `$PIPELINE_CONFIG`, else `pipeline.toml` if present, else defaults.
pub fn load_config() -> Result<Config> {
    load_config_from(std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}

/// An explicitly named file must exist; the default file is optional.
pub fn load_config_from(explicit: Option<PathBuf>) -> Result<Config> {
    match explicit {
        Some(path) => Config::load(path),
        None => Config::load_or_default(DEFAULT_CONFIG_FILE),
    }
}

/// Outcome of the raw-data stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSummary {
    pub files_read: u64,
    pub rows_dropped: u64,
    pub full_rows: usize,
    pub sample_rows: usize,
    /// Symbols present in the sampled dataset.
    pub sample_symbols: Vec<String>,
    pub full_path: PathBuf,
    pub sample_path: PathBuf,
}

/// Read every raw file, write the full and sampled combined datasets.
pub fn run_process_data(config: &Config) -> Result<ProcessSummary> {
    let raw_dir = &config.paths.raw_dir;
    let mut ingestor = Ingestor::new(&config.ingest);
    let series = ingestor.read_raw_dir(raw_dir)?;
    if series.is_empty() {
        warn!(
            dir = %raw_dir.display(),
            extension = %config.ingest.file_extension,
            "no raw files found"
        );
        return Err(Error::empty_input(format!(
            "no .{} files in {}",
            config.ingest.file_extension,
            raw_dir.display()
        )));
    }

    let combined = Combiner::combine(series);
    if combined.is_empty() {
        return Err(Error::empty_input(format!(
            "no valid rows in {}",
            raw_dir.display()
        )));
    }
    let sample = combined.head(config.ingest.sample_rows);

    let full_path = config.paths.full_csv_path();
    let sample_path = config.paths.sample_csv_path();
    combined.write_csv(&full_path)?;
    sample.write_csv(&sample_path)?;

    let stats = ingestor.stats();
    let summary = ProcessSummary {
        files_read: stats.files_read,
        rows_dropped: stats.dropped(),
        full_rows: combined.len(),
        sample_rows: sample.len(),
        sample_symbols: sample.symbols().into_iter().map(String::from).collect(),
        full_path,
        sample_path,
    };
    info!(
        files = summary.files_read,
        full_rows = summary.full_rows,
        sample_rows = summary.sample_rows,
        full = %summary.full_path.display(),
        sample = %summary.sample_path.display(),
        "processed raw data"
    );
    Ok(summary)
}

/// Outcome of the feature stage.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSummary {
    pub feature_set: String,
    pub input_path: PathBuf,
    pub rows: usize,
    pub symbols: usize,
    pub path: PathBuf,
}

/// Build the feature table from the configured combined dataset.
pub fn run_build_features(config: &Config) -> Result<FeatureSummary> {
    let builder = FeatureBuilder::from_config(&config.features)?;
    let input_path = config.feature_input_path();
    let table = builder.build_from_csv(&input_path)?;

    let path = config.paths.features_path();
    write_feature_table(&path, &table)?;

    Ok(FeatureSummary {
        feature_set: table.feature_set.id(),
        input_path,
        rows: table.len(),
        symbols: table.symbols().len(),
        path,
    })
}

/// Outcome of the registry stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrySummary {
    pub view: String,
    pub features: Vec<String>,
    /// (rows, columns) of the offline retrieval check.
    pub retrieval_shape: (usize, usize),
    /// Retrieved rows with every value present.
    pub complete_rows: usize,
}

/// Register the feature view and run an offline point-in-time retrieval check.
pub fn run_register_features(config: &Config) -> Result<RegistrySummary> {
    let feature_set = FeatureSet::from_config(&config.features)?;
    let features_path = config.paths.features_path();
    let table = read_feature_table(&features_path, Some(&feature_set))?;

    let mut store = FeatureStore::open(&config.paths.registry_dir)?;
    let view = FeatureView::from_feature_set(
        config.registry.view_name.clone(),
        &feature_set,
        features_path,
        config.registry.ttl_seconds,
        config.registry.online,
    );
    let features: Vec<String> = view.feature_names().into_iter().map(String::from).collect();
    let references: Vec<String> = features
        .iter()
        .map(|f| format!("{}:{f}", view.name))
        .collect();
    store.apply(view)?;

    let entity_rows: Vec<EntityRow> = table
        .symbols()
        .into_iter()
        .filter_map(|symbol| {
            let at: DateTime<Utc> = match config.registry.check_timestamp {
                Some(ts) => ts,
                None => table.rows_for(symbol).last()?.record.timestamp,
            };
            Some(EntityRow::new(symbol, at))
        })
        .collect();
    let refs: Vec<&str> = references.iter().map(String::as_str).collect();
    let frame = store.get_historical_features(&entity_rows, &refs)?;
    store.close()?;

    let summary = RegistrySummary {
        view: config.registry.view_name.clone(),
        features,
        retrieval_shape: frame.shape(),
        complete_rows: frame.complete_rows(),
    };
    info!(
        view = %summary.view,
        features = summary.features.len(),
        rows = summary.retrieval_shape.0,
        columns = summary.retrieval_shape.1,
        complete = summary.complete_rows,
        "offline retrieval check"
    );
    Ok(summary)
}

/// Outcome of the training stage.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainSummary {
    pub accuracy: f64,
    pub f1: f64,
    pub n_train: usize,
    pub n_test: usize,
    pub model_path: PathBuf,
}

/// Fit the model on the feature table and write the model and training metrics.
pub fn run_train(config: &Config) -> Result<TrainSummary> {
    let feature_set = FeatureSet::from_config(&config.features)?;
    let table = read_feature_table(&config.paths.features_path(), Some(&feature_set))?;

    let outcome = Trainer::new(config.training.clone()).train(&table)?;

    let model_path = config.paths.model_path();
    outcome.model.save(&model_path)?;
    write_text(
        &config.paths.train_metrics_txt_path(),
        &training_report(&outcome.test_metrics, outcome.n_train, outcome.n_test),
    )?;
    write_json(
        &config.paths.train_metrics_json_path(),
        &outcome.test_metrics.summary(),
    )?;

    Ok(TrainSummary {
        accuracy: outcome.test_metrics.accuracy,
        f1: outcome.test_metrics.f1,
        n_train: outcome.n_train,
        n_test: outcome.n_test,
        model_path,
    })
}

/// Outcome of the evaluation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSummary {
    pub accuracy: f64,
    pub f1: f64,
    pub confusion_matrix: [[u64; 2]; 2],
    pub n_test: usize,
    pub metrics_path: PathBuf,
    pub report_path: PathBuf,
}

/// Score the saved model on its held-out rows and write the evaluation reports.
pub fn run_evaluate(config: &Config) -> Result<EvaluationSummary> {
    let model = ModelArtifact::load(&config.paths.model_path())?;
    let table = read_feature_table(&config.paths.features_path(), Some(&model.feature_set))?;

    let evaluation = Trainer::new(config.training.clone()).evaluate(&model, &table)?;

    let metrics_path = config.paths.eval_metrics_json_path();
    let report_path = config.paths.eval_metrics_txt_path();
    write_json(&metrics_path, &evaluation.metrics.summary())?;
    write_text(&report_path, &evaluation_report(&evaluation.metrics))?;

    Ok(EvaluationSummary {
        accuracy: evaluation.metrics.accuracy,
        f1: evaluation.metrics.f1,
        confusion_matrix: evaluation.metrics.confusion_matrix,
        n_test: evaluation.n_test,
        metrics_path,
        report_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(load_config_from(Some(missing)), Err(Error::Io(_))));
    }

    #[test]
    fn test_explicit_config_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "[features]\nwindow = 15\n").unwrap();
        let config = load_config_from(Some(path)).unwrap();
        assert_eq!(config.features.window, 15);
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        init_tracing();
    }
}
