//! Training and held-out evaluation.

use intraday_core::{config::TrainingConfig, FeatureTable, Result};
use tracing::info;

use crate::artifacts::ModelArtifact;
use crate::dataset::DesignMatrix;
use crate::forest::{ForestParams, RandomForest};
use crate::metrics::ClassificationMetrics;
use crate::split::stratified_split;

/// Result of a training run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: ModelArtifact,
    /// Scores on the held-out rows.
    pub test_metrics: ClassificationMetrics,
    pub n_train: usize,
    pub n_test: usize,
}

/// Result of re-scoring a saved model.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub metrics: ClassificationMetrics,
    pub n_test: usize,
}

/// Fits and scores random forests on feature tables.
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Split the table, fit on the training side, score the held-out side.
    pub fn train(&self, table: &FeatureTable) -> Result<TrainingOutcome> {
        let matrix = DesignMatrix::from_table(table)?;
        let split = stratified_split(&matrix.labels, self.config.test_ratio, self.config.seed)?;
        let train = matrix.select(&split.train);
        let test = matrix.select(&split.test);

        let forest = RandomForest::fit(&train, ForestParams::from(&self.config))?;
        let predictions = forest.predict(&test.rows)?;
        let test_metrics = ClassificationMetrics::calculate(&test.labels, &predictions)?;

        info!(
            train_rows = train.n_samples(),
            test_rows = test.n_samples(),
            features = matrix.n_features(),
            trees = forest.n_trees(),
            accuracy = test_metrics.accuracy,
            f1 = test_metrics.f1,
            "trained model"
        );

        let model = ModelArtifact {
            feature_set_name: table.feature_set.name.clone(),
            feature_set_version: table.feature_set.version,
            feature_set: table.feature_set.clone(),
            feature_names: matrix.feature_names,
            test_ratio: self.config.test_ratio,
            split_seed: self.config.seed,
            forest,
        };

        Ok(TrainingOutcome {
            model,
            test_metrics,
            n_train: split.train.len(),
            n_test: split.test.len(),
        })
    }

    /// Re-derive the held-out rows the model was trained without and score them.
    pub fn evaluate(&self, model: &ModelArtifact, table: &FeatureTable) -> Result<Evaluation> {
        model.check_feature_set(&table.feature_set)?;

        let matrix = DesignMatrix::from_table(table)?.align_to(&model.feature_names)?;
        let split = stratified_split(&matrix.labels, model.test_ratio, model.split_seed)?;
        let test = matrix.select(&split.test);

        let predictions = model.forest.predict(&test.rows)?;
        let metrics = ClassificationMetrics::calculate(&test.labels, &predictions)?;

        info!(
            test_rows = test.n_samples(),
            accuracy = metrics.accuracy,
            f1 = metrics.f1,
            "evaluated model"
        );
        Ok(Evaluation {
            n_test: test.n_samples(),
            metrics,
        })
    }
}
