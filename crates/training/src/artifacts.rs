//! Model and metrics files.

use std::fs;
use std::path::Path;

use intraday_core::{Error, FeatureSet, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::forest::RandomForest;
use crate::metrics::ClassificationMetrics;

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// A trained model bound to the feature set and split it was fit with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub feature_set_name: String,
    pub feature_set_version: u32,
    /// Full declaration, checked against the table at evaluation time.
    pub feature_set: FeatureSet,
    /// Input columns, in model order.
    pub feature_names: Vec<String>,
    /// Held-out fraction used during training.
    pub test_ratio: f64,
    /// Split seed used during training.
    pub split_seed: u64,
    pub forest: RandomForest,
}

impl ModelArtifact {
    /// Check that `feature_set` is the declaration this model was trained on.
    pub fn check_feature_set(&self, feature_set: &FeatureSet) -> Result<()> {
        if self.feature_set.is_compatible_with(feature_set) {
            Ok(())
        } else {
            Err(Error::feature_set_mismatch(format!(
                "model trained on {}, table built with {}",
                self.feature_set.id(),
                feature_set.id()
            )))
        }
    }

    /// Save as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)?;
        debug!(path = %path.display(), trees = self.forest.n_trees(), "saved model");
        Ok(())
    }

    /// Load from JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Write any serializable value as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Write a text file.
pub fn write_text(path: &Path, content: &str) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, content)?;
    Ok(())
}

/// Short held-out summary written after training.
pub fn training_report(metrics: &ClassificationMetrics, n_train: usize, n_test: usize) -> String {
    format!(
        "accuracy: {:.4}\nf1: {:.4}\ntrain_rows: {n_train}\ntest_rows: {n_test}\n",
        metrics.accuracy, metrics.f1
    )
}

/// Evaluation text: headline scores, classification report, confusion grid.
pub fn evaluation_report(metrics: &ClassificationMetrics) -> String {
    format!(
        "accuracy: {:.4}\nf1: {:.4}\n\nClassification report:\n{}\n{}",
        metrics.accuracy,
        metrics.f1,
        metrics.report(),
        metrics.confusion_text()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DesignMatrix;
    use crate::forest::ForestParams;
    use intraday_core::VolumeAggregate;

    fn artifact() -> ModelArtifact {
        let data = DesignMatrix {
            feature_names: vec!["x".to_string()],
            rows: (0..10).map(|i| vec![i as f64]).collect(),
            labels: (0..10).map(|i| u8::from(i >= 5)).collect(),
        };
        let forest = RandomForest::fit(
            &data,
            ForestParams {
                n_trees: 3,
                ..ForestParams::default()
            },
        )
        .unwrap();
        let set = FeatureSet::rolling(10, 5, VolumeAggregate::Sum);
        ModelArtifact {
            feature_set_name: set.name.clone(),
            feature_set_version: set.version,
            feature_set: set,
            feature_names: data.feature_names,
            test_ratio: 0.2,
            split_seed: 42,
            forest,
        }
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outputs/model.json");
        let model = artifact();
        model.save(&path).unwrap();
        assert_eq!(ModelArtifact::load(&path).unwrap(), model);
    }

    #[test]
    fn test_feature_set_check() {
        let model = artifact();
        assert!(model
            .check_feature_set(&FeatureSet::rolling(10, 5, VolumeAggregate::Sum))
            .is_ok());
        assert!(matches!(
            model.check_feature_set(&FeatureSet::indicators(5)),
            Err(Error::FeatureSetMismatch(_))
        ));
    }

    #[test]
    fn test_reports() {
        let metrics = ClassificationMetrics::calculate(&[0, 1, 1, 0], &[0, 1, 0, 0]).unwrap();
        let train = training_report(&metrics, 16, 4);
        assert!(train.starts_with("accuracy: 0.7500\n"));
        assert!(train.contains("test_rows: 4"));

        let eval = evaluation_report(&metrics);
        assert!(eval.contains("Classification report:"));
        assert!(eval.contains("Confusion matrix"));
    }
}
