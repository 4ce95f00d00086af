//! Random forest classifier.
//!
//! Each tree is fit on a bootstrap sample with its own seeded generator
//! (`seed + tree index`), so a fixed seed reproduces the same forest.
//! Trees are trained one after another.

use intraday_core::{config::TrainingConfig, Error, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::DesignMatrix;
use crate::tree::{DecisionTree, TreeParams};

/// Forest configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees.
    pub n_trees: usize,
    /// Base random seed.
    pub seed: u64,
    /// Per-tree growth limits.
    pub tree: TreeParams,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            seed: 42,
            tree: TreeParams::default(),
        }
    }
}

impl From<&TrainingConfig> for ForestParams {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            n_trees: config.n_trees,
            seed: config.seed,
            tree: TreeParams::from(config),
        }
    }
}

/// A fitted random forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit a forest on the design matrix.
    pub fn fit(data: &DesignMatrix, params: ForestParams) -> Result<Self> {
        let n = data.n_samples();
        if n == 0 {
            return Err(Error::empty_input("no training rows"));
        }
        if params.n_trees == 0 {
            return Err(Error::model("forest needs at least one tree"));
        }

        let mut trees = Vec::with_capacity(params.n_trees);
        for i in 0..params.n_trees {
            let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(i as u64));
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let tree = DecisionTree::fit(&data.rows, &data.labels, &bootstrap, &params.tree, &mut rng);
            debug!(
                tree = i,
                nodes = tree.n_nodes(),
                leaves = tree.n_leaves(),
                depth = tree.depth(),
                "fit tree"
            );
            trees.push(tree);
        }

        Ok(Self {
            params,
            n_features: data.n_features(),
            trees,
        })
    }

    /// Number of trees.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Number of input columns expected.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Mean positive-class probability across trees, one per row.
    pub fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter()
            .map(|row| {
                if row.len() != self.n_features {
                    return Err(Error::model(format!(
                        "row has {} features, model expects {}",
                        row.len(),
                        self.n_features
                    )));
                }
                let total: f64 = self.trees.iter().map(|t| t.predict_proba_one(row)).sum();
                Ok(total / self.trees.len() as f64)
            })
            .collect()
    }

    /// Predicted class per row; a 0.5 tie goes to class 0.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<u8>> {
        Ok(self
            .predict_proba(rows)?
            .into_iter()
            .map(|p| u8::from(p > 0.5))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> DesignMatrix {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64])
            .collect();
        let labels = (0..40).map(|i| u8::from(i >= 20)).collect();
        DesignMatrix {
            feature_names: vec!["a".to_string(), "b".to_string()],
            rows,
            labels,
        }
    }

    fn params(n_trees: usize) -> ForestParams {
        ForestParams {
            n_trees,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_learns_threshold() {
        let data = matrix();
        let forest = RandomForest::fit(&data, params(25)).unwrap();
        let predictions = forest.predict(&[vec![2.0, 1.0], vec![37.0, 1.0]]).unwrap();
        assert_eq!(predictions, vec![0, 1]);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let data = matrix();
        let a = RandomForest::fit(&data, params(5)).unwrap();
        let b = RandomForest::fit(&data, params(5)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_probabilities_in_range() {
        let data = matrix();
        let forest = RandomForest::fit(&data, params(10)).unwrap();
        let probas = forest.predict_proba(&data.rows).unwrap();
        assert!(probas.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_wrong_width_rejected() {
        let forest = RandomForest::fit(&matrix(), params(3)).unwrap();
        assert!(matches!(forest.predict(&[vec![1.0]]), Err(Error::Model(_))));
    }

    #[test]
    fn test_zero_trees_rejected() {
        assert!(RandomForest::fit(&matrix(), params(0)).is_err());
    }
}
