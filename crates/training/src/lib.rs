//! Model training and evaluation for the intraday feature pipeline.
//!
//! This crate handles:
//! - Design matrix construction with one-hot symbol columns
//! - Seeded stratified train/test splitting
//! - Random forest classification
//! - Accuracy, F1 and confusion-matrix reporting
//! - Model and metrics artifacts

pub mod artifacts;
pub mod dataset;
pub mod forest;
pub mod metrics;
pub mod split;
pub mod trainer;
pub mod tree;

pub use artifacts::{evaluation_report, training_report, write_json, write_text, ModelArtifact};
pub use dataset::DesignMatrix;
pub use forest::{ForestParams, RandomForest};
pub use metrics::{ClassScores, ClassificationMetrics, MetricsSummary};
pub use split::{stratified_split, SplitIndices};
pub use trainer::{Evaluation, Trainer, TrainingOutcome};
pub use tree::{DecisionTree, TreeParams};
