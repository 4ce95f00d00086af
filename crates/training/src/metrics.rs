//! Classification metrics.
//!
//! Calculates accuracy, F1 and the confusion matrix for binary labels.

use std::fmt::Write as _;

use intraday_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Label values, in confusion-matrix order.
pub const CLASSES: [u8; 2] = [0, 1];

/// Precision/recall/F1 for one class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// True rows of this class.
    pub support: u64,
}

/// Binary classification metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    /// Fraction of correct predictions.
    pub accuracy: f64,
    /// F1 of the positive class (0 when undefined).
    pub f1: f64,
    /// Counts indexed `[true][predicted]`.
    pub confusion_matrix: [[u64; 2]; 2],
    /// Scores per class, in [`CLASSES`] order.
    pub per_class: [ClassScores; 2],
}

/// Structured form written to the metrics JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub accuracy: f64,
    pub f1: f64,
    pub confusion_matrix: Vec<Vec<u64>>,
}

fn ratio(num: u64, den: u64) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

fn f1_score(precision: f64, recall: f64) -> f64 {
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

impl ClassificationMetrics {
    /// Calculate metrics from true and predicted labels.
    pub fn calculate(y_true: &[u8], y_pred: &[u8]) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(Error::data(format!(
                "{} true labels but {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }
        if y_true.is_empty() {
            return Err(Error::empty_input("no predictions to score"));
        }

        let mut cm = [[0u64; 2]; 2];
        for (&t, &p) in y_true.iter().zip(y_pred) {
            if t > 1 || p > 1 {
                return Err(Error::data(format!("labels must be 0 or 1, got ({t}, {p})")));
            }
            cm[t as usize][p as usize] += 1;
        }

        let total = y_true.len() as u64;
        let correct = cm[0][0] + cm[1][1];

        let mut per_class = [ClassScores::default(); 2];
        for c in 0..2 {
            let predicted = cm[0][c] + cm[1][c];
            let actual = cm[c][0] + cm[c][1];
            let precision = ratio(cm[c][c], predicted);
            let recall = ratio(cm[c][c], actual);
            per_class[c] = ClassScores {
                precision,
                recall,
                f1: f1_score(precision, recall),
                support: actual,
            };
        }

        Ok(Self {
            accuracy: ratio(correct, total),
            f1: per_class[1].f1,
            confusion_matrix: cm,
            per_class,
        })
    }

    /// Rows scored.
    pub fn support(&self) -> u64 {
        self.per_class.iter().map(|c| c.support).sum()
    }

    /// Accuracy, F1 and confusion matrix for the metrics JSON.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            accuracy: self.accuracy,
            f1: self.f1,
            confusion_matrix: self.confusion_matrix.iter().map(|r| r.to_vec()).collect(),
        }
    }

    /// Per-class precision/recall/F1 table with averages.
    pub fn report(&self) -> String {
        let width = 12;
        let total = self.support();
        let mut out = String::new();

        let _ = writeln!(
            out,
            "{:>width$}  {:>9} {:>9} {:>9} {:>9}\n",
            "", "precision", "recall", "f1-score", "support"
        );
        for (class, scores) in CLASSES.iter().zip(&self.per_class) {
            let _ = writeln!(
                out,
                "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
                class, scores.precision, scores.recall, scores.f1, scores.support
            );
        }
        out.push('\n');
        let _ = writeln!(
            out,
            "{:>width$}  {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, total
        );

        let macro_avg = |f: fn(&ClassScores) -> f64| {
            self.per_class.iter().map(f).sum::<f64>() / self.per_class.len() as f64
        };
        let weighted_avg = |f: fn(&ClassScores) -> f64| {
            if total == 0 {
                return 0.0;
            }
            self.per_class
                .iter()
                .map(|c| f(c) * c.support as f64)
                .sum::<f64>()
                / total as f64
        };
        let _ = writeln!(
            out,
            "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
            "macro avg",
            macro_avg(|c: &ClassScores| c.precision),
            macro_avg(|c: &ClassScores| c.recall),
            macro_avg(|c: &ClassScores| c.f1),
            total
        );
        let _ = writeln!(
            out,
            "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
            "weighted avg",
            weighted_avg(|c: &ClassScores| c.precision),
            weighted_avg(|c: &ClassScores| c.recall),
            weighted_avg(|c: &ClassScores| c.f1),
            total
        );
        out
    }

    /// Confusion matrix as a small text grid.
    pub fn confusion_text(&self) -> String {
        let cm = &self.confusion_matrix;
        let mut out = String::from("Confusion matrix (rows: true, cols: predicted)\n");
        let _ = writeln!(out, "{:>8} {:>8} {:>8}", "", "pred 0", "pred 1");
        for (class, row) in CLASSES.iter().zip(cm) {
            let _ = writeln!(out, "{:>8} {:>8} {:>8}", format!("true {class}"), row[0], row[1]);
        }
        out
    }
}
