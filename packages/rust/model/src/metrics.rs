//! Binary classification metrics with the malignant class as positive.

use diagflow_dataset::Label;
use diagflow_shared::{DiagflowError, Result};
use serde::{Deserialize, Serialize};

/// Counts for a binary confusion matrix (positive = 1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl ConfusionMatrix {
    /// Tally predictions against ground truth.
    pub fn from_predictions(truth: &[u8], predicted: &[u8]) -> Result<Self> {
        if truth.len() != predicted.len() {
            return Err(DiagflowError::schema(format!(
                "{} labels but {} predictions",
                truth.len(),
                predicted.len()
            )));
        }
        let mut cm = Self::default();
        for (&t, &p) in truth.iter().zip(predicted) {
            match (t, p) {
                (1, 1) => cm.tp += 1,
                (0, 1) => cm.fp += 1,
                (0, 0) => cm.tn += 1,
                (1, 0) => cm.fn_ += 1,
                _ => {
                    return Err(DiagflowError::data_quality(format!(
                        "labels must be 0 or 1, got truth={t} predicted={p}"
                    )));
                }
            }
        }
        Ok(cm)
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    /// Aggregate metrics for the positive class.
    pub fn report(&self) -> MetricsReport {
        let precision = ratio(self.tp, self.tp + self.fp);
        let recall = ratio(self.tp, self.tp + self.fn_);
        MetricsReport {
            accuracy: ratio(self.tp + self.tn, self.total()),
            precision,
            recall,
            f1: harmonic(precision, recall),
        }
    }

    /// Precision/recall/F1/support for one class.
    pub fn class_report(&self, label: Label) -> ClassReport {
        let (hit, false_claim, missed) = match label {
            Label::Malignant => (self.tp, self.fp, self.fn_),
            Label::Benign => (self.tn, self.fn_, self.fp),
        };
        let precision = ratio(hit, hit + false_claim);
        let recall = ratio(hit, hit + missed);
        ClassReport {
            label,
            precision,
            recall,
            f1: harmonic(precision, recall),
            support: hit + missed,
        }
    }
}

/// The persisted metrics document. Exactly these four keys.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl MetricsReport {
    /// Compute metrics straight from label vectors.
    pub fn compute(truth: &[u8], predicted: &[u8]) -> Result<Self> {
        Ok(ConfusionMatrix::from_predictions(truth, predicted)?.report())
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| DiagflowError::Serialization(format!("failed to encode metrics: {e}")))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| DiagflowError::Serialization(format!("failed to decode metrics: {e}")))
    }
}

/// Per-class breakdown, logged alongside the aggregate report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassReport {
    pub label: Label,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Render a per-class text table for the log.
pub fn format_classification_report(cm: &ConfusionMatrix) -> String {
    let mut out = format!(
        "{:>12} {:>9} {:>9} {:>9} {:>9}\n",
        "", "precision", "recall", "f1-score", "support"
    );
    for label in Label::ALL {
        let r = cm.class_report(label);
        out.push_str(&format!(
            "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}\n",
            label.display_name(),
            r.precision,
            r.recall,
            r.f1,
            r.support
        ));
    }
    let agg = cm.report();
    out.push_str(&format!(
        "{:>12} {:>9} {:>9} {:>9.2} {:>9}",
        "accuracy",
        "",
        "",
        agg.accuracy,
        cm.total()
    ));
    out
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn harmonic(p: f64, r: f64) -> f64 {
    if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
}
