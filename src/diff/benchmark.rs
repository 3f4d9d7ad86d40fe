//! Diff threshold benchmarking
//!
//! Regression tooling for the semantic significance threshold: given labeled
//! before/after samples, measures how well "semantic score >= 35" predicts a
//! significant change. Run against a curated sample set whenever the signal
//! extraction or scoring weights change.

use crate::diff::{build_diff_records, score_for, DiffKind};

/// Semantic score at or above which a transition is predicted significant
pub const SIGNIFICANCE_THRESHOLD: u8 = 35;

/// One labeled sample: a page transition and whether a human considered it
/// significant
#[derive(Debug, Clone)]
pub struct BenchmarkSample {
    pub previous: String,
    pub next: String,
    pub significant: bool,
}

/// Precision/recall of the significance decision over a sample set
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkReport {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_negatives: usize,
    pub precision: f64,
    pub recall: f64,
}

/// Evaluates the semantic-score threshold against labeled samples
///
/// Precision and recall are 1.0 when their denominator is zero (no
/// predictions, or no significant samples).
pub fn evaluate_diff_benchmark(samples: &[BenchmarkSample]) -> BenchmarkReport {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut fn_ = 0usize;
    let mut tn = 0usize;

    for sample in samples {
        let drafts = build_diff_records(&sample.previous, &sample.next);
        let semantic = score_for(&drafts, DiffKind::Semantic).unwrap_or(0);
        let predicted = semantic >= SIGNIFICANCE_THRESHOLD;

        match (predicted, sample.significant) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            (false, false) => tn += 1,
        }
    }

    let precision = if tp + fp == 0 {
        1.0
    } else {
        tp as f64 / (tp + fp) as f64
    };
    let recall = if tp + fn_ == 0 {
        1.0
    } else {
        tp as f64 / (tp + fn_) as f64
    };

    BenchmarkReport {
        true_positives: tp,
        false_positives: fp,
        false_negatives: fn_,
        true_negatives: tn,
        precision,
        recall,
    }
}
