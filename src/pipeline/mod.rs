//! Parse pipeline boundary
//!
//! The full HTML/PDF extractor and canonical-data transformer live outside
//! this crate. This module owns the interface the crawl executor calls:
//! a [`ParsePipeline`] returning quality metrics and a review decision.
//! [`SignalParser`] is the built-in implementation, scoring pages by the same
//! status/budget/deadline signals the diff engine tracks, so the binary runs
//! end to end without the external extractor.

use crate::diff::{extract_signals, normalize};
use crate::storage::SourceRecord;
use serde::{Deserialize, Serialize};

/// Confidence below which a human must review the parse
pub const REVIEW_CONFIDENCE_THRESHOLD: f64 = 0.75;

/// Required-field completeness below which a human must review the parse
pub const REVIEW_COMPLETENESS_THRESHOLD: f64 = 0.95;

/// Quality metrics for one parsed page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Fraction of required fields that were extracted (0.0-1.0)
    pub completeness: f64,

    /// Whether field-level validation passed
    pub validation_pass: bool,

    /// Overall extraction confidence (0.0-1.0)
    pub confidence_overall: f64,
}

/// Result of running the parse pipeline over fetched content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub succeeded: bool,

    /// Whether the parse needs human review before publication
    pub review_required: bool,

    /// Why review is required (empty when it is not)
    pub review_reasons: Vec<String>,

    pub quality: QualityMetrics,
}

impl ParseOutcome {
    /// Applies the standing review rule to a set of quality metrics
    ///
    /// Review is required when validation failed, confidence is under 0.75,
    /// or completeness is under 0.95.
    pub fn from_quality(quality: QualityMetrics) -> Self {
        let mut review_reasons = Vec::new();

        if !quality.validation_pass {
            review_reasons.push("validation errors present".to_string());
        }
        if quality.confidence_overall < REVIEW_CONFIDENCE_THRESHOLD {
            review_reasons.push(format!(
                "confidence {:.2} below {:.2}",
                quality.confidence_overall, REVIEW_CONFIDENCE_THRESHOLD
            ));
        }
        if quality.completeness < REVIEW_COMPLETENESS_THRESHOLD {
            review_reasons.push(format!(
                "completeness {:.2} below {:.2}",
                quality.completeness, REVIEW_COMPLETENESS_THRESHOLD
            ));
        }

        Self {
            succeeded: true,
            review_required: !review_reasons.is_empty(),
            review_reasons,
            quality,
        }
    }
}

/// The boundary the crawl executor calls after persisting a snapshot
pub trait ParsePipeline: Send + Sync {
    /// Parses raw fetched content into canonical fields and quality metrics
    fn run(&self, source: &SourceRecord, raw_content: &str) -> ParseOutcome;
}

/// Signal-based parser used until the external extractor is wired in
///
/// Completeness is the fraction of the three tracked signals found;
/// confidence is high only when a status keyword anchors the page.
#[derive(Debug, Default, Clone)]
pub struct SignalParser;

impl ParsePipeline for SignalParser {
    fn run(&self, source: &SourceRecord, raw_content: &str) -> ParseOutcome {
        let normalized = normalize(raw_content);
        let signals = extract_signals(&normalized);

        let completeness = signals.found_count() as f64 / 3.0;
        let validation_pass = !normalized.is_empty();
        let confidence_overall = if signals.status.is_some() {
            0.9
        } else if signals.found_count() > 0 {
            0.6
        } else {
            0.3
        };

        tracing::debug!(
            source_id = %source.id,
            completeness,
            confidence_overall,
            "signal parse complete"
        );

        ParseOutcome::from_quality(QualityMetrics {
            completeness,
            validation_pass,
            confidence_overall,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quality(completeness: f64, validation_pass: bool, confidence: f64) -> QualityMetrics {
        QualityMetrics {
            completeness,
            validation_pass,
            confidence_overall: confidence,
        }
    }

    #[test]
    fn test_clean_parse_needs_no_review() {
        let outcome = ParseOutcome::from_quality(quality(1.0, true, 0.9));
        assert!(!outcome.review_required);
        assert!(outcome.review_reasons.is_empty());
    }

    #[test]
    fn test_validation_failure_forces_review() {
        let outcome = ParseOutcome::from_quality(quality(1.0, false, 0.9));
        assert!(outcome.review_required);
        assert_eq!(outcome.review_reasons.len(), 1);
    }

    #[test]
    fn test_low_confidence_forces_review() {
        let outcome = ParseOutcome::from_quality(quality(1.0, true, 0.5));
        assert!(outcome.review_required);
    }

    #[test]
    fn test_low_completeness_forces_review() {
        let outcome = ParseOutcome::from_quality(quality(0.66, true, 0.9));
        assert!(outcome.review_required);
    }

    #[test]
    fn test_boundary_values_pass() {
        let outcome = ParseOutcome::from_quality(quality(0.95, true, 0.75));
        assert!(!outcome.review_required);
    }

    #[test]
    fn test_signal_parser_full_page() {
        let source = SourceRecord::new_for_test("https://energy.example.gov/rebates");
        let content = "The rebate program is open. Remaining budget $2,000,000. Deadline 2026-09-30.";

        let outcome = SignalParser.run(&source, content);
        assert!(outcome.succeeded);
        assert!(!outcome.review_required);
        assert_eq!(outcome.quality.completeness, 1.0);
    }

    #[test]
    fn test_signal_parser_sparse_page() {
        let source = SourceRecord::new_for_test("https://energy.example.gov/rebates");
        let outcome = SignalParser.run(&source, "general information page");

        assert!(outcome.review_required);
        assert!(outcome.quality.confidence_overall < REVIEW_CONFIDENCE_THRESHOLD);
    }
}
