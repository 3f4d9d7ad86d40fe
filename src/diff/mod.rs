//! Snapshot diff engine
//!
//! Pure comparison of previous vs. current page text. Every transition
//! produces exactly three records — `text`, `visual`, `semantic` — each with
//! a 0-100 significance score and a structured changes payload. No I/O
//! happens here; the executor persists what this module computes.

mod benchmark;
mod signals;

pub use benchmark::{evaluate_diff_benchmark, BenchmarkReport, BenchmarkSample};
pub use signals::{extract_signals, PageSignals};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Points contributed by each differing high-impact signal
const SIGNAL_WEIGHT: u32 = 35;

/// The three diff record types emitted per snapshot transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Text,
    Visual,
    Semantic,
}

impl DiffKind {
    pub fn to_db_string(self) -> &'static str {
        match self {
            DiffKind::Text => "text",
            DiffKind::Visual => "visual",
            DiffKind::Semantic => "semantic",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "text" => Some(DiffKind::Text),
            "visual" => Some(DiffKind::Visual),
            "semantic" => Some(DiffKind::Semantic),
            _ => None,
        }
    }
}

/// One computed diff record, not yet persisted
#[derive(Debug, Clone)]
pub struct DiffDraft {
    pub kind: DiffKind,

    /// Significance score, 0-100
    pub score: u8,

    /// Structured payload naming the method and the changed fields
    pub changes: serde_json::Value,
}

/// Normalizes page text for comparison: lowercase, whitespace collapsed
pub fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tokenizes normalized text on non-alphanumeric boundaries
fn tokenize(normalized: &str) -> HashSet<&str> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Jaccard similarity of two token sets; two empty sets are identical
fn jaccard_similarity(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Compares two page texts and produces the three diff records
///
/// * **text** - `round((1 - jaccard) * 100)` over token sets
/// * **semantic** - each differing high-impact signal (status, budget,
///   deadline) adds 35 points, clamped to 100
/// * **visual** - `round(min(100, text*0.75 + semantic_delta*0.25))`, a proxy
///   for render-level change since nothing is actually rendered
pub fn build_diff_records(previous_text: &str, next_text: &str) -> Vec<DiffDraft> {
    let prev_norm = normalize(previous_text);
    let next_norm = normalize(next_text);

    let prev_tokens = tokenize(&prev_norm);
    let next_tokens = tokenize(&next_norm);
    let text_score = ((1.0 - jaccard_similarity(&prev_tokens, &next_tokens)) * 100.0).round();

    let prev_signals = extract_signals(&prev_norm);
    let next_signals = extract_signals(&next_norm);
    let changed = prev_signals.changed_fields(&next_signals);

    // Three signals at 35 points sum past 100; the clamp keeps the score in
    // range, so any two disagreeing signals already saturate it
    let semantic_delta = SIGNAL_WEIGHT * changed.len() as u32;
    let semantic_score = semantic_delta.min(100);

    let visual_score = (text_score * 0.75 + semantic_delta as f64 * 0.25)
        .min(100.0)
        .round();

    vec![
        DiffDraft {
            kind: DiffKind::Text,
            score: text_score as u8,
            changes: serde_json::json!({
                "method": "token-set-jaccard",
                "token_count_previous": prev_tokens.len(),
                "token_count_next": next_tokens.len(),
            }),
        },
        DiffDraft {
            kind: DiffKind::Visual,
            score: visual_score as u8,
            changes: serde_json::json!({
                "method": "weighted-text-semantic-proxy",
                "text_component": text_score,
                "semantic_component": semantic_delta,
            }),
        },
        DiffDraft {
            kind: DiffKind::Semantic,
            score: semantic_score as u8,
            changes: serde_json::json!({
                "method": "high-impact-signals",
                "changed_fields": changed,
                "previous": {
                    "status": prev_signals.status,
                    "budget": prev_signals.budget,
                    "deadline": prev_signals.deadline,
                },
                "next": {
                    "status": next_signals.status,
                    "budget": next_signals.budget,
                    "deadline": next_signals.deadline,
                },
            }),
        },
    ]
}

/// Pulls one score out of a draft set by kind
pub fn score_for(drafts: &[DiffDraft], kind: DiffKind) -> Option<u8> {
    drafts.iter().find(|d| d.kind == kind).map(|d| d.score)
}
