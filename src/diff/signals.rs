//! High-impact signal extraction
//!
//! Program pages telegraph the changes that matter through a handful of
//! recognizable phrases: an enrollment status keyword, a budget figure near
//! funding language, and a date near deadline language. These three signals
//! drive the semantic diff score and the default parse pipeline.

use regex::Regex;
use std::sync::LazyLock;

static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(open|waitlist(?:ed)?|(?:fully )?reserved|(?:fully )?funded|closed|coming soon)\b")
        .unwrap()
});

static BUDGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:budget|funding|remaining)\D{0,40}?\$?(\d(?:[\d,]*\d)?(?:\.\d+)?)(?:\s*(million|billion|m|b)\b)?",
    )
    .unwrap()
});

static DEADLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:deadline|expires?|closes?|closed)\D{0,40}?(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4}|[a-z]+ \d{1,2},? \d{4})",
    )
    .unwrap()
});

/// The three signals extracted from one normalized page text
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageSignals {
    /// Enrollment status keyword (open, waitlist, reserved, funded, closed,
    /// coming soon)
    pub status: Option<String>,

    /// Budget-like figure appearing near budget/funding/remaining language
    pub budget: Option<String>,

    /// Date-like token appearing near deadline/expires/close language
    pub deadline: Option<String>,
}

impl PageSignals {
    /// Names of the signals that differ between two extractions
    pub fn changed_fields(&self, other: &PageSignals) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.status != other.status {
            changed.push("status");
        }
        if self.budget != other.budget {
            changed.push("budget");
        }
        if self.deadline != other.deadline {
            changed.push("deadline");
        }
        changed
    }

    /// How many of the three signals were found
    pub fn found_count(&self) -> usize {
        [
            self.status.is_some(),
            self.budget.is_some(),
            self.deadline.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }
}

/// Extracts the three signals from normalized (lowercased, whitespace-collapsed)
/// text
pub fn extract_signals(normalized: &str) -> PageSignals {
    let status = STATUS_RE
        .captures(normalized)
        .map(|c| c[1].to_string());

    let budget = BUDGET_RE.captures(normalized).map(|c| {
        let amount = &c[1];
        match c.get(2) {
            Some(unit) => format!("{} {}", amount, unit.as_str()),
            None => amount.to_string(),
        }
    });

    let deadline = DEADLINE_RE
        .captures(normalized)
        .map(|c| c[1].to_string());

    PageSignals {
        status,
        budget,
        deadline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::normalize;

    #[test]
    fn test_status_extraction() {
        let signals = extract_signals("the program is open for applications");
        assert_eq!(signals.status.as_deref(), Some("open"));

        let signals = extract_signals("enrollment is closed as of june");
        assert_eq!(signals.status.as_deref(), Some("closed"));

        let signals = extract_signals("rebates coming soon to your area");
        assert_eq!(signals.status.as_deref(), Some("coming soon"));

        let signals = extract_signals("now on the waitlist");
        assert_eq!(signals.status.as_deref(), Some("waitlist"));
    }

    #[test]
    fn test_status_absent() {
        let signals = extract_signals("general information about the rebate");
        assert!(signals.status.is_none());
    }

    #[test]
    fn test_budget_extraction() {
        let signals = extract_signals("remaining budget: $2,500,000 for 2026");
        assert_eq!(signals.budget.as_deref(), Some("2,500,000"));

        let signals = extract_signals("total funding of $14 million available");
        assert_eq!(signals.budget.as_deref(), Some("14 million"));
    }

    #[test]
    fn test_deadline_extraction() {
        let signals = extract_signals("application deadline is 2026-09-30");
        assert_eq!(signals.deadline.as_deref(), Some("2026-09-30"));

        let signals = extract_signals("the window closes 12/31/2026 at midnight");
        assert_eq!(signals.deadline.as_deref(), Some("12/31/2026"));

        let signals = extract_signals(&normalize("Offer expires September 30, 2026"));
        assert_eq!(signals.deadline.as_deref(), Some("september 30, 2026"));
    }

    #[test]
    fn test_changed_fields() {
        let old = extract_signals("program open, budget $100,000, deadline 2026-01-31");
        let new = extract_signals("program closed, budget $100,000, deadline 2026-01-31");
        assert_eq!(old.changed_fields(&new), vec!["status"]);

        let all_new = extract_signals("program closed, budget $50,000, deadline 2026-06-30");
        assert_eq!(
            old.changed_fields(&all_new),
            vec!["status", "budget", "deadline"]
        );
    }

    #[test]
    fn test_found_count() {
        let signals = extract_signals("program open, budget $100,000, deadline 2026-01-31");
        assert_eq!(signals.found_count(), 3);

        let signals = extract_signals("nothing interesting here");
        assert_eq!(signals.found_count(), 0);
    }
}
