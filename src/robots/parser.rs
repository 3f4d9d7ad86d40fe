//! Robots.txt parsing and path matching
//!
//! Line-scanning parser that collects `Disallow:` patterns from `User-agent:`
//! blocks matching this crawler (or the `*` wildcard). Matching supports `*`
//! as a wildcard inside patterns and a trailing `$` that anchors the end of
//! the path.

/// Disallow rules collected for one origin
#[derive(Debug, Clone, Default)]
pub struct DisallowRules {
    patterns: Vec<String>,
}

impl DisallowRules {
    /// Parses robots.txt content, keeping only the `Disallow:` values that
    /// apply to `crawler_name`
    ///
    /// A `User-agent:` line opens a new block; consecutive `User-agent:`
    /// lines share one block. Rules are collected while the current block is
    /// `*` or matches the crawler name case-insensitively.
    pub fn parse(content: &str, crawler_name: &str) -> Self {
        let crawler = crawler_name.to_lowercase();
        let mut patterns = Vec::new();
        let mut block_matches = false;
        let mut in_agent_run = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    let agent = value.to_lowercase();
                    if !in_agent_run {
                        // First agent line of a new block resets the match
                        block_matches = false;
                        in_agent_run = true;
                    }
                    if agent == "*" || crawler.contains(&agent) {
                        block_matches = true;
                    }
                }
                "disallow" => {
                    in_agent_run = false;
                    if block_matches && !value.is_empty() {
                        patterns.push(value.to_string());
                    }
                }
                _ => {
                    in_agent_run = false;
                }
            }
        }

        Self { patterns }
    }

    /// An empty rule set that allows everything
    ///
    /// Used when robots.txt is unavailable: the engine fails open.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Returns the pattern that blocks `path`, if any
    pub fn blocking_pattern(&self, path: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| pattern_matches(p, path))
            .map(|p| p.as_str())
    }

    /// Checks whether `path` is allowed under these rules
    pub fn is_allowed(&self, path: &str) -> bool {
        self.blocking_pattern(path).is_none()
    }

    /// Number of collected disallow patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when no pattern was collected
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Matches a single disallow pattern against a path
///
/// `*` matches any run of characters; a trailing `$` anchors the pattern to
/// the end of the path. Without `$`, the pattern is a prefix match (with `*`
/// gaps allowed).
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let parts: Vec<&str> = pattern.split('*').collect();

    // Leading literal must match at the start of the path
    let first = parts[0];
    if !path.starts_with(first) {
        return false;
    }
    let mut pos = first.len();

    if parts.len() == 1 {
        return !anchored || pos == path.len();
    }

    // Middle literals: leftmost match after the previous one
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match path[pos..].find(part) {
            Some(offset) => pos += offset + part.len(),
            None => return false,
        }
    }

    let last = parts[parts.len() - 1];
    if last.is_empty() {
        // Pattern ends in `*`: anything remaining matches
        return true;
    }
    if anchored {
        // The final literal must land exactly at the end of the path
        path.ends_with(last) && path.len() - last.len() >= pos
    } else {
        path[pos..].contains(last)
    }
}
