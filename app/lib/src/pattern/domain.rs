//! Keyword-bucket domain tagging.
//!
//! Domains are a coarse, best-effort label attached to a pattern from the
//! strings it was observed in. They only narrow candidate sets at
//! compression time; matching never depends on them.

use std::collections::BTreeSet;

/// Label used when no bucket matches.
pub const GENERAL_DOMAIN: &str = "general";

/// Built-in keyword buckets: `(label, keywords)`.
const DEFAULT_BUCKETS: &[(&str, &[&str])] = &[
    (
        "code",
        &["code", "function", "bug", "debug", "refactor", "implement", "compile", "test"],
    ),
    (
        "data",
        &["data", "csv", "json", "table", "database", "query", "sql", "schema"],
    ),
    (
        "analysis",
        &["analyze", "analysis", "review", "evaluate", "compare", "assess", "extract"],
    ),
    (
        "writing",
        &["write", "draft", "summarize", "summary", "essay", "email", "article", "translate"],
    ),
    (
        "support",
        &["customer", "ticket", "transcript", "complaint", "issue", "sentiment", "support"],
    ),
];

/// Classifies example strings into domain labels by keyword lookup.
#[derive(Debug, Clone)]
pub struct DomainClassifier {
    buckets: Vec<(String, Vec<String>)>,
}

impl DomainClassifier {
    /// Create a classifier with the built-in buckets.
    pub fn new() -> Self {
        Self::with_buckets(
            DEFAULT_BUCKETS
                .iter()
                .map(|(label, words)| (*label, words.iter().copied())),
        )
    }

    /// Create a classifier from custom `(label, keywords)` buckets.
    ///
    /// Keywords are matched case-insensitively as substrings.
    pub fn with_buckets<I, L, W, K>(buckets: I) -> Self
    where
        I: IntoIterator<Item = (L, W)>,
        L: Into<String>,
        W: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let buckets = buckets
            .into_iter()
            .map(|(label, words)| {
                let words = words
                    .into_iter()
                    .map(|w| w.as_ref().to_lowercase())
                    .collect();
                (label.into(), words)
            })
            .collect();
        Self { buckets }
    }

    /// Label a set of example strings.
    ///
    /// Returns every bucket with a keyword present in any example, or just
    /// [`GENERAL_DOMAIN`] when none match.
    pub fn classify<S: AsRef<str>>(&self, examples: &[S]) -> BTreeSet<String> {
        let lowered: Vec<String> = examples.iter().map(|e| e.as_ref().to_lowercase()).collect();

        let mut domains: BTreeSet<String> = self
            .buckets
            .iter()
            .filter(|(_, words)| {
                words
                    .iter()
                    .any(|word| lowered.iter().any(|text| text.contains(word.as_str())))
            })
            .map(|(label, _)| label.clone())
            .collect();

        if domains.is_empty() {
            domains.insert(GENERAL_DOMAIN.to_string());
        }
        domains
    }
}

impl Default for DomainClassifier {
    fn default() -> Self {
        Self::new()
    }
}
