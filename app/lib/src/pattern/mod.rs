//! Discovered token patterns.
//!
//! A [`Pattern`] is a contiguous run of two or more tokens that recurs across
//! a training corpus, stored in canonical form (tokens joined by single
//! spaces) together with the statistics used to rank it.

mod domain;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::reference::RefToken;
use crate::token::token_count;

pub use domain::{DomainClassifier, GENERAL_DOMAIN};

/// Maximum number of sample strings kept per pattern.
pub const MAX_EXAMPLES: usize = 3;

/// Number of hex digits in a pattern id.
pub const ID_LEN: usize = 8;

/// Derive the stable id of a canonical pattern text.
///
/// The id is the first [`ID_LEN`] uppercase hex digits of the SHA-256 digest
/// of the text, so the same pattern always maps to the same id.
///
/// ```
/// use tps_compression::pattern_id;
///
/// let id = pattern_id("[REQ:ANALYZE] [TARGET:TRANSCRIPT]");
/// assert_eq!(id.len(), 8);
/// assert_eq!(id, pattern_id("[REQ:ANALYZE] [TARGET:TRANSCRIPT]"));
/// ```
pub fn pattern_id(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    let mut id = String::with_capacity(ID_LEN);
    for byte in digest.iter().take(ID_LEN / 2) {
        id.push_str(&format!("{:02X}", byte));
    }
    id
}

/// A recurring token subsequence with its observation statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Stable id derived from the canonical text.
    pub id: String,
    /// Canonical text: tokens joined by single spaces.
    pub pattern: String,
    /// Occurrences observed across all training runs.
    pub frequency: u64,
    /// When the pattern was first recorded.
    pub first_seen: DateTime<Utc>,
    /// When the pattern was last observed.
    pub last_seen: DateTime<Utc>,
    /// Tokens saved per substitution: token count minus one.
    pub compression_gain: usize,
    /// Coarse category labels inferred from the examples.
    pub domains: BTreeSet<String>,
    /// Up to [`MAX_EXAMPLES`] strings the pattern was observed in.
    pub examples: Vec<String>,
    /// Compatibility tag carried in REF tokens.
    pub version: u32,
}

impl Pattern {
    /// Create a version-1 pattern observed `frequency` times as of now.
    pub fn new(canonical: impl Into<String>, frequency: u64) -> Self {
        Self::observed_at(canonical, frequency, Utc::now())
    }

    /// Create a version-1 pattern with both timestamps set to `at`.
    pub fn observed_at(canonical: impl Into<String>, frequency: u64, at: DateTime<Utc>) -> Self {
        let pattern = canonical.into();
        Self {
            id: pattern_id(&pattern),
            compression_gain: gain_of(&pattern),
            pattern,
            frequency,
            first_seen: at,
            last_seen: at,
            domains: BTreeSet::new(),
            examples: Vec::new(),
            version: 1,
        }
    }

    /// Attach example strings, keeping at most [`MAX_EXAMPLES`].
    pub fn with_examples<I, S>(mut self, examples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.examples = examples.into_iter().take(MAX_EXAMPLES).map(Into::into).collect();
        self
    }

    /// Attach domain labels.
    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Ranking score: `frequency * compression_gain`.
    pub fn value_score(&self) -> u64 {
        self.frequency.saturating_mul(self.compression_gain as u64)
    }

    /// The REF token emitted in place of an occurrence of this pattern.
    pub fn ref_token(&self) -> String {
        RefToken::new(self.id.clone(), self.version).to_string()
    }

    /// Number of tokens in the canonical text.
    pub fn token_len(&self) -> usize {
        self.compression_gain + 1
    }

    /// Whether the pattern carries the given domain label.
    pub fn in_domain(&self, domain: &str) -> bool {
        self.domains.contains(domain)
    }

    /// Replace the canonical text, keeping the id, and bump the version.
    pub(crate) fn redefine(&mut self, canonical: String) {
        self.compression_gain = gain_of(&canonical);
        self.pattern = canonical;
        self.version += 1;
    }
}

fn gain_of(canonical: &str) -> usize {
    token_count(canonical).saturating_sub(1)
}
