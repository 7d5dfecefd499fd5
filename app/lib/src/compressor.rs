//! Greedy non-overlapping pattern substitution.
//!
//! For one input string the compressor:
//!
//! 1. takes the top-valued patterns from the store (optionally per domain),
//! 2. finds every literal occurrence of each pattern's canonical text that
//!    starts and ends on token boundaries,
//! 3. orders matches by start offset, higher value score first on ties,
//! 4. keeps each match that starts at or after the end of the last kept one,
//! 5. splices the REF tokens in from the back so offsets stay valid.
//!
//! The selection is earliest-start greedy, not a maximum-value optimum.

use log::{debug, warn};
use serde::Serialize;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::CompressorConfig;
use crate::error::Result;
use crate::pattern::Pattern;
use crate::reference::RefToken;
use crate::store::PatternStore;
use crate::token::{token_count, TokenSpans};

/// One applied substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternUsage {
    /// Id of the substituted pattern.
    pub pattern_id: String,
    /// Canonical text that was replaced.
    pub pattern: String,
    /// Token written in its place.
    pub ref_token: String,
    /// Tokens saved by this substitution.
    pub tokens_saved: usize,
}

/// Diagnostics for one compression call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompressionMetadata {
    /// Tokens in the input.
    pub original_tokens: usize,
    /// Tokens in the output.
    pub final_tokens: usize,
    /// Sum of the applied patterns' compression gains.
    pub tokens_saved: usize,
    /// Applied substitutions in input order.
    pub patterns_used: Vec<PatternUsage>,
    /// Fraction of input tokens removed, when the input had any tokens.
    pub additional_compression: Option<f64>,
}

impl CompressionMetadata {
    /// Whether any substitution was applied.
    pub fn is_unchanged(&self) -> bool {
        self.patterns_used.is_empty()
    }
}

/// Result of compressing one string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Compressed {
    /// Rewritten text.
    pub text: String,
    /// What was substituted.
    pub metadata: CompressionMetadata,
}

/// A candidate occurrence: byte span plus the candidate's rank.
#[derive(Debug, Clone, Copy)]
struct Match {
    start: usize,
    end: usize,
    rank: usize,
    value: u64,
}

/// Rewrites token strings using the patterns of a [`PatternStore`].
///
/// The compressor only reads the store, so any number of compressors may
/// share one.
#[derive(Debug, Clone)]
pub struct SubstitutionCompressor<'a> {
    store: &'a PatternStore,
    config: CompressorConfig,
}

impl<'a> SubstitutionCompressor<'a> {
    /// Create a compressor with default configuration.
    pub fn new(store: &'a PatternStore) -> Self {
        Self {
            store,
            config: CompressorConfig::default(),
        }
    }

    /// Create a compressor with the given configuration.
    pub fn with_config(store: &'a PatternStore, config: CompressorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Compress one string, optionally restricting candidates to a domain.
    ///
    /// Inputs without tokens or without matches come back unchanged.
    pub fn compress(&self, input: &str, domain: Option<&str>) -> Compressed {
        let original_tokens = token_count(input);
        let candidates = self.store.top(self.config.candidate_limit, domain);

        let selected = select_matches(find_matches(input, &candidates));

        let mut text = input.to_string();
        for m in selected.iter().rev() {
            text.replace_range(m.start..m.end, &candidates[m.rank].ref_token());
        }

        let patterns_used: Vec<PatternUsage> = selected
            .iter()
            .map(|m| {
                let pattern = candidates[m.rank];
                PatternUsage {
                    pattern_id: pattern.id.clone(),
                    pattern: pattern.pattern.clone(),
                    ref_token: pattern.ref_token(),
                    tokens_saved: pattern.compression_gain,
                }
            })
            .collect();
        let tokens_saved: usize = patterns_used.iter().map(|u| u.tokens_saved).sum();

        let final_tokens = token_count(&text);
        let additional_compression =
            (original_tokens > 0).then(|| tokens_saved as f64 / original_tokens as f64);

        debug!(
            "Compressed {} -> {} tokens using {} substitutions",
            original_tokens,
            final_tokens,
            patterns_used.len()
        );

        Compressed {
            text,
            metadata: CompressionMetadata {
                original_tokens,
                final_tokens,
                tokens_saved,
                patterns_used,
                additional_compression,
            },
        }
    }

    /// Compress each input independently.
    ///
    /// `domains[i]` is the hint for `inputs[i]`; missing entries mean no hint.
    /// Output order matches input order.
    pub fn batch_compress<S>(
        &self,
        inputs: &[S],
        domains: Option<&[Option<&str>]>,
    ) -> Vec<Compressed>
    where
        S: AsRef<str> + Sync,
    {
        let hint = |i: usize| domains.and_then(|d| d.get(i).copied().flatten());

        #[cfg(feature = "parallel")]
        let results = inputs
            .par_iter()
            .enumerate()
            .map(|(i, input)| self.compress(input.as_ref(), hint(i)))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let results = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| self.compress(input.as_ref(), hint(i)))
            .collect();

        results
    }

    /// Replace every REF token in `input` with its pattern's canonical text.
    ///
    /// Other bracket tokens are left alone. Unknown ids and outdated versions
    /// are errors.
    pub fn expand(&self, input: &str) -> Result<String> {
        let mut out = String::with_capacity(input.len() * 2);
        let mut copied = 0;

        for (start, token) in TokenSpans::new(input) {
            if !RefToken::is_ref(token) {
                if token.contains("[REF:") {
                    warn!("Bracket span {:?} embeds a REF token, leaving it unexpanded", token);
                }
                continue;
            }
            let reference = RefToken::parse(token)?;
            let pattern = self.store.resolve(&reference)?;

            out.push_str(&input[copied..start]);
            out.push_str(&pattern.pattern);
            copied = start + token.len();
        }

        out.push_str(&input[copied..]);
        Ok(out)
    }
}

/// Every occurrence of every candidate that begins and ends on token
/// boundaries, including overlapping ones.
fn find_matches(input: &str, candidates: &[&Pattern]) -> Vec<Match> {
    let (starts, ends): (Vec<usize>, Vec<usize>) = TokenSpans::new(input)
        .map(|(start, token)| (start, start + token.len()))
        .unzip();

    let mut matches = Vec::new();
    for (rank, pattern) in candidates.iter().enumerate() {
        let needle = pattern.pattern.as_str();
        if needle.is_empty() {
            continue;
        }
        let mut from = 0;
        while let Some(offset) = input[from..].find(needle) {
            let start = from + offset;
            let end = start + needle.len();
            // offsets ascend, so both lists are sorted
            if starts.binary_search(&start).is_ok() && ends.binary_search(&end).is_ok() {
                matches.push(Match {
                    start,
                    end,
                    rank,
                    value: pattern.value_score(),
                });
            }
            // step past the first char to catch overlapping occurrences
            from = start + input[start..].chars().next().map_or(1, char::len_utf8);
        }
    }
    matches
}

/// Earliest-start greedy selection of non-overlapping matches.
fn select_matches(mut matches: Vec<Match>) -> Vec<Match> {
    matches.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| b.value.cmp(&a.value))
            .then_with(|| a.rank.cmp(&b.rank))
    });

    let mut selected: Vec<Match> = Vec::new();
    let mut boundary = 0;
    for m in matches {
        if m.start >= boundary {
            boundary = m.end;
            selected.push(m);
        }
    }
    selected
}
