//! Corpus pattern mining.
//!
//! The miner tallies every contiguous n-gram of tokens across a corpus,
//! drops rare ones, removes shorter n-grams that almost always occur inside
//! an accepted longer one, and ranks the rest by value score.
//!
//! ```text
//! corpus ──► tally n-grams ──► frequency floor ──► subsumption ──► rank
//! ```

use std::collections::HashMap;

use chrono::Utc;
use log::{debug, info};

#[cfg(feature = "parallel")]
use dashmap::{mapref::entry::Entry, DashMap};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::MinerConfig;
use crate::error::Result;
use crate::pattern::{DomainClassifier, Pattern, MAX_EXAMPLES};
use crate::token::{canonical, extract_tokens};

/// Position of an n-gram's first occurrence: `(sequence, token offset, length)`.
type Occurrence = (usize, usize, usize);

/// Tally entry for one distinct n-gram.
#[derive(Debug, Clone)]
struct Candidate {
    tokens: Vec<String>,
    count: u64,
    first: Occurrence,
    /// Indices of the first few sequences containing the n-gram, ascending.
    sequences: Vec<usize>,
}

impl Candidate {
    fn new(tokens: &[&str], first: Occurrence) -> Self {
        Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            count: 0,
            first,
            sequences: Vec::with_capacity(MAX_EXAMPLES),
        }
    }

    fn observe(&mut self, sequence: usize) {
        self.count += 1;
        if self.sequences.len() < MAX_EXAMPLES && self.sequences.last() != Some(&sequence) {
            self.sequences.push(sequence);
        }
    }

    /// Fold another tally of the same n-gram into this one.
    ///
    /// The result does not depend on merge order.
    fn merge(&mut self, other: Candidate) {
        self.count += other.count;
        self.first = self.first.min(other.first);
        self.sequences.extend(other.sequences);
        self.sequences.sort_unstable();
        self.sequences.dedup();
        self.sequences.truncate(MAX_EXAMPLES);
    }

    fn len(&self) -> usize {
        self.tokens.len()
    }
}

/// Discovers recurring token patterns in a corpus.
#[derive(Debug, Clone)]
pub struct PatternMiner {
    config: MinerConfig,
    classifier: DomainClassifier,
}

impl PatternMiner {
    /// Create a miner with default configuration.
    pub fn new() -> Self {
        Self {
            config: MinerConfig::default(),
            classifier: DomainClassifier::new(),
        }
    }

    /// Create a miner with the given configuration.
    pub fn with_config(config: MinerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            classifier: DomainClassifier::new(),
        })
    }

    /// Replace the domain classifier.
    pub fn with_classifier(mut self, classifier: DomainClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Mine a corpus of token strings.
    ///
    /// Examples attached to each pattern are the token strings themselves.
    pub fn mine<S>(&self, corpus: &[S]) -> Vec<Pattern>
    where
        S: AsRef<str> + Sync,
    {
        self.mine_with_originals::<S, S>(corpus, None)
    }

    /// Mine a corpus, taking examples from a parallel corpus of original texts.
    ///
    /// `originals[i]` is the pre-tokenization text of `corpus[i]`. Sequences
    /// without an original fall back to their token string.
    pub fn mine_with_originals<S, O>(&self, corpus: &[S], originals: Option<&[O]>) -> Vec<Pattern>
    where
        S: AsRef<str> + Sync,
        O: AsRef<str>,
    {
        if corpus.is_empty() {
            return Vec::new();
        }

        let tally = self.tally(corpus);
        let distinct = tally.len();

        let frequent: Vec<Candidate> = tally
            .into_iter()
            .filter(|c| c.count >= self.config.min_frequency)
            .collect();
        let frequent_count = frequent.len();

        let accepted = self.remove_subsumed(frequent);
        debug!(
            "{} distinct n-grams, {} above frequency {}, {} after subsumption",
            distinct,
            frequent_count,
            self.config.min_frequency,
            accepted.len()
        );

        let now = Utc::now();
        let mut ranked: Vec<(Occurrence, Pattern)> = accepted
            .into_iter()
            .map(|candidate| {
                let examples: Vec<String> = candidate
                    .sequences
                    .iter()
                    .map(|&i| {
                        originals
                            .and_then(|o| o.get(i))
                            .map(|o| o.as_ref())
                            .unwrap_or_else(|| corpus[i].as_ref())
                            .to_string()
                    })
                    .collect();
                let domains = self.classifier.classify(&examples);
                let pattern =
                    Pattern::observed_at(canonical(&candidate.tokens), candidate.count, now)
                        .with_examples(examples)
                        .with_domains(domains);
                (candidate.first, pattern)
            })
            .collect();

        ranked.sort_by(|(a_first, a), (b_first, b)| {
            b.value_score()
                .cmp(&a.value_score())
                .then_with(|| a_first.cmp(b_first))
        });

        info!("Mined {} patterns from {} sequences", ranked.len(), corpus.len());
        ranked.into_iter().map(|(_, pattern)| pattern).collect()
    }

    /// Count every n-gram in one sequence.
    fn tally_sequence(&self, index: usize, text: &str) -> HashMap<String, Candidate> {
        let tokens = extract_tokens(text);
        let mut counts: HashMap<String, Candidate> = HashMap::new();

        let upper = self.config.max_tokens.min(tokens.len());
        for n in self.config.min_tokens..=upper {
            for (offset, window) in tokens.windows(n).enumerate() {
                counts
                    .entry(canonical(window))
                    .or_insert_with(|| Candidate::new(window, (index, offset, n)))
                    .observe(index);
            }
        }

        counts
    }

    /// Build the global frequency table, ordered by first occurrence.
    #[cfg(not(feature = "parallel"))]
    fn tally<S: AsRef<str>>(&self, corpus: &[S]) -> Vec<Candidate> {
        let mut global: HashMap<String, Candidate> = HashMap::new();
        for (index, text) in corpus.iter().enumerate() {
            for (key, local) in self.tally_sequence(index, text.as_ref()) {
                match global.get_mut(&key) {
                    Some(existing) => existing.merge(local),
                    None => {
                        global.insert(key, local);
                    }
                }
            }
        }
        ordered(global.into_values())
    }

    /// Build the global frequency table, ordered by first occurrence.
    #[cfg(feature = "parallel")]
    fn tally<S: AsRef<str> + Sync>(&self, corpus: &[S]) -> Vec<Candidate> {
        let global: DashMap<String, Candidate> = DashMap::new();
        corpus.par_iter().enumerate().for_each(|(index, text)| {
            for (key, local) in self.tally_sequence(index, text.as_ref()) {
                match global.entry(key) {
                    Entry::Occupied(mut existing) => existing.get_mut().merge(local),
                    Entry::Vacant(slot) => {
                        slot.insert(local);
                    }
                }
            }
        });
        ordered(global.into_iter().map(|(_, candidate)| candidate))
    }

    /// Drop candidates that are nearly always a fragment of a longer accepted one.
    fn remove_subsumed(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.sort_by(|a, b| {
            b.len()
                .cmp(&a.len())
                .then_with(|| b.count.cmp(&a.count))
                .then_with(|| a.first.cmp(&b.first))
        });

        let ratio = self.config.subsumption_ratio;
        let mut accepted: Vec<Candidate> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let subsumed = accepted.iter().any(|longer| {
                longer.len() > candidate.len()
                    && longer.count as f64 >= ratio * candidate.count as f64
                    && contains_run(&longer.tokens, &candidate.tokens)
            });
            if !subsumed {
                accepted.push(candidate);
            }
        }
        accepted
    }
}

impl Default for PatternMiner {
    fn default() -> Self {
        Self::new()
    }
}

fn ordered(candidates: impl Iterator<Item = Candidate>) -> Vec<Candidate> {
    // first occurrences are unique per n-gram
    let mut out: Vec<Candidate> = candidates.collect();
    out.sort_unstable_by_key(|c| c.first);
    out
}

/// Whether `needle` occurs as a contiguous run inside `haystack`.
fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    needle.len() <= haystack.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MinerConfig;
    use crate::pattern::GENERAL_DOMAIN;
    use proptest::prelude::*;

    fn transcript_corpus() -> Vec<&'static str> {
        vec![
            "[REQ:ANALYZE] [TARGET:TRANSCRIPT] [EXTRACT:ISSUE]",
            "[REQ:ANALYZE] [TARGET:TRANSCRIPT] [EXTRACT:SENTIMENT]",
            "[REQ:ANALYZE] [TARGET:TRANSCRIPT] [OUT:JSON]",
        ]
    }

    #[test]
    fn test_empty_corpus() {
        let miner = PatternMiner::new();
        assert!(miner.mine::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_sequences_without_tokens() {
        let miner = PatternMiner::new();
        assert!(miner.mine(&["plain text", "[unclosed", ""]).is_empty());
    }

    #[test]
    fn test_finds_shared_prefix() {
        let miner = PatternMiner::new();
        let patterns = miner.mine(&transcript_corpus());

        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert_eq!(p.pattern, "[REQ:ANALYZE] [TARGET:TRANSCRIPT]");
        assert_eq!(p.frequency, 3);
        assert_eq!(p.compression_gain, 1);
        assert_eq!(p.value_score(), 3);
        assert_eq!(p.examples.len(), 3);
        assert!(p.in_domain("analysis"));
    }

    #[test]
    fn test_frequency_floor() {
        let miner =
            PatternMiner::with_config(MinerConfig::default().with_min_frequency(4)).unwrap();
        assert!(miner.mine(&transcript_corpus()).is_empty());
    }

    #[test]
    fn test_repeats_within_one_sequence_count() {
        let miner = PatternMiner::new();
        let patterns = miner.mine(&["[A] [B] [X] [A] [B]"]);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern, "[A] [B]");
        assert_eq!(patterns[0].frequency, 2);
        assert_eq!(patterns[0].examples.len(), 1);
    }

    #[test]
    fn test_subsumed_fragment_dropped() {
        let miner = PatternMiner::new();
        // [A] [B] always appears inside [A] [B] [C]
        let corpus = vec!["[A] [B] [C] [X]", "[A] [B] [C] [Y]", "[Z] [A] [B] [C]"];
        let patterns = miner.mine(&corpus);

        let texts: Vec<&str> = patterns.iter().map(|p| p.pattern.as_str()).collect();
        assert_eq!(texts, vec!["[A] [B] [C]"]);
        assert_eq!(patterns[0].frequency, 3);
        assert_eq!(patterns[0].compression_gain, 2);
    }

    #[test]
    fn test_fragment_kept_when_frequent_alone() {
        let miner = PatternMiner::new();
        let corpus = vec![
            "[A] [B] [C]",
            "[A] [B] [C]",
            "[A] [B] [Q]",
            "[A] [B] [R]",
            "[A] [B] [S]",
        ];
        let patterns = miner.mine(&corpus);

        let abc = patterns.iter().find(|p| p.pattern == "[A] [B] [C]").unwrap();
        let ab = patterns.iter().find(|p| p.pattern == "[A] [B]").unwrap();
        assert_eq!(abc.frequency, 2);
        assert_eq!(ab.frequency, 5);
        // [B] [C] is covered by [A] [B] [C] at equal frequency
        assert!(patterns.iter().all(|p| p.pattern != "[B] [C]"));
    }

    #[test]
    fn test_ranked_by_value_score() {
        let miner = PatternMiner::new();
        let corpus = vec![
            "[P] [Q] [R] [S]",
            "[P] [Q] [R] [S]",
            "[X] [Y]",
            "[X] [Y]",
            "[X] [Y]",
        ];
        let patterns = miner.mine(&corpus);
        assert_eq!(patterns[0].pattern, "[P] [Q] [R] [S]");
        assert_eq!(patterns[0].value_score(), 6);
        assert_eq!(patterns[1].pattern, "[X] [Y]");
        assert_eq!(patterns[1].value_score(), 3);
        for pair in patterns.windows(2) {
            assert!(pair[0].value_score() >= pair[1].value_score());
        }
    }

    #[test]
    fn test_max_tokens_caps_window() {
        let config = MinerConfig::default().with_max_tokens(2);
        let miner = PatternMiner::with_config(config).unwrap();
        let patterns = miner.mine(&["[A] [B] [C] [D]", "[A] [B] [C] [D]"]);
        assert!(patterns.iter().all(|p| p.token_len() == 2));
        assert_eq!(patterns.len(), 3);
    }

    #[test]
    fn test_min_tokens_raises_floor() {
        let config = MinerConfig::default().with_min_tokens(3);
        let miner = PatternMiner::with_config(config).unwrap();
        let patterns = miner.mine(&transcript_corpus());
        assert!(patterns.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(PatternMiner::with_config(MinerConfig::default().with_min_tokens(0)).is_err());
    }

    #[test]
    fn test_examples_from_originals() {
        let miner = PatternMiner::new();
        let corpus = transcript_corpus();
        let originals = vec![
            "Analyze this transcript for issues",
            "Analyze this transcript for sentiment",
            "Analyze this transcript and output JSON",
        ];
        let patterns = miner.mine_with_originals(&corpus, Some(originals.as_slice()));
        assert_eq!(patterns[0].examples, originals);
        assert!(patterns[0].in_domain("analysis"));
        assert!(patterns[0].in_domain("data"));
    }

    #[test]
    fn test_short_originals_fall_back_to_tokens() {
        let miner = PatternMiner::new();
        let corpus = transcript_corpus();
        let originals = vec!["first original"];
        let patterns = miner.mine_with_originals(&corpus, Some(originals.as_slice()));
        assert_eq!(patterns[0].examples[0], "first original");
        assert_eq!(patterns[0].examples[1], corpus[1]);
    }

    #[test]
    fn test_general_domain_default() {
        let miner = PatternMiner::new();
        let patterns = miner.mine(&["[K1] [K2]", "[K1] [K2]"]);
        assert!(patterns[0].in_domain(GENERAL_DOMAIN));
    }

    #[test]
    fn test_deterministic_order_for_ties() {
        let miner = PatternMiner::new();
        let corpus = vec!["[A] [B] [Q] [C] [D]", "[A] [B] [R] [C] [D]"];
        let first = miner.mine(&corpus);
        let second = miner.mine(&corpus);
        let texts: Vec<&str> = first.iter().map(|p| p.pattern.as_str()).collect();
        assert_eq!(texts, vec!["[A] [B]", "[C] [D]"]);
        assert_eq!(
            texts,
            second.iter().map(|p| p.pattern.as_str()).collect::<Vec<_>>()
        );
    }

    /// Fold per-sequence tallies one sequence at a time, in corpus order.
    fn sequential_tally(miner: &PatternMiner, corpus: &[String]) -> HashMap<String, Candidate> {
        let mut global: HashMap<String, Candidate> = HashMap::new();
        for (index, text) in corpus.iter().enumerate() {
            for (key, local) in miner.tally_sequence(index, text) {
                match global.get_mut(&key) {
                    Some(existing) => existing.merge(local),
                    None => {
                        global.insert(key, local);
                    }
                }
            }
        }
        global
    }

    fn assert_tally_matches_fold(miner: &PatternMiner, corpus: &[String]) {
        let expected = sequential_tally(miner, corpus);
        let tally = miner.tally(corpus);

        assert_eq!(tally.len(), expected.len());
        for candidate in &tally {
            let want = &expected[&canonical(&candidate.tokens)];
            assert_eq!(candidate.count, want.count, "{:?}", candidate.tokens);
            assert_eq!(candidate.first, want.first, "{:?}", candidate.tokens);
            assert_eq!(candidate.sequences, want.sequences, "{:?}", candidate.tokens);
        }
        assert!(tally.windows(2).all(|w| w[0].first < w[1].first));
    }

    #[test]
    fn test_tally_matches_sequential_fold() {
        let alphabet = ["[A]", "[B]", "[C]", "[D]", "[E]"];
        let corpus: Vec<String> = (0..200usize)
            .map(|i| {
                let len = 2 + i % 7;
                let tokens: Vec<&str> = (0..len)
                    .map(|j| alphabet[(i * 3 + j * j) % alphabet.len()])
                    .collect();
                canonical(&tokens)
            })
            .collect();

        assert_tally_matches_fold(&PatternMiner::new(), &corpus);

        let wide = MinerConfig::default().with_max_tokens(8);
        assert_tally_matches_fold(&PatternMiner::with_config(wide).unwrap(), &corpus);
    }

    proptest! {
        #[test]
        fn prop_tally_matches_sequential_fold(
            corpus in prop::collection::vec(
                prop::collection::vec(prop::sample::select(vec!["[A]", "[B]", "[C]"]), 0..10)
                    .prop_map(|t| canonical(&t)),
                0..24,
            ),
        ) {
            assert_tally_matches_fold(&PatternMiner::new(), &corpus);
        }
    }

    #[test]
    fn test_contains_run() {
        let hay: Vec<String> = ["[A]", "[B]", "[C]"].iter().map(|s| s.to_string()).collect();
        let yes: Vec<String> = ["[B]", "[C]"].iter().map(|s| s.to_string()).collect();
        let no: Vec<String> = ["[A]", "[C]"].iter().map(|s| s.to_string()).collect();
        assert!(contains_run(&hay, &yes));
        assert!(!contains_run(&hay, &no));
    }
}
