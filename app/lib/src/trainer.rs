//! Training: mine a corpus, keep the patterns worth storing, persist them.

use std::fmt;

use log::info;
use serde::Serialize;

use crate::config::TrainerConfig;
use crate::error::Result;
use crate::miner::PatternMiner;
use crate::pattern::Pattern;
use crate::store::PatternStore;

/// Summary of one training run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    /// Sequences in the training corpus.
    pub prompts_processed: usize,
    /// Patterns returned by the miner.
    pub patterns_discovered: usize,
    /// Patterns that met the gain threshold and were merged into the store.
    pub patterns_added: usize,
    /// How many of the added patterns had ids new to the store.
    pub new_patterns: usize,
    /// Sum of the added patterns' value scores.
    pub estimated_tokens_saved: u64,
    /// Highest-valued added patterns, best first.
    pub top_patterns: Vec<Pattern>,
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Prompts processed: {}", self.prompts_processed)?;
        writeln!(f, "Patterns discovered: {}", self.patterns_discovered)?;
        writeln!(
            f,
            "Patterns added: {} ({} new)",
            self.patterns_added, self.new_patterns
        )?;
        writeln!(f, "Estimated tokens saved: {}", self.estimated_tokens_saved)?;
        if !self.top_patterns.is_empty() {
            writeln!(f, "Top patterns:")?;
            for (i, p) in self.top_patterns.iter().enumerate() {
                writeln!(
                    f,
                    "  {:>2}. {} x{} (gain {}, value {}) {}",
                    i + 1,
                    p.id,
                    p.frequency,
                    p.compression_gain,
                    p.value_score(),
                    p.pattern
                )?;
            }
        }
        Ok(())
    }
}

/// Runs mining and merges qualifying patterns into a store.
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainerConfig,
    miner: PatternMiner,
}

impl Trainer {
    /// Create a trainer with default configuration.
    pub fn new() -> Self {
        Self {
            config: TrainerConfig::default(),
            miner: PatternMiner::new(),
        }
    }

    /// Create a trainer with the given configuration.
    pub fn with_config(config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        let miner = PatternMiner::with_config(config.miner.clone())?;
        Ok(Self { config, miner })
    }

    /// The active configuration.
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Train on token strings alone.
    pub fn train<S>(&self, store: &mut PatternStore, corpus: &[S]) -> Result<TrainingReport>
    where
        S: AsRef<str> + Sync,
    {
        self.train_with_originals::<S, S>(store, corpus, None)
    }

    /// Train on token strings with their pre-tokenization originals.
    ///
    /// The store is saved once at the end. A corpus that yields nothing
    /// worth storing produces a report with zero additions.
    pub fn train_with_originals<S, O>(
        &self,
        store: &mut PatternStore,
        corpus: &[S],
        originals: Option<&[O]>,
    ) -> Result<TrainingReport>
    where
        S: AsRef<str> + Sync,
        O: AsRef<str>,
    {
        info!("Training on {} sequences", corpus.len());

        let discovered = self.miner.mine_with_originals(corpus, originals);
        let patterns_discovered = discovered.len();

        let qualifying: Vec<Pattern> = discovered
            .into_iter()
            .filter(|p| p.compression_gain >= self.config.min_gain)
            .collect();

        let estimated_tokens_saved = qualifying
            .iter()
            .map(Pattern::value_score)
            .fold(0u64, u64::saturating_add);
        let top_patterns: Vec<Pattern> = qualifying
            .iter()
            .take(self.config.report_top)
            .cloned()
            .collect();
        let patterns_added = qualifying.len();

        let new_patterns = store.add_many(qualifying)?;

        info!(
            "Training added {} of {} discovered patterns ({} new)",
            patterns_added, patterns_discovered, new_patterns
        );

        Ok(TrainingReport {
            prompts_processed: corpus.len(),
            patterns_discovered,
            patterns_added,
            new_patterns,
            estimated_tokens_saved,
            top_patterns,
        })
    }
}

impl Default for Trainer {
    fn default() -> Self {
        Self::new()
    }
}
