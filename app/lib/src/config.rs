//! Configuration for mining, training, and substitution.
//!
//! Every configuration type has a `Default` matching the behavior callers
//! get without any configuration, and a `validate` method that rejects
//! values the algorithms cannot work with.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TpsError};

/// Settings for [`PatternMiner`](crate::PatternMiner).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Minimum number of corpus occurrences for an n-gram to survive.
    pub min_frequency: u64,
    /// Shortest n-gram considered, in tokens.
    pub min_tokens: usize,
    /// Longest n-gram considered, in tokens.
    pub max_tokens: usize,
    /// A shorter pattern contained in an accepted longer one is dropped when
    /// the longer pattern's frequency is at least this fraction of its own.
    pub subsumption_ratio: f64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            min_frequency: 2,
            min_tokens: 2,
            max_tokens: 5,
            subsumption_ratio: 0.8,
        }
    }
}

impl MinerConfig {
    /// Set the frequency threshold.
    pub fn with_min_frequency(mut self, min_frequency: u64) -> Self {
        self.min_frequency = min_frequency;
        self
    }

    /// Set the shortest n-gram length.
    pub fn with_min_tokens(mut self, min_tokens: usize) -> Self {
        self.min_tokens = min_tokens;
        self
    }

    /// Set the longest n-gram length.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Check that the settings describe a usable search space.
    pub fn validate(&self) -> Result<()> {
        if self.min_frequency == 0 {
            return Err(TpsError::InvalidConfig(
                "min_frequency must be at least 1".to_string(),
            ));
        }
        if self.min_tokens < 2 {
            return Err(TpsError::InvalidConfig(format!(
                "min_tokens must be at least 2, got {}",
                self.min_tokens
            )));
        }
        if self.max_tokens < self.min_tokens {
            return Err(TpsError::InvalidConfig(format!(
                "max_tokens ({}) is smaller than min_tokens ({})",
                self.max_tokens, self.min_tokens
            )));
        }
        if !(self.subsumption_ratio > 0.0 && self.subsumption_ratio <= 1.0) {
            return Err(TpsError::InvalidConfig(format!(
                "subsumption_ratio must be in (0, 1], got {}",
                self.subsumption_ratio
            )));
        }
        Ok(())
    }
}

/// Settings for [`SubstitutionCompressor`](crate::SubstitutionCompressor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorConfig {
    /// Number of top-valued patterns tried against each input.
    pub candidate_limit: usize,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            candidate_limit: 100,
        }
    }
}

impl CompressorConfig {
    /// Check the candidate limit.
    pub fn validate(&self) -> Result<()> {
        if self.candidate_limit == 0 {
            return Err(TpsError::InvalidConfig(
                "candidate_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for [`Trainer`](crate::Trainer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Mining settings used for each training run.
    pub miner: MinerConfig,
    /// Minimum tokens saved per substitution for a pattern to be stored.
    pub min_gain: usize,
    /// Number of patterns listed in the training report.
    pub report_top: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            miner: MinerConfig::default(),
            min_gain: 1,
            report_top: 10,
        }
    }
}

impl TrainerConfig {
    /// Check the miner settings and the gain threshold.
    pub fn validate(&self) -> Result<()> {
        self.miner.validate()?;
        if self.min_gain == 0 {
            return Err(TpsError::InvalidConfig(
                "min_gain must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration, loadable from a JSON file.
///
/// ```
/// use tps_compression::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{"trainer": {"min_gain": 2}}"#).unwrap();
/// assert_eq!(config.trainer.min_gain, 2);
/// assert_eq!(config.compressor.candidate_limit, 100);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Training and mining settings.
    pub trainer: TrainerConfig,
    /// Substitution settings.
    pub compressor: CompressorConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(input: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(input)
            .map_err(|e| TpsError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.trainer.validate()?;
        self.compressor.validate()
    }
}
