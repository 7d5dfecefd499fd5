//! # TPS Compression Library
//!
//! Token Pattern Substitution (TPS) compresses bracket-token strings such as
//! `[REQ:ANALYZE] [TARGET:TRANSCRIPT] [OUT:JSON]` by mining recurring token
//! runs from a training corpus and replacing them with compact
//! `[REF:<id>:v<version>]` tokens at use time.
//!
//! Tokens are opaque: the library only recognizes `[` ... `]` spans and never
//! interprets their content.
//!
//! ```
//! use tps_compression::{PatternStore, SubstitutionCompressor, Trainer};
//!
//! let corpus = [
//!     "[REQ:ANALYZE] [TARGET:TRANSCRIPT] [EXTRACT:ISSUE]",
//!     "[REQ:ANALYZE] [TARGET:TRANSCRIPT] [EXTRACT:SENTIMENT]",
//!     "[REQ:ANALYZE] [TARGET:TRANSCRIPT] [OUT:JSON]",
//! ];
//!
//! let mut store = PatternStore::new();
//! let report = Trainer::new().train(&mut store, &corpus).unwrap();
//! assert_eq!(report.patterns_added, 1);
//!
//! let compressor = SubstitutionCompressor::new(&store);
//! let result = compressor.compress(corpus[0], None);
//! assert_eq!(result.metadata.tokens_saved, 1);
//! assert_eq!(compressor.expand(&result.text).unwrap(), corpus[0]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compressor;
pub mod config;
pub mod error;
pub mod miner;
pub mod pattern;
pub mod reference;
pub mod store;
pub mod token;
pub mod trainer;


pub use compressor::{CompressionMetadata, Compressed, PatternUsage, SubstitutionCompressor};
pub use config::{CompressorConfig, EngineConfig, MinerConfig, TrainerConfig};
pub use error::{Result, TpsError};
pub use miner::PatternMiner;
pub use pattern::{pattern_id, DomainClassifier, Pattern, GENERAL_DOMAIN};
pub use reference::RefToken;
pub use store::{MostUsed, PatternStore, StoreStats};
pub use token::{canonical, extract_tokens, token_count};
pub use trainer::{Trainer, TrainingReport};
