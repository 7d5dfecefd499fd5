//! REF tokens.
//!
//! A REF token stands in for one occurrence of a stored pattern and has the
//! fixed shape `[REF:<id>:v<version>]`.

use std::fmt;

use crate::error::{Result, TpsError};

const PREFIX: &str = "[REF:";

/// A parsed REF token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefToken {
    /// Id of the referenced pattern.
    pub id: String,
    /// Pattern version the token was emitted against.
    pub version: u32,
}

impl RefToken {
    /// Create a token for `id` at `version`.
    pub fn new(id: impl Into<String>, version: u32) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }

    /// Whether a bracket token claims to be a REF token.
    pub fn is_ref(token: &str) -> bool {
        token.starts_with(PREFIX)
    }

    /// Parse a single bracket token of the form `[REF:<id>:v<version>]`.
    pub fn parse(token: &str) -> Result<Self> {
        let malformed = || TpsError::MalformedReference(token.to_string());

        let body = token
            .strip_prefix(PREFIX)
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(malformed)?;
        let (id, version) = body.rsplit_once(':').ok_or_else(malformed)?;
        let version = version
            .strip_prefix('v')
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(malformed)?;

        if id.is_empty() || id.contains(':') {
            return Err(malformed());
        }

        Ok(Self::new(id, version))
    }
}

impl fmt::Display for RefToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}:v{}]", PREFIX, self.id, self.version)
    }
}
