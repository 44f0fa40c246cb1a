//! Configuration for a trade engine instance.

use serde::{Deserialize, Serialize};

use crate::{OfferswapError, Result, constants};

/// Per-wallet trade engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Blocks a spend must be buried under before a trade (or a secure
    /// cancel) is considered final.
    pub confirmation_depth: u32,
    /// Extension used by the file helpers.
    pub offer_file_extension: String,
    /// Upper bound on the encoded size of an offer read from a source.
    pub max_offer_bytes: usize,
    /// Accept zero-amount legs in a delta (they are ignored).
    pub allow_zero_legs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confirmation_depth: constants::DEFAULT_CONFIRMATION_DEPTH,
            offer_file_extension: constants::DEFAULT_OFFER_FILE_EXTENSION.to_string(),
            max_offer_bytes: constants::DEFAULT_MAX_OFFER_BYTES,
            allow_zero_legs: true,
        }
    }
}

impl EngineConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.confirmation_depth == 0 {
            return Err(OfferswapError::Configuration(
                "confirmation_depth must be at least 1".into(),
            ));
        }
        if self.max_offer_bytes == 0 {
            return Err(OfferswapError::Configuration(
                "max_offer_bytes must be positive".into(),
            ));
        }
        if self.offer_file_extension.is_empty() || self.offer_file_extension.contains('.') {
            return Err(OfferswapError::Configuration(format!(
                "bad offer file extension: {:?}",
                self.offer_file_extension
            )));
        }
        Ok(())
    }
}
