//! Ledger configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use medledger_core::{AuthorizationMode, BlockHash, VerifyOptions};

use crate::error::{LedgerError, Result};

/// Configuration for a [`crate::Ledger`].
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use medledger::LedgerConfig;
///
/// let config = LedgerConfig::from_json(r#"{ "maxAppendAttempts": 8 }"#).unwrap();
/// assert_eq!(config.max_append_attempts, 8);
/// assert_eq!(config.verify_batch_size, 256);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct LedgerConfig {
    /// Attempts per append before giving up on a contended tail.
    pub max_append_attempts: u32,
    /// Backoff before the first retry; doubled per retry.
    pub retry_base_delay_ms: u64,
    /// Upper bound on a single backoff.
    pub retry_max_delay_ms: u64,
    /// Blocks fetched per read during verification.
    pub verify_batch_size: u64,
    /// Authorization checks performed during verification.
    pub authorization_mode: AuthorizationMode,
    /// Report every break instead of stopping at the first.
    pub collect_all_breaks: bool,
    /// Hex digest the genesis block must have, if pinned.
    pub expected_genesis_hash: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_append_attempts: 5,
            retry_base_delay_ms: 2,
            retry_max_delay_ms: 50,
            verify_batch_size: 256,
            authorization_mode: AuthorizationMode::PointInTime,
            collect_all_breaks: false,
            expected_genesis_hash: None,
        }
    }
}

impl LedgerConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_append_attempts == 0 {
            return Err(LedgerError::Config("maxAppendAttempts must be at least 1".into()));
        }
        if self.verify_batch_size == 0 {
            return Err(LedgerError::Config("verifyBatchSize must be at least 1".into()));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(LedgerError::Config(
                "retryBaseDelayMs must not exceed retryMaxDelayMs".into(),
            ));
        }
        self.genesis_hash()?;
        Ok(())
    }

    /// The pinned genesis digest, decoded.
    pub fn genesis_hash(&self) -> Result<Option<BlockHash>> {
        self.expected_genesis_hash
            .as_deref()
            .map(|hex| {
                BlockHash::from_hex(hex)
                    .map_err(|e| LedgerError::Config(format!("expectedGenesisHash: {}", e)))
            })
            .transpose()
    }

    pub fn verify_options(&self) -> VerifyOptions {
        VerifyOptions {
            mode: self.authorization_mode,
            collect_all: self.collect_all_breaks,
        }
    }

    /// Backoff to wait after the `retry`-th conflict (1-based).
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let millis = self
            .retry_base_delay_ms
            .saturating_mul(factor)
            .min(self.retry_max_delay_ms);
        Duration::from_millis(millis)
    }
}
