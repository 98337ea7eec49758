//! The append path.
//!
//! An append runs through these states:
//!
//! ```text
//! Requested -> Authorized -> Built -> Committing -> Committed
//!                                         |
//!                                         +-> Conflicted -> Retrying -> Authorized ...
//!                                         +-> Failed
//! ```
//!
//! Nothing serializes appends in-process. Each attempt reads the tail and its
//! token, builds a candidate on it, and hands both to the store's
//! compare-and-swap commit. Losing the race means starting over on the new
//! tail, up to `max_append_attempts` times.

use std::fmt;
use std::sync::Arc;

use tracing::Instrument;

use medledger_core::{Block, BlockFactory, BlockSigner, Clock, PayloadRef, ValidatorId};
use medledger_registry::{Authorization, ValidatorRegistry};
use medledger_store::{CommitResult, LedgerStore};

use crate::config::LedgerConfig;
use crate::error::AppendError;

/// A block that made it into the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub block: Block,
    /// Attempts taken, counting the successful one.
    pub attempts: u32,
}

/// Result of an append request.
pub type AppendResult = std::result::Result<Committed, AppendError>;

/// Stage of an append, as reported in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendState {
    Requested,
    Authorized,
    Built,
    Committing,
    Committed,
    Conflicted,
    Retrying,
    Failed,
}

impl fmt::Display for AppendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppendState::Requested => "requested",
            AppendState::Authorized => "authorized",
            AppendState::Built => "built",
            AppendState::Committing => "committing",
            AppendState::Committed => "committed",
            AppendState::Conflicted => "conflicted",
            AppendState::Retrying => "retrying",
            AppendState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Builds blocks and commits them under optimistic concurrency.
pub struct AppendCoordinator<S> {
    store: Arc<S>,
    registry: Arc<ValidatorRegistry>,
    signer: Arc<dyn BlockSigner>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl<S: LedgerStore> AppendCoordinator<S> {
    pub fn new(
        store: Arc<S>,
        registry: Arc<ValidatorRegistry>,
        signer: Arc<dyn BlockSigner>,
        clock: Arc<dyn Clock>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            signer,
            clock,
            config,
        }
    }

    /// Append a block referencing `payload_ref`, signed as `validator_id`.
    ///
    /// Dropping the returned future before it resolves has no effect on the
    /// chain unless the commit itself already went through.
    pub async fn append(&self, payload_ref: &PayloadRef, validator_id: &ValidatorId) -> AppendResult {
        let span = tracing::debug_span!("append", validator = %validator_id, payload = %payload_ref);
        let result = self.run(payload_ref, validator_id).instrument(span).await;

        match &result {
            Ok(committed) => tracing::info!(
                index = committed.block.index(),
                hash = %committed.block.hash,
                validator = %validator_id,
                attempts = committed.attempts,
                "block committed"
            ),
            Err(e) => tracing::warn!(
                validator = %validator_id,
                error = %e,
                "append rejected"
            ),
        }
        result
    }

    async fn run(&self, payload_ref: &PayloadRef, validator_id: &ValidatorId) -> AppendResult {
        trace_state(AppendState::Requested, 1);
        payload_ref
            .validate()
            .map_err(|e| self.fail(AppendError::from(e), 1))?;

        let max_attempts = self.config.max_append_attempts.max(1);
        let mut attempt = 1;
        loop {
            if let Authorization::Unauthorized(reason) = self.registry.authorize(validator_id) {
                return Err(self.fail(AppendError::Unauthorized(reason), attempt));
            }
            trace_state(AppendState::Authorized, attempt);

            let (tail, token) = self
                .store
                .get_tail()
                .await
                .map_err(|e| self.fail(AppendError::from(e), attempt))?;

            let timestamp = self.clock.now_millis();
            let block = BlockFactory::build(
                payload_ref,
                tail.as_ref(),
                validator_id,
                timestamp,
                self.signer.as_ref(),
            )
            .map_err(|e| self.fail(AppendError::from(e), attempt))?;
            trace_state(AppendState::Built, attempt);

            // A revocation may have landed between the first check and now.
            if let Authorization::Unauthorized(reason) =
                self.registry.authorize_at(validator_id, timestamp)
            {
                return Err(self.fail(AppendError::Unauthorized(reason), attempt));
            }

            trace_state(AppendState::Committing, attempt);
            let outcome = self
                .store
                .commit(&block, token)
                .await
                .map_err(|e| self.fail(AppendError::from(e), attempt))?;

            match outcome {
                CommitResult::Committed { .. } => {
                    trace_state(AppendState::Committed, attempt);
                    return Ok(Committed {
                        block,
                        attempts: attempt,
                    });
                }
                CommitResult::TokenMismatch { current } => {
                    trace_state(AppendState::Conflicted, attempt);
                    tracing::warn!(
                        attempt,
                        expected = %token,
                        %current,
                        "tail moved during append"
                    );
                    if attempt >= max_attempts {
                        return Err(self.fail(
                            AppendError::ConcurrentAppendConflict { attempts: attempt },
                            attempt,
                        ));
                    }

                    trace_state(AppendState::Retrying, attempt);
                    let delay = self.config.retry_delay(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    fn fail(&self, error: AppendError, attempt: u32) -> AppendError {
        tracing::debug!(state = %AppendState::Failed, attempt, kind = ?error.kind(), "append state");
        error
    }
}

fn trace_state(state: AppendState, attempt: u32) {
    tracing::debug!(state = %state, attempt, "append state");
}
