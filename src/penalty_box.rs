//! Per-URI back-off gate against JWKS-endpoint flooding (C4).
//!
//! A cooperative back-off: `wait` fails immediately rather than blocking,
//! so a flood of tokens carrying unknown `kid`s costs at most one fetch
//! per `wait_seconds`. Real waiting (retries) is left to callers upstream.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::{JwtVerifyError, Result};

/// Default back-off duration.
pub const DEFAULT_WAIT_SECONDS: u64 = 10;

#[async_trait]
pub trait PenaltyBox: Send + Sync {
    /// Fails immediately with [`JwtVerifyError::WaitPeriodNotYetEnded`] if
    /// `uri` is currently waiting; otherwise succeeds immediately. Never
    /// blocks.
    async fn wait(&self, uri: &str, kid: &str) -> Result<()>;

    /// Start (or restart) the back-off timer for `uri`.
    fn register_failed_attempt(&self, uri: &str, kid: &str);

    /// Cancel any outstanding timer for `uri` and remove it from the
    /// waiting set.
    fn register_successful_attempt(&self, uri: &str, kid: &str);
}

/// Default [`PenaltyBox`]: an in-memory map of URI to the instant its
/// back-off window ends. Keyed by URI only, per spec — `kid` is accepted
/// on the trait for symmetry/logging but does not affect state.
pub struct DefaultPenaltyBox {
    wait_duration: Duration,
    waiting_until: Mutex<HashMap<String, Instant>>,
}

impl DefaultPenaltyBox {
    #[must_use]
    pub fn new() -> Self {
        Self::with_wait_duration(Duration::from_secs(DEFAULT_WAIT_SECONDS))
    }

    #[must_use]
    pub fn with_wait_duration(wait_duration: Duration) -> Self {
        Self {
            wait_duration,
            waiting_until: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for DefaultPenaltyBox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PenaltyBox for DefaultPenaltyBox {
    async fn wait(&self, uri: &str, _kid: &str) -> Result<()> {
        let now = Instant::now();
        let mut waiting = self.waiting_until.lock();
        match waiting.get(uri) {
            Some(&until) if until > now => {
                Err(JwtVerifyError::WaitPeriodNotYetEnded(uri.to_string()))
            }
            _ => {
                waiting.remove(uri);
                Ok(())
            }
        }
    }

    fn register_failed_attempt(&self, uri: &str, _kid: &str) {
        let mut waiting = self.waiting_until.lock();
        waiting.insert(uri.to_string(), Instant::now() + self.wait_duration);
    }

    fn register_successful_attempt(&self, uri: &str, _kid: &str) {
        let mut waiting = self.waiting_until.lock();
        waiting.remove(uri);
    }
}
