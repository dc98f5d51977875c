//! Request gateway: a GET with identity headers, throttle-aware retry and
//! soft failure.
//!
//! Callers only ever see `Some(json)` or `None`. Throttling (429) and
//! transport faults are retried within the attempt budget; any other status
//! or an unparseable body ends the request immediately.

pub mod identity;
pub mod transport;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub use identity::{BearerIdentity, IdentityProvider, RotatingUserAgent};
pub use transport::{HttpTransport, RawResponse, ReqwestTransport, TransportError};

use crate::config::RetryPolicy;
use crate::pacing::sleep_or_cancel;

/// Why a single attempt did not produce JSON.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("rate limited (429)")]
    Throttled,
    #[error("request failed with status {0}")]
    Status(u16),
    #[error("failed to parse response body: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl AttemptError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled | Self::Transport(_))
    }
}

#[derive(Clone)]
pub struct RequestGateway {
    transport: Arc<dyn HttpTransport>,
    identity: Arc<dyn IdentityProvider>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RequestGateway {
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        identity: Arc<dyn IdentityProvider>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            identity,
            policy,
            cancel,
        }
    }

    /// GET `url` and parse the body as JSON.
    ///
    /// Returns `None` when the attempt budget is exhausted, on a non-retryable
    /// failure, or once the gateway's cancellation token fires.
    pub async fn request(&self, url: &str, query: &[(&str, String)]) -> Option<Value> {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                debug!(url = %url, "Request skipped, harvest cancelled");
                return None;
            }

            let err = match self.attempt(url, query).await {
                Ok(json) => return Some(json),
                Err(e) => e,
            };

            if !err.is_retryable() {
                error!(url = %url, error = %err, "Request failed");
                return None;
            }

            let wait = if matches!(err, AttemptError::Throttled) {
                warn!(
                    url = %url,
                    attempt,
                    cooldown_secs = self.policy.throttle_cooldown.as_secs(),
                    "Rate limited (429), cooling down"
                );
                self.policy.throttle_cooldown
            } else {
                error!(url = %url, attempt, error = %err, "Request exception");
                self.policy.transport_backoff
            };

            if attempt < max_attempts && !sleep_or_cancel(wait, &self.cancel).await {
                return None;
            }
        }

        warn!(url = %url, attempts = max_attempts, "Giving up after exhausting retries");
        None
    }

    async fn attempt(&self, url: &str, query: &[(&str, String)]) -> Result<Value, AttemptError> {
        let headers = self.identity.headers();
        let response = self.transport.get(url, query, headers).await?;

        match response.status {
            200 => Ok(serde_json::from_slice(&response.body)?),
            429 => Err(AttemptError::Throttled),
            status => Err(AttemptError::Status(status)),
        }
    }
}
