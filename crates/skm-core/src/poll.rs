//! Bounded polling for reads that lag a prior write.

use crate::context::{ContextError, RunContext};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// The value is available
    Ready(T),
    /// Not visible yet; try again after the interval
    NotYet,
}

/// How often and how many times to probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Wait between attempts
    #[serde(rename = "interval_ms", with = "duration_millis")]
    pub interval: Duration,
    /// Maximum number of probes (at least 1)
    pub max_attempts: u32,
}

impl PollPolicy {
    /// Create new policy; `max_attempts` is clamped to at least 1
    #[inline]
    #[must_use]
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Upper bound on time spent waiting between attempts
    #[inline]
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 10)
    }
}

/// A value obtained by polling, with the number of probes it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polled<T> {
    /// The value
    pub value: T,
    /// Probes made, including the successful one
    pub attempts: u32,
}

/// Why polling stopped without a value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError<E> {
    /// Every attempt reported [`Probe::NotYet`]
    #[error("not available after {attempts} attempts")]
    Exhausted {
        /// Probes made
        attempts: u32,
    },

    /// A probe failed with a non-retryable error
    #[error("attempt {attempt} failed: {error}")]
    Failed {
        /// Attempt number (1-based)
        attempt: u32,
        /// The error
        error: E,
    },

    /// The run was cancelled or ran out of time while waiting
    #[error("polling interrupted: {0}")]
    Interrupted(ContextError),
}

/// Probe until ready, a hard error, or the attempt budget runs out.
///
/// `probe` receives the 1-based attempt number. Only [`Probe::NotYet`] is
/// retried; an `Err` returns immediately. Waits go through `ctx`, so a
/// cancelled or expired run stops polling at the next suspend point.
pub async fn poll_until<T, E, F, Fut>(
    ctx: &RunContext,
    policy: PollPolicy,
    mut probe: F,
) -> Result<Polled<T>, PollError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Probe<T>, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        ctx.check().map_err(PollError::Interrupted)?;

        match probe(attempt).await {
            Ok(Probe::Ready(value)) => return Ok(Polled { value, attempts: attempt }),
            Ok(Probe::NotYet) => {
                tracing::debug!(attempt, max_attempts, "not yet available");
            }
            Err(error) => return Err(PollError::Failed { attempt, error }),
        }

        if attempt < max_attempts {
            ctx.sleep(policy.interval)
                .await
                .map_err(PollError::Interrupted)?;
        }
    }

    Err(PollError::Exhausted {
        attempts: max_attempts,
    })
}

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(crate) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
