//! Poll-until-terminal primitive shared by every wait in the pipelines.
//!
//! Cloud resources move through transitional states on the provider side. A
//! [`StatusVocabulary`] classifies each observed status, and a [`Poller`]
//! re-queries at a fixed interval until the status leaves the transitional
//! set. Waits are bounded by the [`PollPolicy`] deadline and attempt cap and
//! can be interrupted through a [`CancelToken`].

mod cancel;
mod clock;
mod vocabulary;

use std::future::Future;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

pub use cancel::CancelToken;
pub use clock::{Clock, SleepFuture, TokioClock};
pub use vocabulary::{
    BACKUP_CREATE, BACKUP_RESTORABLE, RESTORED_VOLUME, SERVER_BUILD, SNAPSHOT_CREATE,
    SNAPSHOT_RELEASE, StatusCheck, StatusVocabulary, TEMP_VOLUME_CREATE, VOLUME_RELEASE,
    VOLUME_REMOVAL,
};

/// Interval between status queries when nothing else is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Upper bound on a single wait when nothing else is configured.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Resource that exposes a provider status string.
pub trait StatusReport {
    /// Returns the status as reported by the provider.
    fn status(&self) -> &str;
}

/// Pacing and bounds applied to every wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between consecutive queries.
    pub interval: Duration,
    /// Maximum time spent waiting for one resource.
    pub timeout: Option<Duration>,
    /// Maximum number of queries issued for one resource.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: Some(DEFAULT_WAIT_TIMEOUT),
            max_attempts: None,
        }
    }
}

impl PollPolicy {
    /// Overrides the delay between queries.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Overrides the wait deadline. `None` waits without a deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Caps the number of queries per wait.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Errors surfaced while waiting on a resource.
#[derive(Debug, Error)]
pub enum PollError<E>
where
    E: std::error::Error + 'static,
{
    /// The resource reached a declared failure status.
    #[error("{resource} {id} entered failure status {status}")]
    Failed {
        /// Resource label.
        resource: String,
        /// Provider identifier.
        id: String,
        /// Observed status.
        status: String,
    },
    /// The resource reported a status outside its vocabulary.
    #[error("{resource} {id} reported unexpected status {status}")]
    Unexpected {
        /// Resource label.
        resource: String,
        /// Provider identifier.
        id: String,
        /// Observed status.
        status: String,
    },
    /// The wait deadline passed while the resource was still transitioning.
    #[error("timed out after {elapsed:?} waiting for {resource} {id} (last status {last_status})")]
    Timeout {
        /// Resource label.
        resource: String,
        /// Provider identifier.
        id: String,
        /// Last observed status.
        last_status: String,
        /// Time spent waiting.
        elapsed: Duration,
    },
    /// The attempt cap was reached while the resource was still transitioning.
    #[error("{resource} {id} still {last_status} after {attempts} queries")]
    AttemptsExhausted {
        /// Resource label.
        resource: String,
        /// Provider identifier.
        id: String,
        /// Last observed status.
        last_status: String,
        /// Queries issued.
        attempts: u32,
    },
    /// The wait was interrupted through the cancel token.
    #[error("cancelled while waiting for {resource} {id}")]
    Cancelled {
        /// Resource label.
        resource: String,
        /// Provider identifier.
        id: String,
    },
    /// Querying the resource failed.
    #[error("failed to query {resource} {id}: {source}")]
    Fetch {
        /// Resource label.
        resource: String,
        /// Provider identifier.
        id: String,
        /// Underlying provider error.
        #[source]
        source: E,
    },
}

impl<E> PollError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns the provider error when the failure came from a query.
    #[must_use]
    pub const fn fetch_source(&self) -> Option<&E> {
        match self {
            Self::Fetch { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Re-queries a resource until its status leaves the transitional set.
#[derive(Clone, Debug)]
pub struct Poller<K = TokioClock> {
    policy: PollPolicy,
    clock: K,
    cancel: CancelToken,
}

impl Poller<TokioClock> {
    /// Creates a poller driven by the Tokio timer.
    #[must_use]
    pub fn new(policy: PollPolicy) -> Self {
        Self::with_clock(policy, TokioClock)
    }
}

impl<K: Clock> Poller<K> {
    /// Creates a poller driven by `clock`.
    #[must_use]
    pub fn with_clock(policy: PollPolicy, clock: K) -> Self {
        Self {
            policy,
            clock,
            cancel: CancelToken::new(),
        }
    }

    /// Replaces the cancel token observed by every wait.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the active policy.
    #[must_use]
    pub const fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Returns the token that interrupts waits issued by this poller.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Queries `fetch` until the resource reaches a terminal status.
    ///
    /// Returns the resource as observed in its success status.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Failed`] or [`PollError::Unexpected`] for a
    /// terminal non-success status, [`PollError::Timeout`] or
    /// [`PollError::AttemptsExhausted`] when the policy bounds are hit,
    /// [`PollError::Cancelled`] when the cancel token fires and
    /// [`PollError::Fetch`] when a query fails.
    pub async fn wait_for<T, E, F, Fut>(
        &self,
        vocabulary: &StatusVocabulary,
        id: &str,
        mut fetch: F,
    ) -> Result<T, PollError<E>>
    where
        T: StatusReport,
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = self.clock.now();
        let mut attempts = 0_u32;
        loop {
            self.check_cancelled(vocabulary, id)?;
            attempts = attempts.saturating_add(1);
            let resource = fetch().await.map_err(|source| PollError::Fetch {
                resource: vocabulary.resource.to_owned(),
                id: id.to_owned(),
                source,
            })?;
            let status = resource.status();
            debug!(
                resource = vocabulary.resource,
                id,
                status,
                attempt = attempts,
                "polled resource status"
            );
            match vocabulary.classify(status) {
                StatusCheck::Ready => return Ok(resource),
                StatusCheck::Failed => {
                    return Err(PollError::Failed {
                        resource: vocabulary.resource.to_owned(),
                        id: id.to_owned(),
                        status: status.to_owned(),
                    });
                }
                StatusCheck::Unexpected => {
                    return Err(PollError::Unexpected {
                        resource: vocabulary.resource.to_owned(),
                        id: id.to_owned(),
                        status: status.to_owned(),
                    });
                }
                StatusCheck::Pending => {
                    let last_status = status.to_owned();
                    self.pace(vocabulary, id, started, attempts, &last_status)
                        .await?;
                }
            }
        }
    }

    /// Queries `fetch` until it reports the resource as absent (`Ok(None)`).
    ///
    /// Any status in the vocabulary's failure set aborts the wait; every
    /// other status is treated as "still present".
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Failed`] for a failure status and the same bound,
    /// cancellation and query errors as [`Poller::wait_for`].
    pub async fn wait_until_gone<T, E, F, Fut>(
        &self,
        vocabulary: &StatusVocabulary,
        id: &str,
        mut fetch: F,
    ) -> Result<(), PollError<E>>
    where
        T: StatusReport,
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let started = self.clock.now();
        let mut attempts = 0_u32;
        loop {
            self.check_cancelled(vocabulary, id)?;
            attempts = attempts.saturating_add(1);
            let observed = fetch().await.map_err(|source| PollError::Fetch {
                resource: vocabulary.resource.to_owned(),
                id: id.to_owned(),
                source,
            })?;
            let Some(resource) = observed else {
                debug!(resource = vocabulary.resource, id, "resource is gone");
                return Ok(());
            };
            let status = resource.status().to_owned();
            if vocabulary.classify(&status) == StatusCheck::Failed {
                return Err(PollError::Failed {
                    resource: vocabulary.resource.to_owned(),
                    id: id.to_owned(),
                    status,
                });
            }
            self.pace(vocabulary, id, started, attempts, &status).await?;
        }
    }

    fn check_cancelled<E>(&self, vocabulary: &StatusVocabulary, id: &str) -> Result<(), PollError<E>>
    where
        E: std::error::Error + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(PollError::Cancelled {
                resource: vocabulary.resource.to_owned(),
                id: id.to_owned(),
            });
        }
        Ok(())
    }

    async fn pace<E>(
        &self,
        vocabulary: &StatusVocabulary,
        id: &str,
        started: Instant,
        attempts: u32,
        last_status: &str,
    ) -> Result<(), PollError<E>>
    where
        E: std::error::Error + 'static,
    {
        if self
            .policy
            .max_attempts
            .is_some_and(|limit| attempts >= limit)
        {
            return Err(PollError::AttemptsExhausted {
                resource: vocabulary.resource.to_owned(),
                id: id.to_owned(),
                last_status: last_status.to_owned(),
                attempts,
            });
        }
        let elapsed = self.clock.now().saturating_duration_since(started);
        if self.policy.timeout.is_some_and(|limit| elapsed >= limit) {
            return Err(PollError::Timeout {
                resource: vocabulary.resource.to_owned(),
                id: id.to_owned(),
                last_status: last_status.to_owned(),
                elapsed,
            });
        }
        // Never sleep past the deadline.
        let pause = self.policy.timeout.map_or(self.policy.interval, |limit| {
            self.policy.interval.min(limit.saturating_sub(elapsed))
        });
        tokio::select! {
            () = self.clock.sleep(pause) => Ok(()),
            () = self.cancel.cancelled() => Err(PollError::Cancelled {
                resource: vocabulary.resource.to_owned(),
                id: id.to_owned(),
            }),
        }
    }
}
