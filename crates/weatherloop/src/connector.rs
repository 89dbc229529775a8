//! Startup connections to external dependencies.
//!
//! Containers come up in no particular order, so both the broker and the
//! search store are retried before startup gives up:
//!
//! - the broker client reports failure synchronously, so a fixed delay
//!   between attempts is enough (`FixedDelay`, ~50s worst case by default);
//! - the search store may accept connections before it can serve, so every
//!   attempt is followed by a ping and failures back off exponentially up to
//!   a cap (`ExponentialBackoff`).
//!
//! Running out of attempts is fatal: the caller aborts startup.

use std::fmt::Display;
use std::time::Duration;

use crate::broker::Broker;
use crate::search::SearchStore;

/// Errors from connecting to dependencies.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("{dependency} unavailable at {endpoint} after {attempts} attempts: {last_error}")]
    DependencyUnavailable {
        dependency: &'static str,
        endpoint: String,
        attempts: u32,
        last_error: String,
    },
}

pub type Result<T> = std::result::Result<T, ConnectError>;

// ── Backoff policies ─────────────────────────────────────────────────────

/// Retry policy with the same pause after every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self {
            max_retries: 10,
            delay: Duration::from_secs(5),
        }
    }
}

/// Retry policy whose pause doubles after every failure, up to `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_retries: 100,
            initial_delay: Duration::from_secs(20),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ExponentialBackoff {
    /// Pause before the `retry`-th retry (1-based):
    /// `min(initial_delay * 2^(retry - 1), max_delay)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

// ── Attempt bookkeeping ──────────────────────────────────────────────────

/// State of one connect call. Lives until success or exhaustion.
struct AttemptState {
    dependency: &'static str,
    endpoint: String,
    attempt: u32,
    max_retries: u32,
    /// Attempt numbers that failed, one per logged failure.
    failed_attempts: Vec<u32>,
    last_error: Option<String>,
}

impl AttemptState {
    fn new(dependency: &'static str, endpoint: String, max_retries: u32) -> Self {
        Self {
            dependency,
            endpoint,
            attempt: 0,
            max_retries,
            failed_attempts: Vec::new(),
            last_error: None,
        }
    }

    /// Advance to the next attempt; `false` once retries are used up.
    fn start_next(&mut self) -> bool {
        if self.attempt >= self.max_retries {
            return false;
        }
        self.attempt += 1;
        true
    }

    fn has_remaining(&self) -> bool {
        self.attempt < self.max_retries
    }

    fn record_failure(&mut self, error: impl Display) {
        log::error!(
            "[Connector] {} connection failed (attempt {}/{}): {}",
            self.dependency,
            self.attempt,
            self.max_retries,
            error
        );
        self.failed_attempts.push(self.attempt);
        self.last_error = Some(error.to_string());
    }

    fn succeeded(&self) {
        log::info!(
            "[Connector] connected to {} at {} (attempt {}/{}, {} failed)",
            self.dependency,
            self.endpoint,
            self.attempt,
            self.max_retries,
            self.failed_attempts.len()
        );
    }

    fn into_error(self) -> ConnectError {
        ConnectError::DependencyUnavailable {
            dependency: self.dependency,
            endpoint: self.endpoint,
            attempts: self.attempt,
            last_error: self
                .last_error
                .unwrap_or_else(|| "no connection attempts were made".to_string()),
        }
    }
}

// ── Connect loops ────────────────────────────────────────────────────────

/// Connect to the broker, retrying with a fixed delay.
///
/// Makes at most `policy.max_retries` attempts and does not sleep after the
/// last one.
pub async fn connect_broker<B: Broker>(broker: &B, policy: &FixedDelay) -> Result<B::Session> {
    let mut state = AttemptState::new("RabbitMQ", broker.endpoint(), policy.max_retries);
    match open_with_retries(broker, policy, &mut state).await {
        Some(session) => Ok(session),
        None => Err(state.into_error()),
    }
}

async fn open_with_retries<B: Broker>(
    broker: &B,
    policy: &FixedDelay,
    state: &mut AttemptState,
) -> Option<B::Session> {
    while state.start_next() {
        match broker.open().await {
            Ok(session) => {
                state.succeeded();
                return Some(session);
            }
            Err(e) => state.record_failure(e),
        }
        if state.has_remaining() {
            tokio::time::sleep(policy.delay).await;
        }
    }
    None
}

/// Connect to the search store and wait until it answers a ping, backing
/// off exponentially between attempts.
pub async fn connect_search_store<S: SearchStore>(
    store: &S,
    policy: &ExponentialBackoff,
) -> Result<S::Client> {
    let mut state = AttemptState::new("Elasticsearch", store.endpoint(), policy.max_retries);

    while state.start_next() {
        match store.connect().await {
            Ok(client) => match store.ping(&client).await {
                Ok(true) => {
                    state.succeeded();
                    return Ok(client);
                }
                Ok(false) => state.record_failure("ping failed, store not ready"),
                Err(e) => state.record_failure(e),
            },
            Err(e) => state.record_failure(e),
        }
        if state.has_remaining() {
            let delay = policy.delay_for(state.attempt);
            log::info!(
                "[Connector] retrying {} in {}s",
                state.dependency,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
        }
    }

    Err(state.into_error())
}
