//! Durable-queue publisher with lazy reconnect.
//!
//! The publisher owns at most one broker session. It connects on first use,
//! checks liveness before every publish and replaces a dead session rather
//! than repairing it. Delivery is at-most-once: a message whose publish
//! fails is dropped, and the session is re-established so the next publish
//! starts from a healthy state.
//!
//! Methods take `&mut self`; the publisher is meant to be owned by a single
//! task (the scheduled job) and is not shared.

use serde::Serialize;

use crate::broker::{Broker, BrokerError, BrokerSession};

/// Queue that weather records are published to.
pub const WEATHER_QUEUE: &str = "weather";

/// Errors from publishing.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Connecting or sending failed; the message was dropped.
    #[error("transient publish failure on queue '{queue}': {source}")]
    TransientPublishFailure {
        queue: String,
        #[source]
        source: BrokerError,
    },

    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PublishError>;

enum State<S> {
    Disconnected,
    Connected(S),
}

/// Publishes JSON messages to one durable queue.
pub struct QueuePublisher<B: Broker> {
    broker: B,
    queue: String,
    state: State<B::Session>,
}

impl<B: Broker> QueuePublisher<B> {
    /// Create a disconnected publisher. Nothing touches the network until the
    /// first `connect` or `publish`.
    pub fn new(broker: B, queue: impl Into<String>) -> Self {
        Self {
            broker,
            queue: queue.into(),
            state: State::Disconnected,
        }
    }

    /// Create a publisher around an already-open session (e.g. the one the
    /// startup connector produced). The queue is declared on it right away.
    pub async fn with_session(
        broker: B,
        queue: impl Into<String>,
        mut session: B::Session,
    ) -> Result<Self> {
        let queue = queue.into();
        if let Err(source) = session.declare_durable_queue(&queue).await {
            discard(session).await;
            return Err(PublishError::TransientPublishFailure { queue, source });
        }
        Ok(Self {
            broker,
            queue,
            state: State::Connected(session),
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Whether a session is held and still reports open.
    pub fn is_connected(&self) -> bool {
        matches!(&self.state, State::Connected(session) if session.is_open())
    }

    /// Ensure a live session with the queue declared.
    ///
    /// No-op when the held session is open. A dead session is closed and
    /// dropped before a new one is opened, so at most one is ever held.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        if let State::Connected(dead) = std::mem::replace(&mut self.state, State::Disconnected) {
            log::warn!("[Publisher] connection to {} closed, reconnecting", self.broker.endpoint());
            discard(dead).await;
        }

        let mut session = self.broker.open().await.map_err(|source| self.transient(source))?;
        if let Err(source) = session.declare_durable_queue(&self.queue).await {
            discard(session).await;
            return Err(self.transient(source));
        }

        log::info!(
            "[Publisher] connected to {}, queue '{}' declared",
            self.broker.endpoint(),
            self.queue
        );
        self.state = State::Connected(session);
        Ok(())
    }

    /// Serialize `message` to JSON and publish it persistently.
    ///
    /// On a broker error the message is dropped, the session is replaced
    /// (best effort) and `TransientPublishFailure` is returned.
    pub async fn publish<M: Serialize>(&mut self, message: &M) -> Result<()> {
        let body = serde_json::to_vec(message)?;

        self.connect().await?;

        let outcome = match &mut self.state {
            State::Connected(session) => session.publish_persistent(&self.queue, &body).await,
            State::Disconnected => Err(BrokerError::Closed),
        };

        match outcome {
            Ok(()) => {
                log::debug!(
                    "[Publisher] published {} bytes to '{}'",
                    body.len(),
                    self.queue
                );
                Ok(())
            }
            Err(source) => {
                log::error!(
                    "[Publisher] publish to '{}' failed, message dropped: {}",
                    self.queue,
                    source
                );
                self.reconnect().await;
                Err(self.transient(source))
            }
        }
    }

    /// Close the held session, if any.
    pub async fn close(&mut self) {
        if let State::Connected(session) = std::mem::replace(&mut self.state, State::Disconnected)
        {
            match session.close().await {
                Ok(()) => log::info!("[Publisher] connection closed"),
                Err(e) => log::warn!("[Publisher] error while closing connection: {}", e),
            }
        }
    }

    /// Drop the current session and open a fresh one so the next publish
    /// starts healthy. Failure is logged; the next publish retries lazily.
    async fn reconnect(&mut self) {
        if let State::Connected(session) = std::mem::replace(&mut self.state, State::Disconnected)
        {
            discard(session).await;
        }
        if let Err(e) = self.connect().await {
            log::warn!("[Publisher] reconnect failed, will retry on next publish: {}", e);
        }
    }

    fn transient(&self, source: BrokerError) -> PublishError {
        PublishError::TransientPublishFailure {
            queue: self.queue.clone(),
            source,
        }
    }
}

/// Close a session that is being replaced, ignoring errors from a
/// connection that is already gone.
async fn discard<S: BrokerSession>(session: S) {
    if let Err(e) = session.close().await {
        log::debug!("[Publisher] ignoring error while discarding connection: {}", e);
    }
}
