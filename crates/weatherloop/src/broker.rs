//! Message broker seam.
//!
//! The connector and the queue publisher talk to RabbitMQ through the
//! `Broker` / `BrokerSession` traits instead of `lapin` directly, which keeps
//! both testable against the in-memory mock below.

use std::future::Future;

use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::AMQPUri;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

use crate::config::BrokerSettings;

/// AMQP delivery mode that survives a broker restart.
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Heartbeat negotiated with the broker, in seconds.
const HEARTBEAT_SECS: u16 = 600;

/// Errors from broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("connection is closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Something that can open sessions (connection + channel) to a broker.
pub trait Broker: Send + Sync + 'static {
    type Session: BrokerSession;

    /// Human-readable endpoint descriptor, used in logs and errors.
    fn endpoint(&self) -> String;

    /// Open a new connection and a channel on it.
    fn open(&self) -> impl Future<Output = BrokerResult<Self::Session>> + Send;
}

/// A live connection plus channel.
pub trait BrokerSession: Send + 'static {
    /// Whether the underlying connection and channel still report open.
    fn is_open(&self) -> bool;

    fn declare_durable_queue(
        &mut self,
        queue: &str,
    ) -> impl Future<Output = BrokerResult<()>> + Send;

    /// Publish `body` on the default exchange with `queue` as routing key,
    /// marked persistent.
    fn publish_persistent(
        &mut self,
        queue: &str,
        body: &[u8],
    ) -> impl Future<Output = BrokerResult<()>> + Send;

    fn close(self) -> impl Future<Output = BrokerResult<()>> + Send;
}

// ── RabbitMQ implementation ──────────────────────────────────────────────

/// RabbitMQ broker reached through `lapin`.
#[derive(Debug, Clone)]
pub struct AmqpBroker {
    uri: AMQPUri,
}

impl AmqpBroker {
    pub fn new(settings: &BrokerSettings) -> Self {
        let mut uri = AMQPUri::default();
        uri.authority.host = settings.host.clone();
        uri.authority.userinfo.username = settings.user.clone();
        uri.authority.userinfo.password = settings.password.clone();
        uri.query.heartbeat = Some(HEARTBEAT_SECS);
        Self { uri }
    }
}

impl Broker for AmqpBroker {
    type Session = AmqpSession;

    fn endpoint(&self) -> String {
        format!(
            "amqp://{}@{}:{}",
            self.uri.authority.userinfo.username, self.uri.authority.host, self.uri.authority.port
        )
    }

    async fn open(&self) -> BrokerResult<AmqpSession> {
        let connection =
            Connection::connect_uri(self.uri.clone(), ConnectionProperties::default()).await?;
        let conn = &connection;
        let channel = close_on_error(conn.create_channel().await, move || async move {
            if let Err(e) = conn.close(200, "channel setup failed").await {
                log::debug!("[Broker] ignoring error while closing half-open connection: {}", e);
            }
        })
        .await?;
        Ok(AmqpSession {
            connection,
            channel,
        })
    }
}

/// Run `cleanup` before handing back a failed step, so a connection whose
/// channel could not be set up is not left open.
async fn close_on_error<T, F>(
    result: lapin::Result<T>,
    cleanup: impl FnOnce() -> F,
) -> BrokerResult<T>
where
    F: Future<Output = ()>,
{
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            cleanup().await;
            Err(e.into())
        }
    }
}

/// An open RabbitMQ connection with one channel.
pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
}

impl BrokerSession for AmqpSession {
    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn declare_durable_queue(&mut self, queue: &str) -> BrokerResult<()> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn publish_persistent(&mut self, queue: &str, body: &[u8]) -> BrokerResult<()> {
        if !self.is_open() {
            return Err(BrokerError::Closed);
        }
        let confirm = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_delivery_mode(PERSISTENT_DELIVERY_MODE),
            )
            .await?;
        confirm.await?;
        Ok(())
    }

    async fn close(self) -> BrokerResult<()> {
        if self.connection.status().connected() {
            self.connection.close(200, "closing").await?;
        }
        Ok(())
    }
}

// ── MockBroker for testing ───────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn failed_channel_setup_closes_connection() {
        let closed = AtomicBool::new(false);
        let flag = &closed;

        let result: BrokerResult<()> =
            close_on_error(Err(lapin::Error::ChannelsLimitReached), move || async move {
                flag.store(true, Ordering::SeqCst);
            })
            .await;

        assert!(matches!(result, Err(BrokerError::Amqp(_))));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn successful_channel_setup_keeps_connection() {
        let closed = AtomicBool::new(false);
        let flag = &closed;

        let result = close_on_error(Ok(7u16), move || async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert!(!closed.load(Ordering::SeqCst));
    }

    #[test]
    fn amqp_broker_uses_settings() {
        let broker = AmqpBroker::new(&BrokerSettings {
            host: "rabbitmq".to_string(),
            user: "guest".to_string(),
            password: "secret".to_string(),
        });
        assert_eq!(broker.uri.authority.host, "rabbitmq");
        assert_eq!(broker.uri.authority.port, 5672);
        assert_eq!(broker.uri.query.heartbeat, Some(HEARTBEAT_SECS));
        assert_eq!(broker.endpoint(), "amqp://guest@rabbitmq:5672");
    }

    #[test]
    fn endpoint_does_not_leak_password() {
        let broker = AmqpBroker::new(&BrokerSettings {
            host: "localhost".to_string(),
            user: "admin".to_string(),
            password: "hunter2".to_string(),
        });
        assert!(!broker.endpoint().contains("hunter2"));
    }
}
