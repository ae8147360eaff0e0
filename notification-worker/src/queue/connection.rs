//! Broker connection setup and teardown.
//!
//! [`connect`] validates a [`ConnectionParameters`] value, opens one
//! connection and one channel, applies QoS and declares the queue. The
//! returned [`BrokerConnection`] is long-lived and closed exactly once.

use std::time::Duration;

use lapin::{
    options::{BasicQosOptions, QueueDeclareOptions},
    types::FieldTable,
    uri::{AMQPAuthority, AMQPUri, AMQPUserInfo},
    Channel, Connection, ConnectionProperties,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default AMQP port.
pub const DEFAULT_PORT: i32 = 5672;

/// Everything needed to reach the broker and consume from one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    pub host: String,
    pub queue: String,
    pub username: String,
    pub password: String,
    pub port: i32,
    /// Maximum number of deliveries processed at once
    pub threads: u16,
    /// Maximum unacknowledged deliveries on the channel (0 = unlimited)
    pub prefetch: u16,
    /// Pause taken by a delivery task after it acks or nacks
    pub message_delay: Duration,
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            queue: super::DEFAULT_QUEUE.to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
            port: DEFAULT_PORT,
            threads: 1,
            prefetch: 0,
            message_delay: Duration::ZERO,
        }
    }
}

/// Invalid connection parameters. Raised before any network I/O.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("host must be specified")]
    MissingHost,

    #[error("queue name must be specified")]
    MissingQueue,

    #[error("port must be a valid TCP port number (1-65535), got {0}")]
    InvalidPort(i32),

    #[error("username must be specified")]
    MissingUsername,

    #[error("password must be specified")]
    MissingPassword,

    #[error("thread count must be at least 1")]
    InvalidThreads,
}

/// Failure while establishing the broker connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to connect to RabbitMQ: {0}")]
    Connect(#[source] lapin::Error),

    #[error("failed to create channel: {0}")]
    Channel(#[source] lapin::Error),

    #[error("failed to set QoS: {0}")]
    Qos(#[source] lapin::Error),

    #[error("failed to declare queue '{queue}': {source}")]
    Declare {
        queue: String,
        #[source]
        source: lapin::Error,
    },
}

impl ConnectionParameters {
    /// Check every field. Nothing is sent over the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if self.queue.trim().is_empty() {
            return Err(ConfigError::MissingQueue);
        }
        if !(1..=65535).contains(&self.port) {
            return Err(ConfigError::InvalidPort(self.port));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::MissingUsername);
        }
        if self.password.trim().is_empty() {
            return Err(ConfigError::MissingPassword);
        }
        if self.threads == 0 {
            return Err(ConfigError::InvalidThreads);
        }
        Ok(())
    }

    /// AMQP URI for the default virtual host.
    ///
    /// Only meaningful after [`validate`](Self::validate) succeeded.
    pub fn amqp_uri(&self) -> AMQPUri {
        AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.username.clone(),
                    password: self.password.clone(),
                },
                host: self.host.trim().to_string(),
                port: self.port as u16,
            },
            vhost: "/".to_string(),
            ..Default::default()
        }
    }

    /// QoS applied to the channel: per-channel prefetch, never global.
    pub fn qos_options(&self) -> (u16, BasicQosOptions) {
        (self.prefetch, BasicQosOptions { global: false })
    }
}

/// Declaration options for the consumed queue.
pub fn queue_declare_options() -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: true,
        exclusive: false,
        auto_delete: false,
        ..Default::default()
    }
}

/// An open connection plus the single channel derived from it.
pub struct BrokerConnection {
    connection: Connection,
    channel: Channel,
    queue: String,
}

impl BrokerConnection {
    /// Channel used for consuming, acking and nacking.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Name of the declared queue.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Close the channel, then the connection.
    ///
    /// Either one may already be gone (broker-initiated close, network loss);
    /// that is logged and otherwise ignored.
    pub async fn close(self) {
        if self.channel.status().connected() {
            if let Err(e) = self.channel.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        } else {
            debug!("rabbitmq_channel_already_closed");
        }

        if self.connection.status().connected() {
            if let Err(e) = self.connection.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
        } else {
            debug!("rabbitmq_connection_already_closed");
        }

        info!(queue = %self.queue, "rabbitmq_connection_closed");
    }
}

/// Validate the parameters and bring up a ready-to-consume connection.
///
/// There is no retry here: a failure is returned to the caller, which
/// decides whether startup is aborted.
pub async fn connect(params: &ConnectionParameters) -> Result<BrokerConnection, ConnectionError> {
    params.validate()?;

    info!(
        host = %params.host,
        port = params.port,
        queue = %params.queue,
        "rabbitmq_connecting"
    );

    let connection = Connection::connect_uri(params.amqp_uri(), ConnectionProperties::default())
        .await
        .map_err(ConnectionError::Connect)?;

    info!("rabbitmq_connected");

    let channel = connection
        .create_channel()
        .await
        .map_err(ConnectionError::Channel)?;

    info!(channel_id = channel.id(), "rabbitmq_channel_created");

    let (prefetch_count, qos) = params.qos_options();
    channel
        .basic_qos(prefetch_count, qos)
        .await
        .map_err(ConnectionError::Qos)?;

    info!(prefetch_count = prefetch_count, "rabbitmq_qos_set");

    channel
        .queue_declare(&params.queue, queue_declare_options(), FieldTable::default())
        .await
        .map_err(|source| ConnectionError::Declare {
            queue: params.queue.clone(),
            source,
        })?;

    info!(queue = %params.queue, "rabbitmq_queue_declared");

    Ok(BrokerConnection {
        connection,
        channel,
        queue: params.queue.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ConnectionParameters {
        ConnectionParameters {
            host: "rabbit.internal".to_string(),
            queue: "user_updates".to_string(),
            username: "svc".to_string(),
            password: "s3cret".to_string(),
            port: 5672,
            threads: 4,
            prefetch: 10,
            message_delay: Duration::from_millis(250),
        }
    }

    #[test]
    fn test_validate_accepts_valid_parameters() {
        assert_eq!(valid().validate(), Ok(()));
        assert_eq!(ConnectionParameters::default().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        let mut params = valid();
        params.host = "   ".to_string();
        assert_eq!(params.validate(), Err(ConfigError::MissingHost));

        let mut params = valid();
        params.queue = String::new();
        assert_eq!(params.validate(), Err(ConfigError::MissingQueue));

        let mut params = valid();
        params.username = String::new();
        assert_eq!(params.validate(), Err(ConfigError::MissingUsername));

        let mut params = valid();
        params.password = String::new();
        assert_eq!(params.validate(), Err(ConfigError::MissingPassword));

        let mut params = valid();
        params.threads = 0;
        assert_eq!(params.validate(), Err(ConfigError::InvalidThreads));
    }

    #[test]
    fn test_validate_port_range() {
        for port in [0, -1, 65536, 100_000] {
            let mut params = valid();
            params.port = port;
            assert_eq!(params.validate(), Err(ConfigError::InvalidPort(port)));
        }

        for port in [1, 65535] {
            let mut params = valid();
            params.port = port;
            assert!(params.validate().is_ok());
        }
    }

    #[tokio::test]
    async fn test_connect_fails_closed_on_invalid_parameters() {
        let mut params = valid();
        params.host = String::new();

        let result = connect(&params).await;
        assert!(matches!(
            result,
            Err(ConnectionError::Config(ConfigError::MissingHost))
        ));
    }

    #[test]
    fn test_amqp_uri() {
        let uri = valid().amqp_uri();
        assert_eq!(uri.authority.host, "rabbit.internal");
        assert_eq!(uri.authority.port, 5672);
        assert_eq!(uri.authority.userinfo.username, "svc");
        assert_eq!(uri.authority.userinfo.password, "s3cret");
        assert_eq!(uri.vhost, "/");
    }

    #[test]
    fn test_qos_is_per_channel() {
        let (prefetch, options) = valid().qos_options();
        assert_eq!(prefetch, 10);
        assert!(!options.global);
    }

    #[test]
    fn test_queue_declared_durable_shared_persistent() {
        let options = queue_declare_options();
        assert!(options.durable);
        assert!(!options.exclusive);
        assert!(!options.auto_delete);
        assert!(!options.passive);
    }
}
