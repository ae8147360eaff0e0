//! Queue module for RabbitMQ operations.
//!
//! This module provides:
//! - The user-update message type and its wire format
//! - Connection setup and teardown
//! - The manual-ack consumer that feeds the dispatcher
//!
//! ## Architecture
//!
//! ```text
//! user_updates queue → MessageConsumer → Dispatcher → SES
//!         ▲                  │
//!         └──── ack / nack ──┘
//! ```

pub mod connection;
pub mod consumer;
pub mod types;

pub use connection::{
    connect, queue_declare_options, BrokerConnection, ConfigError, ConnectionError,
    ConnectionParameters, DEFAULT_PORT,
};
pub use consumer::{
    Acknowledger, ConsumerError, ConsumerSettings, ConsumerState, Disposition, MessageConsumer,
    RunSummary, SequenceCounter,
};
pub use types::{ChangeType, DecodeError, InboundMessage, UserUpdateEvent, DEFAULT_QUEUE};
