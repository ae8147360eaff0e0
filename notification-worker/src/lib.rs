//! Notifier - relays user-lifecycle events from RabbitMQ to templated email.
//!
//! This library provides shared modules for the two binaries:
//! - `notifier-worker`: Consumes the user-update queue and sends emails
//! - `notifier-admin`: Template management API over the email provider
//!
//! ## Architecture
//!
//! ```text
//! Account service → user_updates queue → Worker → Dispatcher → SES
//!                                                    ▲
//!                                   Admin API ───────┘ (templates)
//! ```

pub mod config;
pub mod mail;
pub mod queue;
pub mod shutdown;
pub mod web;

// Re-export commonly used types
pub use config::{AdminSettings, Config, MailSettings};
pub use mail::{DeliveryOutcome, Dispatcher, EmailClient, OutcomeStatus, SesClient};
pub use queue::{
    connect, BrokerConnection, ChangeType, ConnectionParameters, MessageConsumer,
    UserUpdateEvent, DEFAULT_QUEUE,
};
pub use web::AppState;
