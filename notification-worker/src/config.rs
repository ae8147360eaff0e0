//! Configuration module for environment variable parsing.
//!
//! Everything is read from environment variables. Unset or unparseable
//! numeric values fall back to defaults; required strings are checked by the
//! `validate` methods before anything is started.

use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::queue::{ConnectionParameters, DEFAULT_PORT, DEFAULT_QUEUE};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// RabbitMQ connection and consumption settings
    pub broker: ConnectionParameters,

    /// Outbound email settings
    pub mail: MailSettings,

    /// Template management API settings
    pub admin: AdminSettings,
}

/// Outbound email settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSettings {
    /// Sender address used for every notification
    pub from_address: String,

    /// AWS region for SES; `None` uses the SDK default chain
    pub region: Option<String>,
}

/// Template management API settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSettings {
    /// Port for the admin web server
    pub port: u16,

    /// Bearer token required on template routes
    pub api_token: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MailConfigError {
    #[error("MAIL_FROM must be a valid email address, got '{0}'")]
    InvalidSender(String),
}

impl MailSettings {
    pub fn validate(&self) -> Result<(), MailConfigError> {
        if is_plausible_address(&self.from_address) {
            Ok(())
        } else {
            Err(MailConfigError::InvalidSender(self.from_address.clone()))
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            broker: ConnectionParameters {
                host: env::var("RABBITMQ_HOST").unwrap_or_else(|_| "localhost".to_string()),

                queue: env::var("RABBITMQ_QUEUE").unwrap_or_else(|_| DEFAULT_QUEUE.to_string()),

                port: parse_or("RABBITMQ_PORT", DEFAULT_PORT),

                username: env::var("RABBITMQ_USERNAME").unwrap_or_default(),

                password: env::var("RABBITMQ_PASSWORD").unwrap_or_default(),

                threads: parse_or("RABBITMQ_THREADS", 1),

                prefetch: parse_or("RABBITMQ_PREFETCH_MESSAGES", 0),

                message_delay: parse_delay("RABBITMQ_MESSAGE_DELAY_MS"),
            },

            mail: MailSettings {
                from_address: env::var("MAIL_FROM").unwrap_or_default(),

                region: env::var("MAIL_REGION")
                    .or_else(|_| env::var("AWS_REGION"))
                    .ok()
                    .filter(|r| !r.trim().is_empty()),
            },

            admin: AdminSettings {
                port: parse_or("PORT", 8080),

                api_token: env::var("ADMIN_API_TOKEN")
                    .ok()
                    .filter(|t| !t.is_empty()),
            },
        }
    }
}

/// Parse a numeric variable, falling back to `default` when unset or invalid.
fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(env_var = name, value = %raw, "Invalid number, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a delay in milliseconds. Negative values mean no delay.
fn parse_delay(name: &str) -> Duration {
    let ms: i64 = parse_or(name, 0);
    Duration::from_millis(ms.max(0) as u64)
}

/// One `@` with something on both sides and a dot in the domain.
fn is_plausible_address(address: &str) -> bool {
    let address = address.trim();
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !address.contains(char::is_whitespace)
        }
        None => false,
    }
}
