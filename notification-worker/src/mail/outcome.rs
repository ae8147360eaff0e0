//! Classification of provider results into a uniform outcome.
//!
//! This is the only place that decides what a provider failure means. The
//! consumer only asks [`DeliveryOutcome::is_success`].

use std::fmt;

use serde::Serialize;

use super::{ProviderFailure, ProviderResult};

pub const SUSPENDED_DETAIL: &str =
    "The account's ability to send email has been permanently restricted";
pub const DOMAIN_NOT_VERIFIED_DETAIL: &str = "The sending domain is not verified";
pub const MESSAGE_REJECTED_DETAIL: &str = "The message content is invalid";
pub const SENDING_PAUSED_DETAIL: &str = "The account's ability to send email is currently paused";
pub const TOO_MANY_REQUESTS_DETAIL: &str = "Too many requests were made. Please try again later";
pub const INVALID_TOKEN_DETAIL: &str = "Invalid security token";
pub const INTERNAL_ERROR_DETAIL: &str = "Internal Server Error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    ClientError,
    ServerError,
    RateLimited,
    Forbidden,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::ClientError => "client_error",
            OutcomeStatus::ServerError => "server_error",
            OutcomeStatus::RateLimited => "rate_limited",
            OutcomeStatus::Forbidden => "forbidden",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified result of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub status: OutcomeStatus,
    /// HTTP-like status code associated with the outcome
    pub code: u16,
    /// Human-readable error detail; `None` only on success
    pub detail: Option<String>,
}

impl DeliveryOutcome {
    pub fn success(code: u16) -> Self {
        Self {
            status: OutcomeStatus::Success,
            code,
            detail: None,
        }
    }

    pub fn failure(status: OutcomeStatus, code: u16, detail: impl Into<String>) -> Self {
        Self {
            status,
            code,
            detail: Some(detail.into()),
        }
    }

    /// True when the message may be acknowledged.
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success && self.detail.is_none()
    }
}

/// An outcome plus the provider body, when there was one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified<T> {
    pub outcome: DeliveryOutcome,
    pub body: Option<T>,
}

/// Classify a provider result. First matching rule wins.
pub fn classify<T>(result: ProviderResult<T>) -> Classified<T> {
    match result {
        Ok(response) if (200..300).contains(&response.status) => Classified {
            outcome: DeliveryOutcome::success(response.status),
            body: Some(response.body),
        },
        Ok(response) => Classified {
            outcome: DeliveryOutcome::failure(
                OutcomeStatus::ServerError,
                response.status,
                INTERNAL_ERROR_DETAIL,
            ),
            body: Some(response.body),
        },
        Err(failure) => Classified {
            outcome: classify_failure(failure),
            body: None,
        },
    }
}

fn classify_failure(failure: ProviderFailure) -> DeliveryOutcome {
    match failure {
        ProviderFailure::AccountSuspended => {
            DeliveryOutcome::failure(OutcomeStatus::Forbidden, 403, SUSPENDED_DETAIL)
        }
        ProviderFailure::MailFromDomainNotVerified => {
            DeliveryOutcome::failure(OutcomeStatus::ClientError, 400, DOMAIN_NOT_VERIFIED_DETAIL)
        }
        ProviderFailure::MessageRejected => {
            DeliveryOutcome::failure(OutcomeStatus::ClientError, 400, MESSAGE_REJECTED_DETAIL)
        }
        ProviderFailure::SendingPaused => {
            DeliveryOutcome::failure(OutcomeStatus::Forbidden, 403, SENDING_PAUSED_DETAIL)
        }
        ProviderFailure::TooManyRequests => {
            DeliveryOutcome::failure(OutcomeStatus::RateLimited, 429, TOO_MANY_REQUESTS_DETAIL)
        }
        ProviderFailure::Service {
            status: Some(code @ (401 | 403)),
            ..
        } => DeliveryOutcome::failure(OutcomeStatus::Forbidden, code, INVALID_TOKEN_DETAIL),
        ProviderFailure::Service { status, message } => DeliveryOutcome::failure(
            OutcomeStatus::ServerError,
            status.unwrap_or(500),
            format!("An error occurred: {}", message),
        ),
    }
}
