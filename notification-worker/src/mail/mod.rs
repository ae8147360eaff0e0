//! Outbound email: provider abstraction, payload building and dispatch.
//!
//! ## Flow
//!
//! ```text
//! UserUpdateEvent → Dispatcher → EmailClient (SES) → classify → DeliveryOutcome
//! ```

pub mod dispatcher;
pub mod outcome;
pub mod payload;
pub mod ses;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use dispatcher::Dispatcher;
pub use outcome::{classify, Classified, DeliveryOutcome, OutcomeStatus};
pub use payload::template_data;
pub use ses::SesClient;

/// A send-by-template request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEmail {
    /// Destination address
    pub to: String,
    /// Name of the stored provider template
    pub template_name: String,
    /// JSON object string substituted into the template (may be empty)
    pub template_data: String,
}

/// A stored template as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplate {
    pub template_name: String,
    pub subject: Option<String>,
    pub html: Option<String>,
    pub text: Option<String>,
}

/// Listing entry for a stored template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub template_name: String,
    /// Creation time, seconds since the Unix epoch
    pub created_at: Option<i64>,
}

/// Input for creating a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTemplate {
    pub template_name: String,
    pub subject: String,
    pub html_content: String,
}

/// A response that made it back from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse<T> {
    /// HTTP status reported by the provider
    pub status: u16,
    pub body: T,
}

impl<T> ProviderResponse<T> {
    pub fn ok(body: T) -> Self {
        Self { status: 200, body }
    }
}

/// Failures the provider reports, as a closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    AccountSuspended,
    MailFromDomainNotVerified,
    MessageRejected,
    SendingPaused,
    TooManyRequests,
    /// Anything else, with the provider's status (when known) and message
    Service { status: Option<u16>, message: String },
}

/// Result of one provider call.
pub type ProviderResult<T> = Result<ProviderResponse<T>, ProviderFailure>;

/// Outbound email collaborator.
#[async_trait]
pub trait EmailClient: Send + Sync {
    /// Send one templated email. The body is the provider message id, if any.
    async fn send_template(&self, email: &TemplateEmail) -> ProviderResult<Option<String>>;

    async fn get_template(&self, name: &str) -> ProviderResult<EmailTemplate>;

    async fn list_templates(&self) -> ProviderResult<Vec<TemplateSummary>>;

    async fn create_template(&self, template: &NewTemplate) -> ProviderResult<()>;

    async fn delete_template(&self, name: &str) -> ProviderResult<()>;

    /// Provider name for logs
    fn name(&self) -> &'static str;
}
