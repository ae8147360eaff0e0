//! AWS SES v2 email client.
//!
//! Credentials come from the AWS SDK default chain:
//! - Environment variables (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`)
//! - Web identity token / IAM roles
//! - Shared credentials file
//!
//! SES error codes are mapped onto [`ProviderFailure`] here; what they mean
//! for delivery is decided in [`classify`](super::classify).

use async_trait::async_trait;
use aws_sdk_sesv2::config::http::HttpResponse;
use aws_sdk_sesv2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sesv2::types::{Destination, EmailContent, EmailTemplateContent, Template};
use aws_sdk_sesv2::Client;
use tracing::{debug, error};

use super::{
    EmailClient, EmailTemplate, NewTemplate, ProviderFailure, ProviderResponse, ProviderResult,
    TemplateEmail, TemplateSummary,
};
use crate::config::MailSettings;

/// SES-backed [`EmailClient`].
pub struct SesClient {
    client: Client,
    from_address: String,
}

impl SesClient {
    /// Wrap an existing SES client.
    pub fn new(client: Client, from_address: impl Into<String>) -> Self {
        Self {
            client,
            from_address: from_address.into(),
        }
    }

    /// Build from mail settings and the default AWS SDK config.
    pub async fn from_settings(settings: &MailSettings) -> Self {
        let mut loader = aws_config::from_env();

        if let Some(region) = &settings.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }

        let config = loader.load().await;
        Self::new(Client::new(&config), settings.from_address.clone())
    }
}

/// Map an SDK error onto the provider failure set.
fn map_sdk_error<E>(err: SdkError<E, HttpResponse>) -> ProviderFailure
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match err.code() {
        Some("AccountSuspendedException") => ProviderFailure::AccountSuspended,
        Some("MailFromDomainNotVerifiedException") => ProviderFailure::MailFromDomainNotVerified,
        Some("MessageRejected") => ProviderFailure::MessageRejected,
        Some("SendingPausedException") => ProviderFailure::SendingPaused,
        Some("TooManyRequestsException") => ProviderFailure::TooManyRequests,
        code => {
            let status = err.raw_response().map(|r| r.status().as_u16());
            let message = err
                .message()
                .map(str::to_owned)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

            error!(
                code = ?code,
                status = ?status,
                error = %message,
                "ses_request_failed"
            );

            ProviderFailure::Service { status, message }
        }
    }
}

#[async_trait]
impl EmailClient for SesClient {
    async fn send_template(&self, email: &TemplateEmail) -> ProviderResult<Option<String>> {
        debug!(
            to = %email.to,
            template = %email.template_name,
            from = %self.from_address,
            "ses_send_email"
        );

        let template = Template::builder()
            .template_name(&email.template_name)
            .template_data(&email.template_data)
            .build();

        let output = self
            .client
            .send_email()
            .from_email_address(&self.from_address)
            .destination(Destination::builder().to_addresses(&email.to).build())
            .content(EmailContent::builder().template(template).build())
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(ProviderResponse::ok(output.message_id().map(str::to_owned)))
    }

    async fn get_template(&self, name: &str) -> ProviderResult<EmailTemplate> {
        let output = self
            .client
            .get_email_template()
            .template_name(name)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let content = output.template_content();

        Ok(ProviderResponse::ok(EmailTemplate {
            template_name: name.to_string(),
            subject: content.and_then(|c| c.subject()).map(str::to_owned),
            html: content.and_then(|c| c.html()).map(str::to_owned),
            text: content.and_then(|c| c.text()).map(str::to_owned),
        }))
    }

    async fn list_templates(&self) -> ProviderResult<Vec<TemplateSummary>> {
        let output = self
            .client
            .list_email_templates()
            .send()
            .await
            .map_err(map_sdk_error)?;

        let summaries = output
            .templates_metadata()
            .iter()
            .filter_map(|meta| {
                Some(TemplateSummary {
                    template_name: meta.template_name()?.to_string(),
                    created_at: meta.created_timestamp().map(|ts| ts.secs()),
                })
            })
            .collect();

        Ok(ProviderResponse::ok(summaries))
    }

    async fn create_template(&self, template: &NewTemplate) -> ProviderResult<()> {
        let content = EmailTemplateContent::builder()
            .subject(&template.subject)
            .html(&template.html_content)
            .build();

        self.client
            .create_email_template()
            .template_name(&template.template_name)
            .template_content(content)
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(ProviderResponse::ok(()))
    }

    async fn delete_template(&self, name: &str) -> ProviderResult<()> {
        self.client
            .delete_email_template()
            .template_name(name)
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(ProviderResponse::ok(()))
    }

    fn name(&self) -> &'static str {
        "aws-ses"
    }
}
