//! Dispatch of user-update events to the email provider.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::outcome::{classify, DeliveryOutcome, OutcomeStatus};
use super::payload::template_data;
use super::{EmailClient, TemplateEmail};
use crate::queue::UserUpdateEvent;

/// Turns events into templated sends and classifies what came back.
#[derive(Clone)]
pub struct Dispatcher {
    client: Arc<dyn EmailClient>,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn EmailClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn EmailClient> {
        &self.client
    }

    /// Build the provider request for an event.
    pub fn build_request(event: &UserUpdateEvent) -> serde_json::Result<TemplateEmail> {
        Ok(TemplateEmail {
            to: event.recipient.clone(),
            template_name: event.change_type.template_name().to_string(),
            template_data: template_data(event)?,
        })
    }

    /// Send the email for `event` and classify the result.
    pub async fn dispatch(&self, event: &UserUpdateEvent) -> DeliveryOutcome {
        let request = match Self::build_request(event) {
            Ok(request) => request,
            Err(e) => {
                error!(
                    change_type = %event.change_type,
                    error = %e,
                    "dispatch_payload_failed"
                );
                return DeliveryOutcome::failure(
                    OutcomeStatus::ServerError,
                    500,
                    format!("An error occurred: {}", e),
                );
            }
        };

        if request.template_data.is_empty() {
            warn!(
                change_type = %event.change_type,
                "dispatch_empty_template_data"
            );
        }

        info!(
            provider = self.client.name(),
            to = %request.to,
            template = %request.template_name,
            "dispatch_sending"
        );

        let classified = classify(self.client.send_template(&request).await);

        if classified.outcome.is_success() {
            info!(
                provider = self.client.name(),
                template = %request.template_name,
                provider_message_id = ?classified.body.flatten(),
                "dispatch_sent"
            );
        } else {
            warn!(
                provider = self.client.name(),
                template = %request.template_name,
                outcome = %classified.outcome.status,
                code = classified.outcome.code,
                detail = ?classified.outcome.detail,
                "dispatch_failed"
            );
        }

        classified.outcome
    }
}
