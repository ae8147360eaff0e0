//! In-memory email client for tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{
    EmailClient, EmailTemplate, NewTemplate, ProviderFailure, ProviderResponse, ProviderResult,
    TemplateEmail, TemplateSummary,
};

/// Shared, ordered record of calls made against test doubles.
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

pub(crate) struct MockEmailClient {
    sent: Mutex<Vec<TemplateEmail>>,
    templates: Mutex<BTreeMap<String, EmailTemplate>>,
    failure: Option<ProviderFailure>,
    status: u16,
    panic_on_send: bool,
    journal: Option<Journal>,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl MockEmailClient {
    pub(crate) fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            templates: Mutex::new(BTreeMap::new()),
            failure: None,
            status: 200,
            panic_on_send: false,
            journal: None,
            gate: None,
        }
    }

    /// Every call fails with `failure`.
    pub(crate) fn failing(failure: ProviderFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::new()
        }
    }

    /// Calls succeed at the transport level with `status`.
    pub(crate) fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub(crate) fn panicking() -> Self {
        Self {
            panic_on_send: true,
            ..Self::new()
        }
    }

    pub(crate) fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Sends notify `started`, then wait for `release`.
    pub(crate) fn gated(mut self, started: Arc<Notify>, release: Arc<Notify>) -> Self {
        self.gate = Some((started, release));
        self
    }

    pub(crate) fn with_template(self, template: EmailTemplate) -> Self {
        self.templates
            .lock()
            .unwrap()
            .insert(template.template_name.clone(), template);
        self
    }

    pub(crate) fn sent(&self) -> Vec<TemplateEmail> {
        self.sent.lock().unwrap().clone()
    }

    fn respond<T>(&self, body: T) -> ProviderResult<T> {
        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(ProviderResponse {
                status: self.status,
                body,
            }),
        }
    }

    fn not_found(name: &str) -> ProviderFailure {
        ProviderFailure::Service {
            status: Some(404),
            message: format!("Template {} does not exist.", name),
        }
    }
}

#[async_trait]
impl EmailClient for MockEmailClient {
    async fn send_template(&self, email: &TemplateEmail) -> ProviderResult<Option<String>> {
        if let Some((started, release)) = &self.gate {
            started.notify_one();
            release.notified().await;
        }

        if self.panic_on_send {
            panic!("mock provider exploded");
        }

        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(format!("send:{}", email.to));
        }

        self.sent.lock().unwrap().push(email.clone());
        let message_id = format!("mock-{}", self.sent.lock().unwrap().len());
        self.respond(Some(message_id))
    }

    async fn get_template(&self, name: &str) -> ProviderResult<EmailTemplate> {
        let found = self.templates.lock().unwrap().get(name).cloned();
        match found {
            Some(template) => self.respond(template),
            None if self.failure.is_none() => Err(Self::not_found(name)),
            None => self.respond(EmailTemplate {
                template_name: name.to_string(),
                subject: None,
                html: None,
                text: None,
            }),
        }
    }

    async fn list_templates(&self) -> ProviderResult<Vec<TemplateSummary>> {
        let summaries = self
            .templates
            .lock()
            .unwrap()
            .keys()
            .map(|name| TemplateSummary {
                template_name: name.clone(),
                created_at: Some(1_700_000_000),
            })
            .collect();
        self.respond(summaries)
    }

    async fn create_template(&self, template: &NewTemplate) -> ProviderResult<()> {
        if self.failure.is_none() {
            self.templates.lock().unwrap().insert(
                template.template_name.clone(),
                EmailTemplate {
                    template_name: template.template_name.clone(),
                    subject: Some(template.subject.clone()),
                    html: Some(template.html_content.clone()),
                    text: None,
                },
            );
        }
        self.respond(())
    }

    async fn delete_template(&self, name: &str) -> ProviderResult<()> {
        if self.failure.is_none() && self.templates.lock().unwrap().remove(name).is_none() {
            return Err(Self::not_found(name));
        }
        self.respond(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
