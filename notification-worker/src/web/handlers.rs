//! Template management endpoint handlers.
//!
//! Each handler makes one provider call and maps the classified outcome to
//! an HTTP response. No state is kept here.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AdminSettings;
use crate::mail::{
    classify, Classified, EmailClient, EmailTemplate, NewTemplate, TemplateSummary,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AdminSettings>,
    pub client: Arc<dyn EmailClient>,
}

impl AppState {
    pub fn new(config: AdminSettings, client: Arc<dyn EmailClient>) -> Self {
        Self {
            config: Arc::new(config),
            client,
        }
    }
}

/// Response envelope for every template route.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: Option<String>, data: Option<T>) -> Self {
        Self {
            status: "ok",
            message,
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: Some(message.into()),
            data: None,
        }
    }
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

/// Map a classified provider result onto an HTTP response.
fn respond<T>(classified: Classified<T>, success_message: Option<&str>) -> ApiResult<T> {
    let outcome = classified.outcome;

    if outcome.is_success() {
        return (
            StatusCode::OK,
            Json(ApiResponse::ok(
                success_message.map(str::to_owned),
                classified.body,
            )),
        );
    }

    let status = StatusCode::from_u16(outcome.code)
        .ok()
        .filter(|s| s.is_client_error() || s.is_server_error())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    warn!(
        outcome = %outcome.status,
        code = status.as_u16(),
        detail = ?outcome.detail,
        "template_request_failed"
    );

    (
        status,
        Json(ApiResponse::error(
            outcome
                .detail
                .unwrap_or_else(|| "Internal Server Error".to_string()),
        )),
    )
}

fn bad_request<T>(message: &str) -> ApiResult<T> {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message)))
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Templates
// =============================================================================

/// List all stored templates.
pub async fn list_templates(State(state): State<AppState>) -> ApiResult<Vec<TemplateSummary>> {
    let classified = classify(state.client.list_templates().await);

    if let Some(templates) = &classified.body {
        info!(count = templates.len(), "templates_listed");
    }

    respond(classified, None)
}

/// Fetch one template by name.
pub async fn get_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<EmailTemplate> {
    if name.trim().is_empty() {
        return bad_request("templateName is required");
    }

    respond(classify(state.client.get_template(&name).await), None)
}

/// Create a template.
pub async fn add_email_template(
    State(state): State<AppState>,
    Json(request): Json<NewTemplate>,
) -> ApiResult<()> {
    info!(template = %request.template_name, "template_create_received");

    if request.template_name.trim().is_empty() {
        return bad_request("templateName is required");
    }
    if request.subject.trim().is_empty() {
        return bad_request("subject is required");
    }
    if request.html_content.trim().is_empty() {
        return bad_request("htmlContent is required");
    }

    let classified = classify(state.client.create_template(&request).await);
    if classified.outcome.is_success() {
        info!(template = %request.template_name, "template_created");
    }

    respond(classified, Some("Template added successfully"))
}

/// Query parameters for template deletion.
#[derive(Debug, Deserialize)]
pub struct DeleteTemplateParams {
    #[serde(rename = "templateName")]
    pub template_name: Option<String>,
}

/// Delete a template by name.
pub async fn delete_email_template(
    State(state): State<AppState>,
    Query(params): Query<DeleteTemplateParams>,
) -> ApiResult<()> {
    let name = match params.template_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return bad_request("templateName is required"),
    };

    let classified = classify(state.client.delete_template(&name).await);
    if classified.outcome.is_success() {
        info!(template = %name, "template_deleted");
    }

    respond(classified, Some("Template successfully removed"))
}
