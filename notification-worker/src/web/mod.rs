//! Web server module for template management.
//!
//! Thin routes over the email provider's template API:
//! - `GET /health` (open)
//! - `GET /email/templates`, `GET /email/templates/:name`
//! - `PUT /email/add-email-template`
//! - `DELETE /email/delete-email-template?templateName=...`
//!
//! Everything under `/email` requires the admin bearer token.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{delete, get, put},
    Router,
};
use tower_http::trace::TraceLayer;

pub use auth::{bearer_token, require_admin, verify_admin_token};
pub use handlers::{
    add_email_template, delete_email_template, get_template, health, list_templates, ApiResponse,
    AppState, HealthResponse,
};

/// Build the admin router.
pub fn router(state: AppState) -> Router {
    let templates = Router::new()
        .route("/email/templates", get(list_templates))
        .route("/email/templates/:name", get(get_template))
        .route("/email/add-email-template", put(add_email_template))
        .route("/email/delete-email-template", delete(delete_email_template))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health))
        .merge(templates)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::AdminSettings;
    use crate::mail::mock::MockEmailClient;
    use crate::mail::{EmailTemplate, ProviderFailure};

    const TOKEN: &str = "admin-token";

    fn state(client: MockEmailClient) -> AppState {
        AppState::new(
            AdminSettings {
                port: 0,
                api_token: Some(TOKEN.to_string()),
            },
            Arc::new(client),
        )
    }

    fn seeded() -> MockEmailClient {
        MockEmailClient::new().with_template(EmailTemplate {
            template_name: "PasswordReset".to_string(),
            subject: Some("Reset your password".to_string()),
            html: Some("<p>{{username}}</p>".to_string()),
            text: None,
        })
    }

    fn authed(method: &str, uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let app = router(state(MockEmailClient::new()));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_templates_require_token() {
        let app = router(state(seeded()));

        let response = app
            .clone()
            .oneshot(Request::get("/email/templates").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::get("/email/templates")
                    .header(header::AUTHORIZATION, "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_no_configured_token_rejects_everything() {
        let app = router(AppState::new(
            AdminSettings {
                port: 0,
                api_token: None,
            },
            Arc::new(seeded()),
        ));

        let response = app
            .oneshot(authed("GET", "/email/templates", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_and_get_templates() {
        let app = router(state(seeded()));

        let response = app
            .clone()
            .oneshot(authed("GET", "/email/templates", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"][0]["templateName"], "PasswordReset");

        let response = app
            .oneshot(authed("GET", "/email/templates/PasswordReset", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["subject"], "Reset your password");
    }

    #[tokio::test]
    async fn test_get_missing_template() {
        let app = router(state(MockEmailClient::new()));

        let response = app
            .oneshot(authed("GET", "/email/templates/Nope", Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_add_template() {
        let app = router(state(MockEmailClient::new()));
        let payload = json!({
            "templateName": "UsernameChange",
            "subject": "Username changed",
            "htmlContent": "<p>{{newUsername}}</p>"
        });

        let response = app
            .clone()
            .oneshot(authed(
                "PUT",
                "/email/add-email-template",
                Body::from(payload.to_string()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["message"],
            "Template added successfully"
        );

        let response = app
            .oneshot(authed("GET", "/email/templates/UsernameChange", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_add_template_validation() {
        let app = router(state(MockEmailClient::new()));
        let payload = json!({
            "templateName": "UsernameChange",
            "subject": " ",
            "htmlContent": "<p></p>"
        });

        let response = app
            .oneshot(authed(
                "PUT",
                "/email/add-email-template",
                Body::from(payload.to_string()),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "subject is required");
    }

    #[tokio::test]
    async fn test_provider_failure_maps_to_status() {
        let app = router(state(MockEmailClient::failing(
            ProviderFailure::TooManyRequests,
        )));
        let payload = json!({
            "templateName": "RoleChange",
            "subject": "Role changed",
            "htmlContent": "<p>hi</p>"
        });

        let response = app
            .oneshot(authed(
                "PUT",
                "/email/add-email-template",
                Body::from(payload.to_string()),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_delete_template() {
        let app = router(state(seeded()));

        let response = app
            .clone()
            .oneshot(authed(
                "DELETE",
                "/email/delete-email-template?templateName=PasswordReset",
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["message"],
            "Template successfully removed"
        );

        let response = app
            .oneshot(authed(
                "DELETE",
                "/email/delete-email-template",
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
