//! Shared application state and HTTP routing.

use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::config::AppConfig;
use crate::dispatch::{ConfirmationDispatcher, DlqReplayer};
use crate::email::provider::EmailProvider;
use crate::email::EmailGateway;
use crate::security::{AdminAuth, RateLimiter, SecurityHeaders};
use crate::store::{Datastore, DocumentBackend};
use crate::webhook::SignatureVerifier;
use crate::{admin, webhook};

/// Shared state handed to every handler.
///
/// Construction wires the two circuit breakers: one in front of the email
/// provider, one in front of the document store. Both are shared across
/// all concurrent requests.
#[derive(Clone)]
pub struct AppState {
    /// Breaker-guarded document store.
    pub store: Datastore,
    /// Confirmation dispatcher (trigger and admin-resend paths).
    pub dispatcher: ConfirmationDispatcher,
    /// Dead-letter replayer.
    pub replayer: DlqReplayer,
    /// Webhook signature verifier.
    pub verifier: SignatureVerifier,
    /// Admin bearer-token authenticator.
    pub admin_auth: AdminAuth,
    /// Per-IP webhook rate limiter.
    pub rate_limiter: Arc<RateLimiter>,
    /// Public base URL for confirmation links.
    pub base_url: Url,
}

impl AppState {
    /// Wire the full pipeline from configuration and collaborators.
    pub fn new(
        config: &AppConfig,
        backend: Arc<dyn DocumentBackend>,
        provider: Arc<dyn EmailProvider>,
    ) -> Self {
        let store_breaker = Arc::new(CircuitBreaker::new(
            "document-store",
            BreakerConfig::DOCUMENT_STORE,
        ));
        let email_breaker = Arc::new(CircuitBreaker::new(
            "email-provider",
            BreakerConfig::EMAIL_PROVIDER,
        ));

        let store = Datastore::new(backend, store_breaker);
        let gateway = EmailGateway::new(provider, email_breaker, config.sender.clone());
        let dispatcher =
            ConfirmationDispatcher::new(store.clone(), gateway.clone(), config.base_url.clone());
        let replayer = DlqReplayer::new(store.clone(), gateway, config.base_url.clone());

        Self {
            store,
            dispatcher,
            replayer,
            verifier: SignatureVerifier::new(config.webhook_secret.clone()),
            admin_auth: AdminAuth::new(config.admin_token.clone()),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit_rpm)),
            base_url: config.base_url.clone(),
        }
    }
}

/// Build the HTTP router.
///
/// Method routing gives non-POST calls on the three POST endpoints a 405
/// without touching any handler state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/resendWebhookFn", post(webhook::receive))
        .route("/dlqReplayerFn", post(admin::replay_dlq))
        .route(
            "/adminResendConfirmationFn",
            post(admin::resend_confirmation),
        )
        .layer(middleware::from_fn(apply_security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": crate::NAME,
        "version": crate::VERSION,
    }))
}

/// Middleware stamping the standard security headers on every response.
async fn apply_security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    SecurityHeaders::apply(response.headers_mut());
    response
}
