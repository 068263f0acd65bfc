//! Admin endpoints: forced confirmation resend and dead-letter replay.
//!
//! Both endpoints authenticate the bearer token before touching any data.
//! The resend path enforces a 24-hour throttle against operator slips;
//! `force: true` bypasses it deliberately.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::{Error, Result};
use crate::state::AppState;
use crate::store::WaitlistRecord;

/// Minimum gap between resends unless forced.
const RESEND_THROTTLE_HOURS: i64 = 24;

/// Request body for `POST /adminResendConfirmationFn`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendRequest {
    /// Target record id
    #[serde(default)]
    pub waitlist_id: Option<String>,
    /// Target email (normalized before lookup)
    #[serde(default)]
    pub email: Option<String>,
    /// Bypass the 24-hour resend throttle
    #[serde(default)]
    pub force: bool,
}

/// Handle `POST /adminResendConfirmationFn`.
pub async fn resend_confirmation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ResendRequest>,
) -> Result<Json<serde_json::Value>> {
    authenticate(&state, &headers)?;

    let record = find_target(&state, &request).await?;

    if !request.force {
        if let Some(sent_at) = record.confirmation.sent_at {
            let age = Utc::now().signed_duration_since(sent_at);
            if record.confirmation.sent && age < Duration::hours(RESEND_THROTTLE_HOURS) {
                return Err(Error::Conflict(format!(
                    "confirmation already sent {}m ago; pass force to resend",
                    age.num_minutes()
                )));
            }
        }
    }

    let message_id = state.dispatcher.resend(&record).await?;
    info!(waitlist_id = %record.id, %message_id, forced = request.force, "admin resend completed");

    Ok(Json(json!({
        "success": true,
        "waitlistId": record.id,
        "email": record.normalized_email,
        "messageId": message_id,
        "forced": request.force,
    })))
}

/// Handle `POST /dlqReplayerFn`.
pub async fn replay_dlq(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    authenticate(&state, &headers)?;

    let report = state.replayer.replay().await;
    Ok(Json(json!({
        "success": true,
        "processed": report.processed,
        "successful": report.successful,
        "failed": report.failed,
        "errors": report.errors,
    })))
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    state.admin_auth.authenticate(auth_header)
}

/// Resolve the target record by id or email; id wins when both are given.
async fn find_target(state: &AppState, request: &ResendRequest) -> Result<WaitlistRecord> {
    if let Some(id) = request.waitlist_id.as_deref().filter(|id| !id.is_empty()) {
        return state
            .store
            .waitlist_get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("waitlist record {id}")));
    }

    if let Some(email) = request.email.as_deref() {
        let normalized = crate::email::address::normalize_and_validate(email)?;
        return state
            .store
            .waitlist_find_by_email(&normalized)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no record for {normalized}")));
    }

    Err(Error::validation("waitlistId or email is required"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::dispatch::testutil::ScriptedProvider;
    use crate::store::{ConfirmationUpdate, DocumentBackend, MemoryBackend};
    use axum::http::{HeaderValue, StatusCode};
    use std::sync::Arc;

    struct Harness {
        state: AppState,
        backend: Arc<MemoryBackend>,
        provider: Arc<ScriptedProvider>,
    }

    fn harness(outcomes: Vec<crate::error::Result<String>>) -> Harness {
        let backend = Arc::new(MemoryBackend::new());
        let provider = Arc::new(ScriptedProvider::new(outcomes));
        let state = AppState::new(&AppConfig::for_tests(), backend.clone(), provider.clone());
        Harness {
            state,
            backend,
            provider,
        }
    }

    fn admin_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!(
                "Bearer {}",
                AppConfig::for_tests().admin_token
            ))
            .unwrap(),
        );
        headers
    }

    fn resend_request(value: serde_json::Value) -> ResendRequest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_resend_by_id() {
        let h = harness(vec![Ok("msg_admin".to_string())]);
        h.backend
            .waitlist_insert(WaitlistRecord::new("wl_1", "a@b.co", None, "en"))
            .await
            .unwrap();

        let response = resend_confirmation(
            State(h.state),
            admin_headers(),
            Json(resend_request(json!({ "waitlistId": "wl_1" }))),
        )
        .await
        .unwrap();

        assert_eq!(response.0["success"], true);
        assert_eq!(response.0["waitlistId"], "wl_1");
        assert_eq!(response.0["messageId"], "msg_admin");
        assert_eq!(response.0["forced"], false);

        let record = h.backend.waitlist_get("wl_1").await.unwrap().unwrap();
        assert_eq!(record.confirmation.message_id.as_deref(), Some("msg_admin"));
    }

    #[tokio::test]
    async fn test_resend_by_email_normalizes_lookup() {
        let h = harness(vec![Ok("msg_admin".to_string())]);
        h.backend
            .waitlist_insert(WaitlistRecord::new("wl_1", "a@b.co", None, "en"))
            .await
            .unwrap();

        let response = resend_confirmation(
            State(h.state),
            admin_headers(),
            Json(resend_request(json!({ "email": "  A@B.CO " }))),
        )
        .await
        .unwrap();
        assert_eq!(response.0["email"], "a@b.co");
    }

    #[tokio::test]
    async fn test_missing_selector_is_400() {
        let h = harness(vec![]);
        let err = resend_confirmation(
            State(h.state),
            admin_headers(),
            Json(resend_request(json!({}))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_record_is_404() {
        let h = harness(vec![]);
        let err = resend_confirmation(
            State(h.state),
            admin_headers(),
            Json(resend_request(json!({ "waitlistId": "wl_missing" }))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_recent_send_is_409_unless_forced() {
        let h = harness(vec![Ok("msg_forced".to_string())]);
        h.backend
            .waitlist_insert(WaitlistRecord::new("wl_1", "a@b.co", None, "en"))
            .await
            .unwrap();
        h.backend
            .waitlist_update_confirmation(
                "wl_1",
                ConfirmationUpdate::Sent {
                    message_id: "msg_old".to_string(),
                    sent_at: Utc::now() - Duration::hours(2),
                },
            )
            .await
            .unwrap();

        let err = resend_confirmation(
            State(h.state.clone()),
            admin_headers(),
            Json(resend_request(json!({ "waitlistId": "wl_1" }))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(h.provider.call_count(), 0);

        let response = resend_confirmation(
            State(h.state),
            admin_headers(),
            Json(resend_request(json!({ "waitlistId": "wl_1", "force": true }))),
        )
        .await
        .unwrap();
        assert_eq!(response.0["forced"], true);
        assert_eq!(response.0["messageId"], "msg_forced");
    }

    #[tokio::test]
    async fn test_stale_send_needs_no_force() {
        let h = harness(vec![Ok("msg_new".to_string())]);
        h.backend
            .waitlist_insert(WaitlistRecord::new("wl_1", "a@b.co", None, "en"))
            .await
            .unwrap();
        h.backend
            .waitlist_update_confirmation(
                "wl_1",
                ConfirmationUpdate::Sent {
                    message_id: "msg_old".to_string(),
                    sent_at: Utc::now() - Duration::hours(25),
                },
            )
            .await
            .unwrap();

        let response = resend_confirmation(
            State(h.state),
            admin_headers(),
            Json(resend_request(json!({ "waitlistId": "wl_1" }))),
        )
        .await
        .unwrap();
        assert_eq!(response.0["messageId"], "msg_new");
    }

    #[tokio::test]
    async fn test_auth_is_checked_before_data() {
        let h = harness(vec![]);
        h.backend
            .waitlist_insert(WaitlistRecord::new("wl_1", "a@b.co", None, "en"))
            .await
            .unwrap();

        // Missing header -> 401.
        let err = resend_confirmation(
            State(h.state.clone()),
            HeaderMap::new(),
            Json(resend_request(json!({ "waitlistId": "wl_1" }))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        // Wrong token -> 403, no send attempted.
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer wrong-token"),
        );
        let err = resend_confirmation(
            State(h.state),
            headers,
            Json(resend_request(json!({ "waitlistId": "wl_1" }))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(h.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_replay_endpoint_reports_counts() {
        let h = harness(vec![]);
        let response = replay_dlq(State(h.state.clone()), admin_headers())
            .await
            .unwrap();
        assert_eq!(response.0["success"], true);
        assert_eq!(response.0["processed"], 0);

        let err = replay_dlq(State(h.state), HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }
}
