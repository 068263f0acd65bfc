//! Inbound webhook endpoint for provider delivery events.
//!
//! The checks run strictly in order: size cap, rate limit, bot screening,
//! payload shape, signature, event typing. Signature verification uses the
//! raw body bytes exactly as received. Once past the gates, everything
//! unexpected collapses to a generic 500; dependency details never reach
//! the caller.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use metrics::counter;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::security;
use crate::state::AppState;
use crate::store::WaitlistStatus;
use crate::webhook::events::{WebhookEnvelope, MAX_PAYLOAD_BYTES};

/// Handle `POST /resendWebhookFn`.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    if body.len() > MAX_PAYLOAD_BYTES {
        return Err(Error::PayloadTooLarge {
            size: body.len(),
            limit: MAX_PAYLOAD_BYTES,
        });
    }

    let client_ip = security::client_ip(&headers);
    if let Some(ip) = client_ip {
        state.rate_limiter.check(ip)?;
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    security::screen_webhook_request(user_agent, client_ip)?;

    // Shape check before signature: the contract distinguishes a malformed
    // payload (400) from a bad signature (401).
    let raw: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| Error::validation(format!("malformed JSON payload: {e}")))?;
    if !raw.is_object() || raw.get("type").is_none() || raw.get("data").is_none() {
        return Err(Error::validation(
            "payload must be an object with type and data",
        ));
    }

    state.verifier.verify(&headers, &body)?;

    let envelope: WebhookEnvelope = serde_json::from_value(raw)
        .map_err(|e| Error::validation(format!("malformed event envelope: {e}")))?;
    let event = envelope.into_event()?;

    counter!("webhook_events_total", "type" => event.event_type.as_str()).increment(1);

    let blocks = event.event_type.blocks_recipient();
    let email = event.email.clone();
    let message_id = event.message_id.clone();

    state
        .store
        .events_append(event)
        .await
        .map_err(Error::into_internal)?;
    info!(%message_id, email = %email, "delivery event recorded");

    if blocks {
        block_recipient(&state, &email).await.map_err(Error::into_internal)?;
    }

    Ok(Json(json!({ "success": true })))
}

/// Block the waitlist record behind a bounced or complained address.
///
/// Idempotent: an already-blocked record is left alone, and an event for an
/// address with no record is recorded without further effect.
async fn block_recipient(state: &AppState, email: &str) -> Result<()> {
    match state.store.waitlist_find_by_email(email).await? {
        Some(record) if record.status == WaitlistStatus::Blocked => {
            debug!(waitlist_id = %record.id, "record already blocked");
            Ok(())
        }
        Some(record) => {
            info!(waitlist_id = %record.id, "blocking record after bounce or complaint");
            counter!("recipients_blocked_total").increment(1);
            state
                .store
                .waitlist_set_status(&record.id, WaitlistStatus::Blocked)
                .await
        }
        None => {
            debug!(email, "bounce event for unknown address");
            Ok(())
        }
    }
}
