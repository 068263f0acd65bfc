//! Typed webhook event envelope.
//!
//! The provider posts `{type, created_at, data}` envelopes where `data`
//! carries the original message fields. Only the six delivery-lifecycle
//! event types are accepted; anything else is a validation failure, not a
//! new variant to silently absorb.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::{EmailEvent, EmailEventType};

/// Maximum accepted webhook body size in bytes.
pub const MAX_PAYLOAD_BYTES: usize = 10 * 1024;

/// Raw webhook envelope as posted by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    /// Wire event type, e.g. `email.delivered`
    #[serde(rename = "type")]
    pub event_type: String,
    /// Provider-reported event time
    pub created_at: DateTime<Utc>,
    /// Message fields the event concerns
    pub data: WebhookData,
}

/// The `data` object inside a webhook envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookData {
    /// Provider message id
    pub id: String,
    /// Sender address
    #[serde(default)]
    pub from: Option<String>,
    /// Recipient addresses
    #[serde(default)]
    pub to: Vec<String>,
    /// Message subject
    #[serde(default)]
    pub subject: Option<String>,
    /// Original HTML body, when the provider echoes it
    #[serde(default)]
    pub html: Option<String>,
    /// Original text body, when the provider echoes it
    #[serde(default)]
    pub text: Option<String>,
    /// Message creation time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Provider's latest lifecycle label for the message
    #[serde(default)]
    pub last_event: Option<String>,
}

/// Map a wire event name onto the allow-listed enum.
pub fn parse_event_type(wire: &str) -> Option<EmailEventType> {
    match wire {
        "email.delivered" => Some(EmailEventType::Delivered),
        "email.bounced" => Some(EmailEventType::Bounced),
        "email.opened" => Some(EmailEventType::Opened),
        "email.clicked" => Some(EmailEventType::Clicked),
        "email.complained" => Some(EmailEventType::Complained),
        "email.dropped" => Some(EmailEventType::Dropped),
        _ => None,
    }
}

impl WebhookEnvelope {
    /// Convert the envelope into a persistable [`EmailEvent`].
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] when the wire type is not allow-listed or the
    /// envelope names no recipient.
    pub fn into_event(self) -> Result<EmailEvent> {
        let event_type = parse_event_type(&self.event_type)
            .ok_or_else(|| Error::validation(format!("unknown event type: {}", self.event_type)))?;

        let email = self
            .data
            .to
            .first()
            .map(|to| to.trim().to_lowercase())
            .filter(|to| !to.is_empty())
            .ok_or_else(|| Error::validation("event names no recipient"))?;

        Ok(EmailEvent {
            id: Uuid::new_v4(),
            message_id: self.data.id.clone(),
            event_type,
            email,
            // Provider-reported time, not receipt time.
            occurred_at: self.created_at,
            meta: json!({
                "from": self.data.from,
                "subject": self.data.subject,
                "last_event": self.data.last_event,
            }),
        })
    }
}
