//! Data model for the pipeline's three logical collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a waitlist signup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitlistStatus {
    /// Signed up, confirmation pending
    Pending,
    /// Confirmed their address
    Confirmed,
    /// Invited off the waitlist
    Invited,
    /// Blocked after a bounce or complaint
    Blocked,
}

/// Structured error details recorded on failed sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable machine-readable code
    pub code: String,
    /// Human-readable description
    pub msg: String,
}

impl ErrorDetail {
    /// Build from a pipeline error.
    pub fn from_error(error: &crate::error::Error) -> Self {
        Self {
            code: error.code().to_string(),
            msg: error.to_string(),
        }
    }
}

/// Confirmation delivery state embedded in a waitlist record.
///
/// `sent` transitions false -> true at most once per successful send;
/// idempotent re-entry of the dispatcher is a no-op.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfirmationState {
    /// Whether a confirmation email was successfully sent
    pub sent: bool,
    /// When the send succeeded
    #[serde(rename = "sentAt")]
    pub sent_at: Option<DateTime<Utc>>,
    /// Provider-assigned message id
    #[serde(rename = "messageId")]
    pub message_id: Option<String>,
    /// Last send error, cleared on success
    pub error: Option<ErrorDetail>,
}

/// A waitlist signup record.
///
/// Owned by the signup flow; this pipeline mutates only the confirmation
/// fields and (from the webhook) the status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitlistRecord {
    /// Record id
    pub id: String,
    /// Raw email as entered
    pub email: String,
    /// Trimmed, lower-cased email
    #[serde(rename = "normalizedEmail")]
    pub normalized_email: String,
    /// SHA-256 hex of the normalized email
    #[serde(rename = "dedupeKey")]
    pub dedupe_key: String,
    /// Signup display name, if given
    pub name: Option<String>,
    /// BCP-47-ish locale tag ("en", "fr", ...)
    pub locale: String,
    /// Lifecycle status
    pub status: WaitlistStatus,
    /// Confirmation delivery state
    pub confirmation: ConfirmationState,
}

impl WaitlistRecord {
    /// Build a fresh pending record, normalizing and keying the email.
    pub fn new<S: Into<String>>(id: S, email: &str, name: Option<String>, locale: &str) -> Self {
        let normalized = crate::email::address::normalize(email);
        let dedupe_key = crate::email::address::dedupe_key(email);
        Self {
            id: id.into(),
            email: email.to_string(),
            normalized_email: normalized,
            dedupe_key,
            name,
            locale: locale.to_string(),
            status: WaitlistStatus::Pending,
            confirmation: ConfirmationState::default(),
        }
    }
}

/// Atomic partial update of a record's confirmation fields.
///
/// The document store applies these as single consistent writes, never
/// read-modify-write; the dispatcher and replayer rely on that.
#[derive(Debug, Clone)]
pub enum ConfirmationUpdate {
    /// A send succeeded: set sent/sentAt/messageId, clear error.
    Sent {
        /// Provider-assigned message id
        message_id: String,
        /// Send completion time
        sent_at: DateTime<Utc>,
    },
    /// A send failed: record the error, leave sent/messageId untouched.
    Failed {
        /// What went wrong
        error: ErrorDetail,
    },
}

/// A failed dispatch awaiting bounded replay.
///
/// Created with `attempts = 1` on first failure; incremented by the
/// replayer; deleted on success or once `attempts >= max_attempts`. An
/// entry never outlives `max_attempts` failed replay cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// Referenced waitlist record id (also the entry key)
    #[serde(rename = "waitlistId")]
    pub waitlist_id: String,
    /// Recipient email at failure time
    pub email: String,
    /// Most recent error
    pub error: ErrorDetail,
    /// Failed attempts so far (>= 1)
    pub attempts: u32,
    /// Retry cap
    #[serde(rename = "maxAttempts")]
    pub max_attempts: u32,
    /// When the last attempt was made
    #[serde(rename = "lastAttempt")]
    pub last_attempt: DateTime<Utc>,
}

/// Retry cap for dead-letter entries.
pub const DLQ_MAX_ATTEMPTS: u32 = 3;

impl DeadLetterEntry {
    /// Build a first-failure entry (`attempts = 1`).
    pub fn first_failure<S: Into<String>, E: Into<String>>(
        waitlist_id: S,
        email: E,
        error: ErrorDetail,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            waitlist_id: waitlist_id.into(),
            email: email.into(),
            error,
            attempts: 1,
            max_attempts: DLQ_MAX_ATTEMPTS,
            last_attempt: now,
        }
    }

    /// Whether the entry has exhausted its retry budget.
    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Delivery-lifecycle event types reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailEventType {
    /// Accepted by the recipient server
    Delivered,
    /// Hard or soft bounce
    Bounced,
    /// Recipient opened the message
    Opened,
    /// Recipient clicked a link
    Clicked,
    /// Recipient marked the message as spam
    Complained,
    /// Dropped before delivery
    Dropped,
}

impl EmailEventType {
    /// Whether this event blocks the recipient's record.
    pub fn blocks_recipient(&self) -> bool {
        matches!(self, EmailEventType::Bounced | EmailEventType::Complained)
    }

    /// Stable lowercase name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailEventType::Delivered => "delivered",
            EmailEventType::Bounced => "bounced",
            EmailEventType::Opened => "opened",
            EmailEventType::Clicked => "clicked",
            EmailEventType::Complained => "complained",
            EmailEventType::Dropped => "dropped",
        }
    }
}

/// An append-only delivery event recorded from the webhook.
///
/// Never mutated or deleted; `occurred_at` comes from the payload's
/// `created_at`, not receipt time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailEvent {
    /// Internal event id
    pub id: uuid::Uuid,
    /// Provider message id
    #[serde(rename = "messageId")]
    pub message_id: String,
    /// Event type
    #[serde(rename = "type")]
    pub event_type: EmailEventType,
    /// Recipient address the event concerns
    pub email: String,
    /// Provider-reported event time
    #[serde(rename = "occurredAt")]
    pub occurred_at: DateTime<Utc>,
    /// Opaque provider fields carried as-is
    pub meta: serde_json::Value,
}
