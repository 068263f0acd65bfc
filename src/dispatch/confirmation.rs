//! Confirmation dispatch for newly created waitlist records.
//!
//! The upstream trigger platform delivers "record created" events with
//! at-least-once semantics and may re-invoke the handler for the same
//! record; the `confirmation.sent` gate is the sole correctness mechanism
//! against duplicate sends; there is no cross-record locking.
//!
//! On failure the dispatcher records the error, writes a dead-letter entry,
//! and re-raises so the invoking platform sees the failure too. That makes
//! retry deliberately two-layered (platform retry of the whole dispatch,
//! plus DLQ replay of the send); the idempotency gate is what keeps the
//! layering safe.

use chrono::Utc;
use metrics::counter;
use tracing::{debug, info, warn};
use url::Url;

use crate::email::address;
use crate::email::EmailGateway;
use crate::error::{Error, Result};
use crate::store::{ConfirmationUpdate, Datastore, DeadLetterEntry, ErrorDetail, WaitlistRecord};
use crate::template;

/// Outcome of a dispatch invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The record already had a confirmation sent; nothing was done.
    AlreadySent,
    /// A confirmation was sent and recorded.
    Sent {
        /// Provider-assigned message id
        message_id: String,
    },
}

/// Dispatches confirmation emails, once per record.
#[derive(Clone)]
pub struct ConfirmationDispatcher {
    store: Datastore,
    gateway: EmailGateway,
    base_url: Url,
}

impl ConfirmationDispatcher {
    /// Create a dispatcher.
    pub fn new(store: Datastore, gateway: EmailGateway, base_url: Url) -> Self {
        Self {
            store,
            gateway,
            base_url,
        }
    }

    /// Handle a "waitlist record created" event.
    ///
    /// Safe to invoke more than once for the same record: a record whose
    /// confirmation was already sent is a no-op with zero provider calls.
    pub async fn dispatch(&self, waitlist_id: &str) -> Result<DispatchOutcome> {
        let record = self
            .store
            .waitlist_get(waitlist_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("waitlist record {waitlist_id}")))?;

        if record.confirmation.sent {
            debug!(waitlist_id, "confirmation already sent, skipping");
            counter!("confirmation_skipped_total").increment(1);
            return Ok(DispatchOutcome::AlreadySent);
        }

        let normalized = validate_record(&record)?;

        match self.send_confirmation(&record, &normalized).await {
            Ok(message_id) => {
                info!(waitlist_id, message_id = %message_id, "confirmation sent");
                Ok(DispatchOutcome::Sent { message_id })
            }
            Err(send_err) => {
                self.record_failure(&record, &normalized, &send_err).await;
                // Re-raise so the invoking platform observes the failure;
                // recovery itself is the DLQ's job.
                Err(send_err)
            }
        }
    }

    /// Send a confirmation regardless of the sent gate (admin force path).
    ///
    /// Overwrites the stored message id on success. Does not touch the DLQ
    /// on failure; the operator is watching the response.
    pub async fn resend(&self, record: &WaitlistRecord) -> Result<String> {
        let normalized = validate_record(record)?;
        self.send_confirmation(record, &normalized).await
    }

    async fn send_confirmation(
        &self,
        record: &WaitlistRecord,
        normalized: &str,
    ) -> Result<String> {
        let dedupe_key = address::dedupe_key(normalized);
        let message =
            template::confirmation_message(&record.locale, record.name.as_deref(), &self.base_url);

        let receipt = self
            .gateway
            .send(
                normalized,
                &message.subject,
                &message.html,
                &dedupe_key,
                &record.locale,
            )
            .await?;

        self.store
            .waitlist_update_confirmation(
                &record.id,
                ConfirmationUpdate::Sent {
                    message_id: receipt.message_id.clone(),
                    sent_at: Utc::now(),
                },
            )
            .await?;

        Ok(receipt.message_id)
    }

    /// Record a send failure: confirmation error field plus a first-failure
    /// dead-letter entry. Bookkeeping failures are logged, never allowed to
    /// mask the original error.
    async fn record_failure(&self, record: &WaitlistRecord, normalized: &str, send_err: &Error) {
        counter!("confirmation_failed_total").increment(1);
        let detail = ErrorDetail::from_error(send_err);

        if let Err(e) = self
            .store
            .waitlist_update_confirmation(
                &record.id,
                ConfirmationUpdate::Failed {
                    error: detail.clone(),
                },
            )
            .await
        {
            warn!(waitlist_id = %record.id, error = %e, "failed to record confirmation error");
        }

        let entry = DeadLetterEntry::first_failure(&record.id, normalized, detail, Utc::now());
        if let Err(e) = self.store.dlq_set(entry).await {
            warn!(waitlist_id = %record.id, error = %e, "failed to write dead-letter entry");
        }
    }
}

/// Validate and normalize the record's email, name, and locale.
///
/// Returns the normalized email. Failures are non-retryable validation
/// errors; the trigger platform does not retry those.
pub(crate) fn validate_record(record: &WaitlistRecord) -> Result<String> {
    let normalized = address::normalize_and_validate(&record.email)?;

    if let Some(name) = &record.name {
        if name.trim().is_empty() || name.len() > 200 {
            return Err(Error::validation("name must be 1-200 characters"));
        }
    }

    let locale_ok = !record.locale.is_empty()
        && record.locale.len() <= 10
        && record
            .locale
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !locale_ok {
        return Err(Error::validation(format!(
            "malformed locale: {:?}",
            record.locale
        )));
    }

    Ok(normalized)
}
