//! Bounded replay of dead-letter entries.
//!
//! Replay runs on demand (scheduled or admin-triggered), never inline with
//! dispatch. Entries are processed sequentially within one pass to avoid
//! amplifying load against an already-struggling provider, and each entry
//! is handled independently: one failure never aborts the batch.

use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::email::address;
use crate::email::EmailGateway;
use crate::error::Result;
use crate::store::{ConfirmationUpdate, Datastore, DeadLetterEntry, ErrorDetail};
use crate::template;

/// Aggregate result of one replay pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Entries examined
    pub processed: u32,
    /// Sends that succeeded (entries deleted)
    pub successful: u32,
    /// Sends that failed (entries kept with `attempts` incremented)
    pub failed: u32,
    /// Per-entry error strings for the caller
    pub errors: Vec<String>,
}

/// Replays dead-letter entries against the email gateway.
#[derive(Clone)]
pub struct DlqReplayer {
    store: Datastore,
    gateway: EmailGateway,
    base_url: Url,
}

impl DlqReplayer {
    /// Create a replayer.
    pub fn new(store: Datastore, gateway: EmailGateway, base_url: Url) -> Self {
        Self {
            store,
            gateway,
            base_url,
        }
    }

    /// Run one replay pass over all entries.
    ///
    /// Never returns an error: failures are caught per entry and recorded
    /// in the report.
    pub async fn replay(&self) -> ReplayReport {
        let mut report = ReplayReport::default();

        let entries = match self.store.dlq_list().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "could not list dead-letter entries");
                report.errors.push(format!("dlq list failed: {e}"));
                return report;
            }
        };

        info!(entries = entries.len(), "starting dead-letter replay pass");

        for entry in entries {
            report.processed += 1;
            match self.replay_entry(&entry).await {
                Ok(ReplayStep::Sent) => report.successful += 1,
                Ok(ReplayStep::Discarded) => {}
                Err(e) => {
                    report.failed += 1;
                    report
                        .errors
                        .push(format!("{}: {e}", entry.waitlist_id));
                }
            }
        }

        counter!("dlq_replayed_total").increment(u64::from(report.processed));
        info!(
            processed = report.processed,
            successful = report.successful,
            failed = report.failed,
            "dead-letter replay pass finished"
        );
        report
    }

    async fn replay_entry(&self, entry: &DeadLetterEntry) -> Result<ReplayStep> {
        // Terminal: the retry budget is spent. Delete and move on; this is
        // a final give-up, not an error to the caller.
        if entry.exhausted() {
            debug!(waitlist_id = %entry.waitlist_id, attempts = entry.attempts, "retry budget exhausted, discarding entry");
            self.store.dlq_delete(&entry.waitlist_id).await?;
            return Ok(ReplayStep::Discarded);
        }

        // Orphaned reference: the record is gone.
        let record = match self.store.waitlist_get(&entry.waitlist_id).await? {
            Some(record) => record,
            None => {
                debug!(waitlist_id = %entry.waitlist_id, "referenced record missing, discarding entry");
                self.store.dlq_delete(&entry.waitlist_id).await?;
                return Ok(ReplayStep::Discarded);
            }
        };

        // A record that became invalid will never send; stop retrying it.
        let normalized = match super::confirmation::validate_record(&record) {
            Ok(normalized) => normalized,
            Err(e) => {
                debug!(waitlist_id = %entry.waitlist_id, error = %e, "record no longer valid, discarding entry");
                self.store.dlq_delete(&entry.waitlist_id).await?;
                return Ok(ReplayStep::Discarded);
            }
        };

        let dedupe_key = address::dedupe_key(&normalized);
        let message =
            template::confirmation_message(&record.locale, record.name.as_deref(), &self.base_url);

        match self
            .gateway
            .send(
                &normalized,
                &message.subject,
                &message.html,
                &dedupe_key,
                &record.locale,
            )
            .await
        {
            Ok(receipt) => {
                self.store
                    .waitlist_update_confirmation(
                        &record.id,
                        ConfirmationUpdate::Sent {
                            message_id: receipt.message_id.clone(),
                            sent_at: Utc::now(),
                        },
                    )
                    .await?;
                self.store.dlq_delete(&entry.waitlist_id).await?;
                info!(waitlist_id = %entry.waitlist_id, message_id = %receipt.message_id, "dead-letter replay succeeded");
                Ok(ReplayStep::Sent)
            }
            Err(send_err) => {
                let mut updated = entry.clone();
                updated.attempts += 1;
                updated.last_attempt = Utc::now();
                updated.error = ErrorDetail::from_error(&send_err);
                if let Err(e) = self.store.dlq_set(updated).await {
                    warn!(waitlist_id = %entry.waitlist_id, error = %e, "failed to update dead-letter entry");
                }
                Err(send_err)
            }
        }
    }
}

enum ReplayStep {
    Sent,
    Discarded,
}
