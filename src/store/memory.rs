//! In-memory document backend.
//!
//! Used by tests and single-process runs; the production document store is
//! an external collaborator behind the same trait. Updates hold the write
//! lock for the duration of the mutation, which gives the atomic
//! partial-field semantics the pipeline relies on.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::types::{
    ConfirmationUpdate, DeadLetterEntry, EmailEvent, WaitlistRecord, WaitlistStatus,
};
use super::{DocumentBackend, StoreError};

/// In-memory backend over the three logical collections.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    waitlist: RwLock<HashMap<String, WaitlistRecord>>,
    dlq: RwLock<HashMap<String, DeadLetterEntry>>,
    events: RwLock<Vec<EmailEvent>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the append-only event log (test inspection).
    pub fn events(&self) -> Vec<EmailEvent> {
        self.events.read().clone()
    }

    /// Number of dead-letter entries (test inspection).
    pub fn dlq_len(&self) -> usize {
        self.dlq.read().len()
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn waitlist_insert(&self, record: WaitlistRecord) -> Result<(), StoreError> {
        self.waitlist.write().insert(record.id.clone(), record);
        Ok(())
    }

    async fn waitlist_get(&self, id: &str) -> Result<Option<WaitlistRecord>, StoreError> {
        Ok(self.waitlist.read().get(id).cloned())
    }

    async fn waitlist_find_by_email(
        &self,
        normalized_email: &str,
    ) -> Result<Option<WaitlistRecord>, StoreError> {
        Ok(self
            .waitlist
            .read()
            .values()
            .find(|r| r.normalized_email == normalized_email)
            .cloned())
    }

    async fn waitlist_update_confirmation(
        &self,
        id: &str,
        update: ConfirmationUpdate,
    ) -> Result<(), StoreError> {
        let mut waitlist = self.waitlist.write();
        let record = waitlist
            .get_mut(id)
            .ok_or_else(|| StoreError::NoSuchDocument(id.to_string()))?;
        match update {
            ConfirmationUpdate::Sent {
                message_id,
                sent_at,
            } => {
                record.confirmation.sent = true;
                record.confirmation.sent_at = Some(sent_at);
                record.confirmation.message_id = Some(message_id);
                record.confirmation.error = None;
            }
            ConfirmationUpdate::Failed { error } => {
                record.confirmation.error = Some(error);
            }
        }
        Ok(())
    }

    async fn waitlist_set_status(
        &self,
        id: &str,
        status: WaitlistStatus,
    ) -> Result<(), StoreError> {
        let mut waitlist = self.waitlist.write();
        let record = waitlist
            .get_mut(id)
            .ok_or_else(|| StoreError::NoSuchDocument(id.to_string()))?;
        record.status = status;
        Ok(())
    }

    async fn dlq_get(&self, waitlist_id: &str) -> Result<Option<DeadLetterEntry>, StoreError> {
        Ok(self.dlq.read().get(waitlist_id).cloned())
    }

    async fn dlq_set(&self, entry: DeadLetterEntry) -> Result<(), StoreError> {
        self.dlq.write().insert(entry.waitlist_id.clone(), entry);
        Ok(())
    }

    async fn dlq_delete(&self, waitlist_id: &str) -> Result<(), StoreError> {
        self.dlq.write().remove(waitlist_id);
        Ok(())
    }

    async fn dlq_list(&self) -> Result<Vec<DeadLetterEntry>, StoreError> {
        let mut entries: Vec<DeadLetterEntry> = self.dlq.read().values().cloned().collect();
        // Stable iteration order keeps replay batches deterministic.
        entries.sort_by(|a, b| a.waitlist_id.cmp(&b.waitlist_id));
        Ok(entries)
    }

    async fn events_append(&self, event: EmailEvent) -> Result<(), StoreError> {
        self.events.write().push(event);
        Ok(())
    }
}
