//! Document store access.
//!
//! The document store itself is an external collaborator reached through
//! the [`DocumentBackend`] trait: three logical collections (`waitlist`,
//! `email_dlq`, `email_events`) with atomic partial-field update semantics.
//! The [`Datastore`] facade routes every backend call through the
//! document-store circuit breaker so a struggling store fails fast instead
//! of piling up requests.

pub mod memory;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::breaker::CircuitBreaker;
use crate::error::{Error as PipelineError, Result};

pub use memory::MemoryBackend;
pub use types::{
    ConfirmationState, ConfirmationUpdate, DeadLetterEntry, EmailEvent, EmailEventType,
    ErrorDetail, WaitlistRecord, WaitlistStatus, DLQ_MAX_ATTEMPTS,
};

/// Backend-level store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The write targeted a document that does not exist.
    #[error("no such document: {0}")]
    NoSuchDocument(String),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => PipelineError::external("store_unavailable", msg),
            StoreError::NoSuchDocument(id) => PipelineError::NotFound(id),
        }
    }
}

/// Collaborator seam over the document store.
///
/// Partial updates (`waitlist_update_confirmation`, `waitlist_set_status`)
/// must be applied as single consistent writes, never read-modify-write.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Insert a waitlist record (signup flow / tests).
    async fn waitlist_insert(&self, record: WaitlistRecord) -> std::result::Result<(), StoreError>;

    /// Fetch a waitlist record by id.
    async fn waitlist_get(
        &self,
        id: &str,
    ) -> std::result::Result<Option<WaitlistRecord>, StoreError>;

    /// Look up a waitlist record by normalized email.
    async fn waitlist_find_by_email(
        &self,
        normalized_email: &str,
    ) -> std::result::Result<Option<WaitlistRecord>, StoreError>;

    /// Atomically apply a confirmation-field update.
    async fn waitlist_update_confirmation(
        &self,
        id: &str,
        update: ConfirmationUpdate,
    ) -> std::result::Result<(), StoreError>;

    /// Atomically set a record's status.
    async fn waitlist_set_status(
        &self,
        id: &str,
        status: WaitlistStatus,
    ) -> std::result::Result<(), StoreError>;

    /// Fetch a dead-letter entry by waitlist id.
    async fn dlq_get(
        &self,
        waitlist_id: &str,
    ) -> std::result::Result<Option<DeadLetterEntry>, StoreError>;

    /// Create or replace a dead-letter entry (keyed by waitlist id).
    async fn dlq_set(&self, entry: DeadLetterEntry) -> std::result::Result<(), StoreError>;

    /// Delete a dead-letter entry; deleting a missing entry is a no-op.
    async fn dlq_delete(&self, waitlist_id: &str) -> std::result::Result<(), StoreError>;

    /// List all dead-letter entries.
    async fn dlq_list(&self) -> std::result::Result<Vec<DeadLetterEntry>, StoreError>;

    /// Append a delivery event. The collection is append-only.
    async fn events_append(&self, event: EmailEvent) -> std::result::Result<(), StoreError>;
}

/// Breaker-guarded facade over a [`DocumentBackend`].
#[derive(Clone)]
pub struct Datastore {
    backend: Arc<dyn DocumentBackend>,
    breaker: Arc<CircuitBreaker>,
}

impl Datastore {
    /// Wrap a backend with the document-store breaker.
    pub fn new(backend: Arc<dyn DocumentBackend>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { backend, breaker }
    }

    /// Insert a waitlist record.
    pub async fn waitlist_insert(&self, record: WaitlistRecord) -> Result<()> {
        let backend = self.backend.clone();
        self.breaker
            .execute(|| async move { backend.waitlist_insert(record).await.map_err(Into::into) })
            .await
    }

    /// Fetch a waitlist record by id.
    pub async fn waitlist_get(&self, id: &str) -> Result<Option<WaitlistRecord>> {
        let backend = self.backend.clone();
        let id = id.to_string();
        self.breaker
            .execute(|| async move { backend.waitlist_get(&id).await.map_err(Into::into) })
            .await
    }

    /// Look up a waitlist record by normalized email.
    pub async fn waitlist_find_by_email(&self, normalized: &str) -> Result<Option<WaitlistRecord>> {
        let backend = self.backend.clone();
        let normalized = normalized.to_string();
        self.breaker
            .execute(|| async move {
                backend
                    .waitlist_find_by_email(&normalized)
                    .await
                    .map_err(Into::into)
            })
            .await
    }

    /// Atomically apply a confirmation-field update.
    pub async fn waitlist_update_confirmation(
        &self,
        id: &str,
        update: ConfirmationUpdate,
    ) -> Result<()> {
        let backend = self.backend.clone();
        let id = id.to_string();
        self.breaker
            .execute(|| async move {
                backend
                    .waitlist_update_confirmation(&id, update)
                    .await
                    .map_err(Into::into)
            })
            .await
    }

    /// Atomically set a record's status.
    pub async fn waitlist_set_status(&self, id: &str, status: WaitlistStatus) -> Result<()> {
        let backend = self.backend.clone();
        let id = id.to_string();
        self.breaker
            .execute(|| async move {
                backend
                    .waitlist_set_status(&id, status)
                    .await
                    .map_err(Into::into)
            })
            .await
    }

    /// Fetch a dead-letter entry by waitlist id.
    pub async fn dlq_get(&self, waitlist_id: &str) -> Result<Option<DeadLetterEntry>> {
        let backend = self.backend.clone();
        let waitlist_id = waitlist_id.to_string();
        self.breaker
            .execute(|| async move { backend.dlq_get(&waitlist_id).await.map_err(Into::into) })
            .await
    }

    /// Create or replace a dead-letter entry.
    pub async fn dlq_set(&self, entry: DeadLetterEntry) -> Result<()> {
        let backend = self.backend.clone();
        self.breaker
            .execute(|| async move { backend.dlq_set(entry).await.map_err(Into::into) })
            .await
    }

    /// Delete a dead-letter entry.
    pub async fn dlq_delete(&self, waitlist_id: &str) -> Result<()> {
        let backend = self.backend.clone();
        let waitlist_id = waitlist_id.to_string();
        self.breaker
            .execute(|| async move { backend.dlq_delete(&waitlist_id).await.map_err(Into::into) })
            .await
    }

    /// List all dead-letter entries.
    pub async fn dlq_list(&self) -> Result<Vec<DeadLetterEntry>> {
        let backend = self.backend.clone();
        self.breaker
            .execute(|| async move { backend.dlq_list().await.map_err(Into::into) })
            .await
    }

    /// Append a delivery event.
    pub async fn events_append(&self, event: EmailEvent) -> Result<()> {
        let backend = self.backend.clone();
        self.breaker
            .execute(|| async move { backend.events_append(event).await.map_err(Into::into) })
            .await
    }
}
