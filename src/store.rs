//! Record store capability.
//!
//! A keyed durable store for event records. Intake only needs an
//! unconditional create and a by-key status update; the status scan exists
//! for an external reconciler looking for records stuck in PENDING.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{EventId, EventRecord, Status, StatusEntry};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Write a record. Last write wins when the key already exists.
    ///
    /// Returns `Error::StoreUnavailable` when the store cannot be reached
    /// and `Error::RecordWrite` when it rejects the write.
    async fn create_record(&self, record: &EventRecord) -> Result<()>;

    /// Replace the status history of an existing record.
    ///
    /// Returns `Error::NotFound` if no record has this key.
    async fn update_status(&self, event_id: &EventId, history: &[StatusEntry]) -> Result<()>;

    async fn get_record(&self, event_id: &EventId) -> Result<Option<EventRecord>>;

    /// Records whose latest status is `status` and that were created before
    /// `older_than`, oldest first.
    async fn list_by_status(
        &self,
        status: &Status,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EventRecord>>;
}
