//! In-memory record store for tests and local runs.
//!
//! Single-process only, nothing persists. Failures can be injected to drive
//! the intake state machine down each of its exits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::RecordStore;
use crate::error::{Error, Result};
use crate::model::{EventId, EventRecord, Status, StatusEntry};

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<EventId, EventRecord>>,
    /// Sticky: every call fails as if the store were down.
    unavailable: AtomicBool,
    /// Single-shot: the next create is rejected.
    fail_next_create: AtomicBool,
    /// Sticky: every status update is rejected.
    fail_updates: AtomicBool,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::Other("record store lock poisoned".to_string())
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a record directly, bypassing failure injection.
    pub fn seed(&self, record: EventRecord) -> Result<()> {
        self.records
            .write()
            .map_err(poison_err)?
            .insert(record.event_id.clone(), record);
        Ok(())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::StoreUnavailable("memory store marked unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create_record(&self, record: &EventRecord) -> Result<()> {
        self.check_available()?;
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(Error::RecordWrite("injected create failure".to_string()));
        }
        let mut records = self.records.write().map_err(poison_err)?;
        let mut stored = record.clone();
        // creation_date is kept from the first write; the rest is replaced.
        if let Some(existing) = records.get(&record.event_id) {
            stored.creation_date = existing.creation_date;
        }
        records.insert(record.event_id.clone(), stored);
        Ok(())
    }

    async fn update_status(&self, event_id: &EventId, history: &[StatusEntry]) -> Result<()> {
        self.check_available()?;
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Error::RecordWrite("injected update failure".to_string()));
        }
        let mut records = self.records.write().map_err(poison_err)?;
        let record = records
            .get_mut(event_id)
            .ok_or_else(|| Error::NotFound(event_id.to_string()))?;
        record.status_history = history.to_vec();
        Ok(())
    }

    async fn get_record(&self, event_id: &EventId) -> Result<Option<EventRecord>> {
        self.check_available()?;
        Ok(self.records.read().map_err(poison_err)?.get(event_id).cloned())
    }

    async fn list_by_status(
        &self,
        status: &Status,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EventRecord>> {
        self.check_available()?;
        let records = self.records.read().map_err(poison_err)?;
        let mut matching: Vec<EventRecord> = records
            .values()
            .filter(|r| r.current().is_some_and(|e| &e.status == status))
            .filter(|r| r.creation_date < older_than)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.creation_date);
        matching.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(matching)
    }
}
