//! In-memory queue channel for tests and local runs.
//!
//! Keeps the broker contract: per-ordering-key sequence numbers and a dedup
//! window keyed on the dedup key. Keys past the window are forgotten. Resolve and publish failures can be
//! injected.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::QueueChannel;
use crate::error::{Error, Result};
use crate::model::{OutboundMessage, PublishReceipt, QueueAddress};

/// A message accepted by the memory queue.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub queue: String,
    pub message: OutboundMessage,
    pub receipt: PublishReceipt,
}

#[derive(Debug, Default)]
struct QueueState {
    published: Vec<PublishedMessage>,
    /// (queue, dedup key) -> receipt and when it was first accepted.
    dedup: HashMap<(String, String), (PublishReceipt, DateTime<Utc>)>,
    /// (queue, ordering key) -> last sequence number handed out.
    sequences: HashMap<(String, String), i64>,
}

#[derive(Debug)]
pub struct MemoryQueue {
    queues: HashSet<String>,
    dedup_window: Duration,
    state: Mutex<QueueState>,
    next_id: AtomicI64,
    /// Sticky: name resolution fails.
    fail_resolve: AtomicBool,
    /// Sticky: publish fails.
    fail_publish: AtomicBool,
    resolve_calls: AtomicI64,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::Other("queue lock poisoned".to_string())
}

impl MemoryQueue {
    /// A broker that knows the given queue names, with a five minute dedup
    /// window.
    pub fn new<I, S>(queues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queues: queues.into_iter().map(Into::into).collect(),
            dedup_window: Duration::from_secs(300),
            state: Mutex::new(QueueState::default()),
            next_id: AtomicI64::new(1),
            fail_resolve: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
            resolve_calls: AtomicI64::new(0),
        }
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn fail_resolve(&self) {
        self.fail_resolve.store(true, Ordering::SeqCst);
    }

    pub fn fail_publish(&self) {
        self.fail_publish.store(true, Ordering::SeqCst);
    }

    /// Messages actually sent, in publish order. Dedup hits are not listed.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state
            .lock()
            .map(|s| s.published.clone())
            .unwrap_or_default()
    }

    /// Dedup keys still tracked. Expired keys are dropped on the next publish.
    pub fn dedup_len(&self) -> usize {
        self.state.lock().map(|s| s.dedup.len()).unwrap_or_default()
    }

    /// How many times any caller asked to resolve a queue name.
    pub fn resolve_calls(&self) -> i64 {
        self.resolve_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueChannel for MemoryQueue {
    async fn resolve_address(&self, name: &str) -> Result<QueueAddress> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_resolve.load(Ordering::SeqCst) || !self.queues.contains(name) {
            return Err(Error::QueueNotFound(name.to_string()));
        }
        Ok(QueueAddress {
            name: name.to_string(),
            url: format!("memory://{name}"),
        })
    }

    async fn publish(
        &self,
        address: &QueueAddress,
        message: &OutboundMessage,
    ) -> Result<PublishReceipt> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(Error::Publish("injected publish failure".to_string()));
        }

        let now = Utc::now();
        let window = chrono::Duration::from_std(self.dedup_window)
            .map_err(|e| Error::Other(format!("dedup window out of range: {e}")))?;
        let mut state = self.state.lock().map_err(poison_err)?;
        state.dedup.retain(|_, (_, accepted_at)| now - *accepted_at < window);

        let dedup_key = (address.name.clone(), message.dedup_key.clone());
        if let Some((receipt, _)) = state.dedup.get(&dedup_key) {
            return Ok(PublishReceipt {
                duplicate: true,
                ..receipt.clone()
            });
        }

        let sequence = state
            .sequences
            .entry((address.name.clone(), message.ordering_key.clone()))
            .or_insert(0);
        *sequence += 1;

        let receipt = PublishReceipt {
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            sequence_number: *sequence,
            dedup_key: message.dedup_key.clone(),
            ordering_key: message.ordering_key.clone(),
            duplicate: false,
        };

        state.dedup.insert(dedup_key, (receipt.clone(), now));
        state.published.push(PublishedMessage {
            queue: address.name.clone(),
            message: message.clone(),
            receipt: receipt.clone(),
        });
        Ok(receipt)
    }
}
