//! Queue channel capability.
//!
//! An ordered, deduplicating delivery channel. A named channel is resolved
//! to an address, then messages are published carrying a dedup key (the
//! event id) and an ordering key. Messages sharing an ordering key are
//! delivered in publish order; a dedup key seen inside the broker's dedup
//! window is absorbed and the original receipt returned.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{OutboundMessage, PublishReceipt, QueueAddress};

#[async_trait]
pub trait QueueChannel: Send + Sync {
    /// Returns `Error::QueueNotFound` if no channel has this name.
    async fn resolve_address(&self, name: &str) -> Result<QueueAddress>;

    /// Returns `Error::Publish` if the broker did not accept the message.
    async fn publish(
        &self,
        address: &QueueAddress,
        message: &OutboundMessage,
    ) -> Result<PublishReceipt>;
}
