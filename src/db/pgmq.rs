//! pgmq queue channel via direct SQLx.
//!
//! pgmq itself is a plain FIFO per queue. Dedup and ordering keys are
//! layered on top in the same transaction as `pgmq.send`:
//!
//! - an advisory lock per (queue, ordering key) serializes senders in a group;
//! - a second lock per (queue, dedup key) serializes senders of one key
//!   across groups, always taken after the group lock;
//! - `intake_dedup` absorbs repeat dedup keys inside the window and is pruned
//!   of expired rows on every send;
//! - `intake_sequences` numbers messages within each group.
//!
//! The two lock kinds use separate advisory key spaces (classid 1 and 2).

use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;

use super::Db;
use crate::config::validate_identifier;
use crate::error::{Error, Result};
use crate::model::{OutboundMessage, PublishReceipt, QueueAddress};
use crate::queue::QueueChannel;
use crate::telemetry::metrics;

/// A message read from a pgmq queue.
#[derive(Debug, Clone)]
pub struct PgmqMessage {
    pub msg_id: i64,
    pub read_ct: i32,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub vt: chrono::DateTime<chrono::Utc>,
    pub message: serde_json::Value,
}

/// `QueueChannel` over pgmq.
#[derive(Debug, Clone)]
pub struct PgmqChannel {
    db: Db,
    dedup_window: Duration,
}

fn count_op(queue_name: &str, operation: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", queue_name.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}

fn publish_err(e: sqlx::Error) -> Error {
    Error::Publish(e.to_string())
}

impl PgmqChannel {
    pub fn new(db: Db, dedup_window: Duration) -> Self {
        Self { db, dedup_window }
    }

    /// Create a pgmq queue (idempotent).
    pub async fn create_queue(&self, queue_name: &str) -> Result<()> {
        validate_identifier(queue_name)?;
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(self.db.pool())
            .await?;
        count_op(queue_name, "create");
        Ok(())
    }

    /// Read the next message from a queue (visibility timeout in seconds).
    /// Returns None if queue is empty.
    pub async fn read(&self, queue_name: &str, vt_seconds: i32) -> Result<Option<PgmqMessage>> {
        let row = sqlx::query_as::<
            _,
            (
                i64,
                i32,
                chrono::DateTime<chrono::Utc>,
                chrono::DateTime<chrono::Utc>,
                serde_json::Value,
            ),
        >("SELECT msg_id, read_ct, enqueued_at, vt, message FROM pgmq.read($1, $2, 1)")
        .bind(queue_name)
        .bind(vt_seconds)
        .fetch_optional(self.db.pool())
        .await?;

        let msg = row.map(|(msg_id, read_ct, enqueued_at, vt, message)| PgmqMessage {
            msg_id,
            read_ct,
            enqueued_at,
            vt,
            message,
        });
        count_op(
            queue_name,
            if msg.is_some() { "read" } else { "read_empty" },
        );
        Ok(msg)
    }
}

/// Drop dedup rows for `queue` that have left the window.
async fn prune_dedup(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    queue: &str,
    window: Duration,
) -> Result<u64> {
    let pruned = sqlx::query(
        "DELETE FROM intake_dedup
         WHERE queue_name = $1
         AND accepted_at <= now() - make_interval(secs => $2::double precision)",
    )
    .bind(queue)
    .bind(window.as_secs_f64())
    .execute(&mut **tx)
    .await
    .map_err(publish_err)?
    .rows_affected();
    Ok(pruned)
}

#[async_trait]
impl QueueChannel for PgmqChannel {
    async fn resolve_address(&self, name: &str) -> Result<QueueAddress> {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT queue_name FROM pgmq.meta WHERE queue_name = $1")
                .bind(name)
                .fetch_optional(self.db.pool())
                .await
                .map_err(publish_err)?;
        count_op(name, "resolve");

        match found {
            Some((queue_name,)) => Ok(QueueAddress {
                url: format!("pgmq://{queue_name}"),
                name: queue_name,
            }),
            None => Err(Error::QueueNotFound(name.to_string())),
        }
    }

    async fn publish(
        &self,
        address: &QueueAddress,
        message: &OutboundMessage,
    ) -> Result<PublishReceipt> {
        let queue = &address.name;
        let mut tx = self.db.pool().begin().await.map_err(publish_err)?;

        // Held until commit; later senders in the same group wait here.
        sqlx::query("SELECT pg_advisory_xact_lock(1, hashtext($1 || ':' || $2))")
            .bind(queue)
            .bind(&message.ordering_key)
            .execute(&mut *tx)
            .await
            .map_err(publish_err)?;
        sqlx::query("SELECT pg_advisory_xact_lock(2, hashtext($1 || ':' || $2))")
            .bind(queue)
            .bind(&message.dedup_key)
            .execute(&mut *tx)
            .await
            .map_err(publish_err)?;

        prune_dedup(&mut tx, queue, self.dedup_window).await?;

        let seen: Option<(i64, i64, String)> = sqlx::query_as(
            "SELECT message_id, sequence_number, ordering_key FROM intake_dedup
             WHERE queue_name = $1 AND dedup_key = $2
             AND accepted_at > now() - make_interval(secs => $3::double precision)",
        )
        .bind(queue)
        .bind(&message.dedup_key)
        .bind(self.dedup_window.as_secs_f64())
        .fetch_optional(&mut *tx)
        .await
        .map_err(publish_err)?;

        if let Some((message_id, sequence_number, ordering_key)) = seen {
            tx.commit().await.map_err(publish_err)?;
            count_op(queue, "send_duplicate");
            return Ok(PublishReceipt {
                message_id,
                sequence_number,
                dedup_key: message.dedup_key.clone(),
                ordering_key,
                duplicate: true,
            });
        }

        let (sequence_number,): (i64,) = sqlx::query_as(
            "INSERT INTO intake_sequences (queue_name, ordering_key, last_sequence)
             VALUES ($1, $2, 1)
             ON CONFLICT (queue_name, ordering_key)
             DO UPDATE SET last_sequence = intake_sequences.last_sequence + 1
             RETURNING last_sequence",
        )
        .bind(queue)
        .bind(&message.ordering_key)
        .fetch_one(&mut *tx)
        .await
        .map_err(publish_err)?;

        let envelope = serde_json::json!({
            "dedup_id": message.dedup_key,
            "group_id": message.ordering_key,
            "sequence_number": sequence_number,
            "body": message.payload,
        });
        let (message_id,): (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, $3)")
            .bind(queue)
            .bind(&envelope)
            .bind(0i32)
            .fetch_one(&mut *tx)
            .await
            .map_err(publish_err)?;

        sqlx::query(
            "INSERT INTO intake_dedup (queue_name, dedup_key, ordering_key, message_id, sequence_number, accepted_at)
             VALUES ($1, $2, $3, $4, $5, now())
             ON CONFLICT (queue_name, dedup_key) DO UPDATE SET
                ordering_key = EXCLUDED.ordering_key,
                message_id = EXCLUDED.message_id,
                sequence_number = EXCLUDED.sequence_number,
                accepted_at = EXCLUDED.accepted_at",
        )
        .bind(queue)
        .bind(&message.dedup_key)
        .bind(&message.ordering_key)
        .bind(message_id)
        .bind(sequence_number)
        .execute(&mut *tx)
        .await
        .map_err(publish_err)?;

        tx.commit().await.map_err(publish_err)?;
        count_op(queue, "send");

        Ok(PublishReceipt {
            message_id,
            sequence_number,
            dedup_key: message.dedup_key.clone(),
            ordering_key: message.ordering_key.clone(),
            duplicate: false,
        })
    }
}
