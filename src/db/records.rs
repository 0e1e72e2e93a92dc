//! Event record table in Postgres.
//!
//! The table name is configurable, so it is created here rather than by a
//! migration. `current_status` mirrors the last history entry so the
//! reconciliation scan can use an index instead of walking JSONB.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use sqlx::types::Json;

use super::Db;
use crate::config::validate_identifier;
use crate::error::{Error, Result};
use crate::model::{EventId, EventRecord, Status, StatusEntry};
use crate::store::RecordStore;
use crate::telemetry::metrics;

/// `RecordStore` over a Postgres table.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    db: Db,
    table: String,
}

impl PgRecordStore {
    pub fn new(db: Db, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self { db, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the record table and its status index (idempotent).
    pub async fn ensure_table(&self) -> Result<()> {
        let table = &self.table;
        sqlx::raw_sql(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                event_id        TEXT PRIMARY KEY,
                creation_date   TIMESTAMPTZ NOT NULL,
                api_request     TEXT NOT NULL,
                retries         INTEGER NOT NULL DEFAULT 0,
                status_history  JSONB NOT NULL,
                current_status  TEXT NOT NULL,
                updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_status
                ON {table} (current_status, creation_date);"
        ))
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}

fn latest_status(history: &[StatusEntry]) -> Result<&Status> {
    history
        .last()
        .map(|e| &e.status)
        .ok_or_else(|| Error::RecordWrite("status history must not be empty".to_string()))
}

fn count_write(operation: &'static str, ok: bool) {
    metrics::record_writes().add(
        1,
        &[
            KeyValue::new("operation", operation),
            KeyValue::new("result", if ok { "ok" } else { "error" }),
        ],
    );
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn create_record(&self, record: &EventRecord) -> Result<()> {
        let status = latest_status(&record.status_history)?;
        // creation_date is kept from the first write; the rest is replaced.
        let result = sqlx::query(&format!(
            "INSERT INTO {} (event_id, creation_date, api_request, retries, status_history, current_status, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, now())
             ON CONFLICT (event_id) DO UPDATE SET
                api_request = EXCLUDED.api_request,
                retries = EXCLUDED.retries,
                status_history = EXCLUDED.status_history,
                current_status = EXCLUDED.current_status,
                updated_at = now()",
            self.table
        ))
        .bind(record.event_id.as_str())
        .bind(record.creation_date)
        .bind(&record.api_request)
        .bind(record.retries)
        .bind(Json(&record.status_history))
        .bind(status.as_str())
        .execute(self.db.pool())
        .await;

        count_write("create", result.is_ok());
        result.map_err(Error::from_store_write)?;
        Ok(())
    }

    async fn update_status(&self, event_id: &EventId, history: &[StatusEntry]) -> Result<()> {
        let status = latest_status(history)?;
        let result = sqlx::query(&format!(
            "UPDATE {} SET status_history = $1, current_status = $2, updated_at = now()
             WHERE event_id = $3",
            self.table
        ))
        .bind(Json(history))
        .bind(status.as_str())
        .bind(event_id.as_str())
        .execute(self.db.pool())
        .await;

        count_write("update_status", result.is_ok());
        let rows_affected = result.map_err(Error::from_store_write)?.rows_affected();
        if rows_affected == 0 {
            return Err(Error::NotFound(event_id.to_string()));
        }
        Ok(())
    }

    async fn get_record(&self, event_id: &EventId) -> Result<Option<EventRecord>> {
        let row: Option<EventRecordRow> = sqlx::query_as(&format!(
            "SELECT event_id, creation_date, api_request, retries, status_history
             FROM {} WHERE event_id = $1",
            self.table
        ))
        .bind(event_id.as_str())
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(EventRecord::from))
    }

    async fn list_by_status(
        &self,
        status: &Status,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EventRecord>> {
        let rows: Vec<EventRecordRow> = sqlx::query_as(&format!(
            "SELECT event_id, creation_date, api_request, retries, status_history
             FROM {} WHERE current_status = $1 AND creation_date < $2
             ORDER BY creation_date ASC
             LIMIT $3",
            self.table
        ))
        .bind(status.as_str())
        .bind(older_than)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(EventRecord::from).collect())
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct EventRecordRow {
    event_id: String,
    creation_date: DateTime<Utc>,
    api_request: String,
    retries: i32,
    status_history: Json<Vec<StatusEntry>>,
}

impl From<EventRecordRow> for EventRecord {
    fn from(row: EventRecordRow) -> Self {
        EventRecord {
            event_id: EventId(row.event_id),
            creation_date: row.creation_date,
            api_request: row.api_request,
            retries: row.retries,
            status_history: row.status_history.0,
        }
    }
}
