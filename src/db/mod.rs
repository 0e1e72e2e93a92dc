//! Database connection pool, migrations, and health check.
//!
//! The record store and the queue broker each get their own `Db`, since
//! their endpoints can be configured separately. With no override both
//! point at the same Postgres.

pub mod pgmq;
pub mod records;

pub use pgmq::PgmqChannel;
pub use records::PgRecordStore;

use std::time::Duration;

use crate::error::{Error, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Database handle. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    ///
    /// `timeout` bounds both the initial connect and every later pool
    /// acquire, so no store or queue call can wait forever on a connection.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(timeout)
            .connect(url)
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Run all pending migrations (pgmq extension, dedup bookkeeping).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
