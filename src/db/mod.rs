//! Postgres connection handle shared by the pgmq and SQL sources.
//!
//! Each source owns its own `Db`; nothing is stored in process globals.

pub mod pgmq;
pub mod row;

use crate::error::{Error, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Database handle. Owns the connection pool for one source.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres. The controller is sequential, so a couple of
    /// connections are plenty.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(url)
            .await
            .map_err(|e| Error::Connection(format!("postgres: {e}")))?;
        Ok(Self { pool })
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
