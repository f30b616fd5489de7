//! Partition connection management with pragma configuration.
//!
//! This module handles opening a partition's SQLite database, applying
//! required pragmas for concurrency (WAL mode), and running migrations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::migrations;
use crate::Error;
use crate::config::PartitionConfig;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
                       PRAGMA synchronous=NORMAL;
                       PRAGMA temp_store=MEMORY;
                       PRAGMA foreign_keys=ON;";

/// Handle to one backing-store partition.
///
/// Wraps a tokio-rusqlite Connection that runs statements on a background
/// thread. Clones share the same connection and the same closed flag.
#[derive(Clone, Debug)]
pub struct PartitionStore {
    pub(crate) conn: Connection,
    closed: Arc<AtomicBool>,
}

impl PartitionStore {
    /// Open the partition described by `config`.
    pub async fn connect(config: &PartitionConfig) -> Result<Self, Error> {
        if config.is_in_memory() { Self::open_in_memory().await } else { Self::open(&config.path).await }
    }

    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory partition for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn, closed: Arc::new(AtomicBool::new(false)) })
    }

    /// Round-trip a trivial statement.
    pub async fn ping(&self) -> Result<(), Error> {
        self.conn
            .call(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Close the underlying connection.
    ///
    /// Only the first call reaches SQLite; later calls return `Ok(())`.
    pub async fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.conn.clone().close().await.map_err(Error::Database)
    }
}
