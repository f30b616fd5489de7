//! Partition schema migrations.
//!
//! Each partition carries its own append-only `_migrations` ledger of
//! `(version, name, applied_at)`. Migrations are applied in order and are
//! idempotent (CREATE IF NOT EXISTS), so a partially migrated shard can be
//! re-opened safely.

use crate::Error;
use tokio_rusqlite::{Connection, params};

/// Migration list: (version, name, SQL).
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "links", include_str!("../../migrations/001_links.sql")),
    (2, "links_expiry_index", include_str!("../../migrations/002_links_expiry_index.sql")),
];

/// Run any pending migrations.
///
/// Creates the `_migrations` ledger if it doesn't exist, reads the highest
/// applied version, and applies everything above it.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` naming the migration whose SQL failed.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(Error::from)?;

        let current: i64 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))
            .map_err(Error::from)?;

        for (version, name, sql) in MIGRATIONS {
            if *version <= current {
                continue;
            }
            conn.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("{version} ({name}): {e}")))?;
            conn.execute(
                "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![version, name, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(Error::from)?;
            tracing::debug!(version, name, "applied migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}
