//! Link CRUD against a single partition.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, ErrorCode, OptionalExtension, Row};

use super::connection::PartitionStore;
use crate::Error;
use crate::record::{NewLink, ShortLinkRecord, from_millis, to_millis};
use crate::repository::LinkRepository;

const SELECT_COLUMNS: &str = "SELECT id, short_code, target_url, created_at, expires_at, click_count FROM links";

/// Live records only: the expiry filter applied to every lookup.
const LIVE: &str = "(expires_at IS NULL OR expires_at > ?2)";

fn map_row(row: &Row<'_>) -> rusqlite::Result<ShortLinkRecord> {
    Ok(ShortLinkRecord {
        id: row.get(0)?,
        short_code: row.get(1)?,
        target_url: row.get(2)?,
        created_at: from_millis(row.get(3)?),
        expires_at: row.get::<_, Option<i64>>(4)?.map(from_millis),
        click_count: row.get(5)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[async_trait]
impl LinkRepository for PartitionStore {
    async fn create(&self, link: NewLink) -> Result<ShortLinkRecord, Error> {
        link.validate()?;
        let created_at = from_millis(to_millis(Utc::now()));

        self.conn
            .call(move |conn| -> Result<ShortLinkRecord, Error> {
                let inserted = conn.execute(
                    "INSERT INTO links (short_code, target_url, created_at, expires_at, click_count)
                     VALUES (?1, ?2, ?3, ?4, 0)",
                    params![
                        &link.short_code,
                        &link.target_url,
                        to_millis(created_at),
                        link.expires_at.map(to_millis),
                    ],
                );
                match inserted {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => return Err(Error::AlreadyExists(link.short_code)),
                    Err(e) => return Err(e.into()),
                }

                Ok(ShortLinkRecord {
                    id: conn.last_insert_rowid(),
                    short_code: link.short_code,
                    target_url: link.target_url,
                    created_at,
                    expires_at: link.expires_at.map(|at| from_millis(to_millis(at))),
                    click_count: 0,
                })
            })
            .await
            .map_err(Error::from)
    }

    async fn get_by_code(&self, code: &str) -> Result<ShortLinkRecord, Error> {
        let code = code.to_string();
        let now = to_millis(Utc::now());
        self.conn
            .call(move |conn| -> Result<ShortLinkRecord, Error> {
                let sql = format!("{SELECT_COLUMNS} WHERE short_code = ?1 AND {LIVE}");
                let found = conn.query_row(&sql, params![code, now], map_row).optional()?;
                found.ok_or(Error::NotFound(code))
            })
            .await
            .map_err(Error::from)
    }

    async fn get_by_id(&self, id: i64) -> Result<ShortLinkRecord, Error> {
        let now = to_millis(Utc::now());
        self.conn
            .call(move |conn| -> Result<ShortLinkRecord, Error> {
                let sql = format!("{SELECT_COLUMNS} WHERE id = ?1 AND {LIVE}");
                let found = conn.query_row(&sql, params![id, now], map_row).optional()?;
                found.ok_or_else(|| Error::NotFound(format!("id {id}")))
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, code: &str) -> Result<(), Error> {
        let code = code.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let deleted = conn.execute("DELETE FROM links WHERE short_code = ?1", params![code])?;
                if deleted == 0 {
                    return Err(Error::NotFound(code));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn increment_clicks(&self, code: &str) -> Result<(), Error> {
        let code = code.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let updated =
                    conn.execute("UPDATE links SET click_count = click_count + 1 WHERE short_code = ?1", params![code])?;
                if updated == 0 {
                    return Err(Error::NotFound(code));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn batch_increment_clicks(&self, counts: &HashMap<String, u64>) -> Result<u64, Error> {
        if counts.is_empty() {
            return Ok(0);
        }
        let counts: Vec<(String, i64)> = counts
            .iter()
            .map(|(code, n)| (code.clone(), i64::try_from(*n).unwrap_or(i64::MAX)))
            .collect();

        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let mut updated = 0u64;
                {
                    let mut stmt =
                        tx.prepare("UPDATE links SET click_count = click_count + ?1 WHERE short_code = ?2")?;
                    for (code, n) in &counts {
                        updated += stmt.execute(params![n, code])? as u64;
                    }
                }
                tx.commit()?;
                Ok(updated)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete_expired(&self) -> Result<u64, Error> {
        let now = to_millis(Utc::now());
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count =
                    conn.execute("DELETE FROM links WHERE expires_at IS NOT NULL AND expires_at <= ?1", params![now])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    async fn exists(&self, code: &str) -> Result<bool, Error> {
        let code = code.to_string();
        let now = to_millis(Utc::now());
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let sql = format!("SELECT EXISTS(SELECT 1 FROM links WHERE short_code = ?1 AND {LIVE})");
                let exists: bool = conn.query_row(&sql, params![code, now], |row| row.get(0))?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    async fn store() -> PartitionStore {
        PartitionStore::open_in_memory().await.unwrap()
    }

    /// Insert a row directly, bypassing validation, so expired fixtures can exist.
    async fn insert_raw(store: &PartitionStore, code: &str, expires_at_ms: Option<i64>) {
        let code = code.to_string();
        store
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO links (short_code, target_url, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
                    params![code, "https://example.com", 0i64, expires_at_ms],
                )
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = store().await;
        let created = store.create(NewLink::new("abc1", "https://example.com")).await.unwrap();
        assert!(created.id > 0);
        assert_eq!(created.click_count, 0);

        let fetched = store.get_by_code("abc1").await.unwrap();
        assert_eq!(fetched, created);

        let by_id = store.get_by_id(created.id).await.unwrap();
        assert_eq!(by_id, created);
    }

    #[tokio::test]
    async fn test_create_duplicate_code() {
        let store = store().await;
        store.create(NewLink::new("dup", "https://example.com")).await.unwrap();
        let result = store.create(NewLink::new("dup", "https://other.com")).await;
        assert!(matches!(result, Err(Error::AlreadyExists(code)) if code == "dup"));
    }

    #[tokio::test]
    async fn test_only_unique_constraint_counts_as_duplicate() {
        let store = store().await;
        let violations = store
            .conn
            .call(|conn| -> rusqlite::Result<(bool, bool, bool)> {
                let not_null = conn
                    .execute("INSERT INTO links (short_code, target_url, created_at) VALUES ('n', NULL, 0)", [])
                    .unwrap_err();
                let check = conn
                    .execute(
                        "INSERT INTO links (short_code, target_url, created_at, click_count) VALUES ('c', 'x', 0, -1)",
                        [],
                    )
                    .unwrap_err();
                conn.execute("INSERT INTO links (short_code, target_url, created_at) VALUES ('u', 'x', 0)", [])?;
                let unique = conn
                    .execute("INSERT INTO links (short_code, target_url, created_at) VALUES ('u', 'x', 0)", [])
                    .unwrap_err();
                Ok((is_unique_violation(&not_null), is_unique_violation(&check), is_unique_violation(&unique)))
            })
            .await
            .unwrap();
        assert_eq!(violations, (false, false, true));
    }

    #[tokio::test]
    async fn test_create_validates_before_io() {
        let store = store().await;
        store.close().await.unwrap();
        let result = store.create(NewLink::new("", "https://example.com")).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = store().await;
        assert!(matches!(store.get_by_code("nope").await, Err(Error::NotFound(_))));
        assert!(matches!(store.get_by_id(42).await, Err(Error::NotFound(_))));
        assert!(!store.exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_records_are_invisible() {
        let store = store().await;
        let past = to_millis(Utc::now() - TimeDelta::seconds(10));
        insert_raw(&store, "old", Some(past)).await;

        assert!(store.get_by_code("old").await.unwrap_err().is_not_found());
        assert!(!store.exists("old").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = store().await;
        store.create(NewLink::new("gone", "https://example.com")).await.unwrap();
        store.delete("gone").await.unwrap();
        assert!(!store.exists("gone").await.unwrap());
        assert!(matches!(store.delete("gone").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_increment_clicks() {
        let store = store().await;
        store.create(NewLink::new("hot", "https://example.com")).await.unwrap();
        store.increment_clicks("hot").await.unwrap();
        store.increment_clicks("hot").await.unwrap();
        assert_eq!(store.get_by_code("hot").await.unwrap().click_count, 2);
        assert!(store.increment_clicks("cold").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_batch_increment_skips_unknown_codes() {
        let store = store().await;
        store.create(NewLink::new("a", "https://example.com")).await.unwrap();
        store.create(NewLink::new("b", "https://example.com")).await.unwrap();

        let counts = HashMap::from([("a".to_string(), 5), ("b".to_string(), 1), ("missing".to_string(), 9)]);
        let updated = store.batch_increment_clicks(&counts).await.unwrap();
        assert_eq!(updated, 2);
        assert_eq!(store.get_by_code("a").await.unwrap().click_count, 5);
        assert_eq!(store.get_by_code("b").await.unwrap().click_count, 1);

        assert_eq!(store.batch_increment_clicks(&HashMap::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let store = store().await;
        let past = to_millis(Utc::now() - TimeDelta::seconds(10));
        let future = to_millis(Utc::now() + TimeDelta::hours(1));
        insert_raw(&store, "expired", Some(past)).await;
        insert_raw(&store, "later", Some(future)).await;
        insert_raw(&store, "forever", None).await;

        assert_eq!(store.delete_expired().await.unwrap(), 1);
        assert!(store.exists("later").await.unwrap());
        assert!(store.exists("forever").await.unwrap());
        assert_eq!(store.delete_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_partition_reports_transient_error() {
        let store = store().await;
        store.close().await.unwrap();
        let err = store.get_by_code("abc").await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::TransientIo);
        assert!(store.health_check().await.is_err());
    }
}
