//! Redis-backed remote cache using a deadpool connection pool.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Config as RedisConfig, Connection, Pool, Runtime};

use super::remote::RemoteCache;
use crate::Error;

/// Pooled Redis client.
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    /// Create a pool for `redis_url`. No connection is made until first use.
    pub fn connect(redis_url: &str) -> Result<Self, Error> {
        let pool = RedisConfig::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::Config(format!("failed to create Redis pool: {e}")))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<Connection, Error> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl RemoteCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), Error> {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.conn().await?;
        let _: () = conn.pset_ex(key, value, millis).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        let mut conn = self.conn().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn ping(&self) -> Result<(), Error> {
        let mut conn = self.conn().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(Error::Cache(format!("unexpected PING reply: {pong}")));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.pool.close();
        Ok(())
    }
}
