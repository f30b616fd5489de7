//! Consistent-hash shard router.
//!
//! Maps a routing key (the short code) onto one of a fixed set of partitions.
//! Each shard contributes `virtual_nodes` points to a ring seeded by
//! `"shard-{i}-vn-{v}"` and hashed with CRC-32 (IEEE). A key belongs to the
//! first ring point at or after its own hash, wrapping to the start of the
//! ring. The ring is built once and never changes, so placement is a pure
//! function of the key and the shard configuration.
//!
//! With a single partition there is no ring and every key routes to shard 0.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::Error;
use crate::config::PartitionConfig;
use crate::repository::LinkRepository;
use crate::store::PartitionStore;

/// Default ring points per shard.
pub const DEFAULT_VIRTUAL_NODES: usize = 150;

/// A backing-store partition the router can own.
///
/// A partition is itself a plain repository over its own slice of the data.
#[async_trait]
pub trait Partition: LinkRepository {
    async fn ping(&self) -> Result<(), Error>;

    async fn close(&self) -> Result<(), Error>;
}

#[async_trait]
impl Partition for PartitionStore {
    async fn ping(&self) -> Result<(), Error> {
        PartitionStore::ping(self).await
    }

    async fn close(&self) -> Result<(), Error> {
        PartitionStore::close(self).await
    }
}

/// Router settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterOptions {
    pub virtual_nodes: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self { virtual_nodes: DEFAULT_VIRTUAL_NODES }
    }
}

/// 32-bit placement hash shared by ring points and keys.
pub fn hash_key(key: &str) -> u32 {
    crc32fast::hash(key.as_bytes())
}

/// One point on the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct RingPoint {
    hash: u32,
    shard: usize,
}

/// Immutable consistent-hash ring.
#[derive(Debug, Clone)]
pub struct HashRing {
    points: Vec<RingPoint>,
    shard_count: usize,
}

impl HashRing {
    /// Build the ring for `shard_count` shards.
    ///
    /// Points are sorted by hash; on a hash collision the lower shard index
    /// sorts first and wins.
    pub fn new(shard_count: usize, virtual_nodes: usize) -> Self {
        let mut points = Vec::with_capacity(shard_count * virtual_nodes);
        for shard in 0..shard_count {
            for vn in 0..virtual_nodes {
                points.push(RingPoint { hash: hash_key(&format!("shard-{shard}-vn-{vn}")), shard });
            }
        }
        points.sort_unstable();
        Self { points, shard_count }
    }

    /// Shard index owning `key`.
    pub fn locate(&self, key: &str) -> usize {
        if self.points.is_empty() {
            return 0;
        }
        let hash = hash_key(key);
        let idx = self.points.partition_point(|p| p.hash < hash);
        let idx = if idx == self.points.len() { 0 } else { idx };
        self.points[idx].shard
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

/// Owns every partition and routes keys to them.
pub struct ShardRouter<P = PartitionStore> {
    partitions: Vec<P>,
    /// `None` for single-partition deployments.
    ring: Option<HashRing>,
    closed: AtomicBool,
}

impl<P: Partition> ShardRouter<P> {
    /// Build a router over already-open partitions, in shard index order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `partitions` is empty or `virtual_nodes` is 0
    /// with more than one partition.
    pub fn new(partitions: Vec<P>, options: RouterOptions) -> Result<Self, Error> {
        if partitions.is_empty() {
            return Err(Error::Config("at least one shard is required".into()));
        }
        let ring = if partitions.len() > 1 {
            if options.virtual_nodes == 0 {
                return Err(Error::Config("virtual_nodes must be greater than 0".into()));
            }
            Some(HashRing::new(partitions.len(), options.virtual_nodes))
        } else {
            None
        };

        Ok(Self { partitions, ring, closed: AtomicBool::new(false) })
    }

    /// Index of the shard owning `key`.
    pub fn partition_index(&self, key: &str) -> usize {
        match &self.ring {
            Some(ring) => ring.locate(key),
            None => 0,
        }
    }

    /// Partition owning `key`.
    pub fn route(&self, key: &str) -> &P {
        &self.partitions[self.partition_index(key)]
    }

    pub fn all_partitions(&self) -> &[P] {
        &self.partitions
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Ping every partition in order, failing on the first that does not answer.
    pub async fn health_check(&self) -> Result<(), Error> {
        for (index, partition) in self.partitions.iter().enumerate() {
            partition.ping().await.map_err(|e| e.in_shard(index))?;
        }
        Ok(())
    }

    /// Release every partition.
    ///
    /// All partitions are closed even if one fails; the first failure is
    /// returned. Calls after the first are no-ops.
    pub async fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        close_all(&self.partitions).await
    }
}

impl<P: Partition> ShardRouter<P> {
    /// Open one partition per config entry with `open`.
    ///
    /// Fails fast: if any partition cannot be opened, the ones already
    /// opened are closed before the error is returned.
    pub async fn open_with<F, Fut>(configs: &[PartitionConfig], options: RouterOptions, open: F) -> Result<Self, Error>
    where
        F: Fn(PartitionConfig) -> Fut,
        Fut: Future<Output = Result<P, Error>>,
    {
        if configs.is_empty() {
            return Err(Error::Config("at least one shard is required".into()));
        }

        let mut partitions = Vec::with_capacity(configs.len());
        for (index, config) in configs.iter().enumerate() {
            match open(config.clone()).await {
                Ok(partition) => partitions.push(partition),
                Err(e) => {
                    if let Err(close_err) = close_all(&partitions).await {
                        tracing::warn!("failed to close partitions after open failure: {}", close_err);
                    }
                    return Err(Error::Config(format!("shard {index} ({}) failed to open: {e}", config.path)));
                }
            }
        }

        tracing::info!(shards = partitions.len(), virtual_nodes = options.virtual_nodes, "shard router ready");
        Self::new(partitions, options)
    }
}

impl ShardRouter<PartitionStore> {
    /// Open one SQLite partition per config entry.
    pub async fn open(configs: &[PartitionConfig], options: RouterOptions) -> Result<Self, Error> {
        Self::open_with(configs, options, |config| async move { PartitionStore::connect(&config).await }).await
    }
}

async fn close_all<P: Partition>(partitions: &[P]) -> Result<(), Error> {
    let mut first_err = None;
    for (index, partition) in partitions.iter().enumerate() {
        if let Err(e) = partition.close().await {
            tracing::warn!("failed to close shard {}: {}", index, e);
            if first_err.is_none() {
                first_err = Some(e.in_shard(index));
            }
        }
    }
    first_err.map_or(Ok(()), Err)
}
