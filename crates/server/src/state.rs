//! Shared server state: the repository stack and the click pipeline.

use std::sync::Arc;

use shardlink_core::cache::RecordCacheOptions;
use shardlink_core::{
    AggregatorOptions, AppConfig, CachingRepository, ClickAggregator, Error, MemoryCache, PartitionStore,
    RecordCache, RedisCache, RemoteCache, RepositorySink, ShardRouter, ShardedRepository,
};

/// Caching decorator over the sharded SQLite partitions.
pub type LinkStack = CachingRepository<ShardedRepository<PartitionStore>>;

pub struct AppState {
    pub links: Arc<LinkStack>,
    pub clicks: ClickAggregator,
    cache: Arc<dyn RemoteCache>,
}

impl AppState {
    /// Open every shard and the remote cache, then start the click pipeline.
    ///
    /// Without a `redis_url` records are cached in process.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let router = ShardRouter::open(&config.shards, config.router_options()).await?;
        let cache = match connect_cache(config.redis_url.as_deref()) {
            Ok(cache) => cache,
            Err(e) => {
                if let Err(close_err) = router.close().await {
                    tracing::warn!("failed to close shards after cache setup failure: {}", close_err);
                }
                return Err(e);
            }
        };
        Ok(Self::assemble(router, cache, config.record_cache_options(), config.aggregator_options()))
    }

    fn assemble(
        router: ShardRouter, cache: Arc<dyn RemoteCache>, cache_options: RecordCacheOptions,
        click_options: AggregatorOptions,
    ) -> Self {
        let records = RecordCache::new(cache.clone(), cache_options);
        let links = Arc::new(CachingRepository::new(ShardedRepository::new(router), records));
        let clicks = ClickAggregator::start(Arc::new(RepositorySink::new(links.clone())), click_options);
        Self { links, clicks, cache }
    }

    /// Drain pending clicks, then release the shards and the cache.
    pub async fn shutdown(&self) {
        self.clicks.stop().await;
        if let Err(e) = self.links.inner().close().await {
            tracing::warn!("failed to close shards: {}", e);
        }
        if let Err(e) = self.cache.close().await {
            tracing::warn!("failed to close cache: {}", e);
        }
        tracing::info!("shutdown complete");
    }

    /// In-memory shards and cache for tests.
    #[cfg(test)]
    pub async fn in_memory(shards: usize) -> Self {
        let configs = vec![shardlink_core::PartitionConfig::in_memory(); shards];
        let router = ShardRouter::open(&configs, Default::default()).await.unwrap();
        Self::assemble(router, Arc::new(MemoryCache::new()), RecordCacheOptions::default(), AggregatorOptions::default())
    }
}

fn connect_cache(redis_url: Option<&str>) -> Result<Arc<dyn RemoteCache>, Error> {
    match redis_url {
        Some(url) => {
            tracing::info!("using redis record cache");
            Ok(Arc::new(RedisCache::connect(url)?))
        }
        None => {
            tracing::info!("no redis_url configured, using in-process record cache");
            Ok(Arc::new(MemoryCache::new()))
        }
    }
}
