//! Repository fan-out across shard partitions.
//!
//! Single-key operations route by short code to exactly one partition.
//! Lookups by id cannot be routed and scatter across partitions in index
//! order. Maintenance operations fan out to every partition and stop at the
//! first failing one, reporting how much had already been applied.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;

use super::LinkRepository;
use crate::Error;
use crate::record::{NewLink, ShortLinkRecord};
use crate::router::{Partition, ShardRouter};
use crate::store::PartitionStore;

/// [`LinkRepository`] over every partition of a [`ShardRouter`].
pub struct ShardedRepository<P = PartitionStore> {
    router: ShardRouter<P>,
}

impl<P: Partition> ShardedRepository<P> {
    pub fn new(router: ShardRouter<P>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &ShardRouter<P> {
        &self.router
    }

    /// Partition owning `code`, with its index for error reporting.
    fn partition_for(&self, code: &str) -> (usize, &P) {
        let index = self.router.partition_index(code);
        (index, &self.router.all_partitions()[index])
    }

    pub async fn close(&self) -> Result<(), Error> {
        self.router.close().await
    }
}

/// Shard-tag an error unless it is an authoritative answer about the record.
fn tag(err: Error, index: usize) -> Error {
    match err {
        Error::NotFound(_) | Error::AlreadyExists(_) | Error::Validation(_) => err,
        other => other.in_shard(index),
    }
}

#[async_trait]
impl<P: Partition> LinkRepository for ShardedRepository<P> {
    async fn create(&self, link: NewLink) -> Result<ShortLinkRecord, Error> {
        let (index, partition) = self.partition_for(&link.short_code);
        partition.create(link).await.map_err(|e| tag(e, index))
    }

    async fn get_by_code(&self, code: &str) -> Result<ShortLinkRecord, Error> {
        let (index, partition) = self.partition_for(code);
        partition.get_by_code(code).await.map_err(|e| tag(e, index))
    }

    async fn get_by_id(&self, id: i64) -> Result<ShortLinkRecord, Error> {
        for (index, partition) in self.router.all_partitions().iter().enumerate() {
            match partition.get_by_id(id).await {
                Ok(record) => return Ok(record),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.in_shard(index)),
            }
        }
        Err(Error::NotFound(format!("id {id}")))
    }

    async fn delete(&self, code: &str) -> Result<(), Error> {
        let (index, partition) = self.partition_for(code);
        partition.delete(code).await.map_err(|e| tag(e, index))
    }

    async fn increment_clicks(&self, code: &str) -> Result<(), Error> {
        let (index, partition) = self.partition_for(code);
        partition.increment_clicks(code).await.map_err(|e| tag(e, index))
    }

    /// Splits the counts by owning shard and applies each group in shard
    /// index order.
    async fn batch_increment_clicks(&self, counts: &HashMap<String, u64>) -> Result<u64, Error> {
        let mut groups: BTreeMap<usize, HashMap<String, u64>> = BTreeMap::new();
        for (code, n) in counts {
            groups.entry(self.router.partition_index(code)).or_default().insert(code.clone(), *n);
        }

        let partitions = self.router.all_partitions();
        let mut updated = 0u64;
        for (index, group) in &groups {
            match partitions[*index].batch_increment_clicks(group).await {
                Ok(n) => updated += n,
                Err(e) => {
                    return Err(Error::PartialFailure { shard: *index, completed: updated, source: Box::new(e) });
                }
            }
        }
        Ok(updated)
    }

    async fn delete_expired(&self) -> Result<u64, Error> {
        let mut deleted = 0u64;
        for (index, partition) in self.router.all_partitions().iter().enumerate() {
            match partition.delete_expired().await {
                Ok(n) => deleted += n,
                Err(e) => {
                    return Err(Error::PartialFailure { shard: index, completed: deleted, source: Box::new(e) });
                }
            }
        }
        tracing::debug!("expiry sweep removed {} records", deleted);
        Ok(deleted)
    }

    async fn exists(&self, code: &str) -> Result<bool, Error> {
        let (index, partition) = self.partition_for(code);
        partition.exists(code).await.map_err(|e| tag(e, index))
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.router.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartitionConfig;
    use crate::router::RouterOptions;
    use crate::testing::FakePartition;

    async fn sqlite_shards(n: usize) -> ShardedRepository {
        let router = ShardRouter::open(&vec![PartitionConfig::in_memory(); n], RouterOptions::default()).await.unwrap();
        ShardedRepository::new(router)
    }

    fn fake_shards(n: usize) -> ShardedRepository<FakePartition> {
        let partitions = (0..n).map(|_| FakePartition::default()).collect();
        ShardedRepository::new(ShardRouter::new(partitions, RouterOptions::default()).unwrap())
    }

    /// First `n` codes that route to `shard`.
    fn codes_on(repo: &ShardedRepository<impl Partition>, shard: usize, n: usize) -> Vec<String> {
        (0..)
            .map(|i| format!("c{i}"))
            .filter(|c| repo.router().partition_index(c) == shard)
            .take(n)
            .collect()
    }

    #[tokio::test]
    async fn test_partition_index_is_stable_for_1000_codes() {
        let repo = sqlite_shards(3).await;
        for i in 0..1000 {
            let code = format!("code{i}");
            let first = repo.router().partition_index(&code);
            let second = repo.router().partition_index(&code);
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn test_routed_crud_lands_on_owning_shard() {
        let repo = sqlite_shards(3).await;
        for i in 0..30 {
            repo.create(NewLink::new(format!("k{i}"), "https://example.com")).await.unwrap();
        }
        for i in 0..30 {
            let code = format!("k{i}");
            let owner = repo.router().partition_index(&code);
            for (index, partition) in repo.router().all_partitions().iter().enumerate() {
                assert_eq!(partition.exists(&code).await.unwrap(), index == owner);
            }
            assert_eq!(repo.get_by_code(&code).await.unwrap().short_code, code);
        }

        repo.increment_clicks("k3").await.unwrap();
        assert_eq!(repo.get_by_code("k3").await.unwrap().click_count, 1);
        repo.delete("k3").await.unwrap();
        assert!(!repo.exists("k3").await.unwrap());
        assert!(repo.delete("k3").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_create_is_already_exists() {
        let repo = sqlite_shards(3).await;
        repo.create(NewLink::new("same", "https://example.com")).await.unwrap();
        let err = repo.create(NewLink::new("same", "https://example.com")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_get_by_id_scatters_in_index_order() {
        let repo = fake_shards(3);
        let code = codes_on(&repo, 2, 1).remove(0);
        let created = repo.create(NewLink::new(code, "https://example.com")).await.unwrap();

        assert_eq!(repo.get_by_id(created.id).await.unwrap(), created);
        for p in repo.router().all_partitions() {
            assert_eq!(p.id_lookups(), 1);
        }
        assert!(repo.get_by_id(9_999).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_get_by_id_aborts_on_transport_error() {
        let repo = fake_shards(3);
        let code = codes_on(&repo, 2, 1).remove(0);
        let created = repo.create(NewLink::new(code, "https://example.com")).await.unwrap();
        repo.router().all_partitions()[1].set_down(true);

        let err = repo.get_by_id(created.id).await.unwrap_err();
        assert!(matches!(err, Error::Shard { index: 1, .. }));
        assert_eq!(repo.router().all_partitions()[2].id_lookups(), 0);
    }

    #[tokio::test]
    async fn test_delete_expired_sums_across_shards() {
        let repo = fake_shards(3);
        for shard in 0..3 {
            for code in codes_on(&repo, shard, shard + 1) {
                repo.router().all_partitions()[shard].insert_expired(&code);
            }
        }
        assert_eq!(repo.delete_expired().await.unwrap(), 6);
        assert_eq!(repo.delete_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_expired_reports_partial_count() {
        let repo = fake_shards(3);
        for shard in 0..3 {
            for code in codes_on(&repo, shard, 2) {
                repo.router().all_partitions()[shard].insert_expired(&code);
            }
        }
        repo.router().all_partitions()[1].set_down(true);

        let err = repo.delete_expired().await.unwrap_err();
        assert!(matches!(err, Error::PartialFailure { shard: 1, completed: 2, .. }));
    }

    #[tokio::test]
    async fn test_batch_increment_groups_by_shard() {
        let repo = sqlite_shards(3).await;
        let mut counts = HashMap::new();
        for shard in 0..3 {
            for code in codes_on(&repo, shard, 2) {
                repo.create(NewLink::new(code.clone(), "https://example.com")).await.unwrap();
                counts.insert(code, 3);
            }
        }
        counts.insert("unknown".to_string(), 1);

        assert_eq!(repo.batch_increment_clicks(&counts).await.unwrap(), 6);
        for code in counts.keys().filter(|c| *c != "unknown") {
            assert_eq!(repo.get_by_code(code).await.unwrap().click_count, 3);
        }
    }

    #[tokio::test]
    async fn test_batch_increment_partial_failure() {
        let repo = fake_shards(3);
        let mut counts = HashMap::new();
        for shard in 0..3 {
            for code in codes_on(&repo, shard, 1) {
                repo.create(NewLink::new(code.clone(), "https://example.com")).await.unwrap();
                counts.insert(code, 1);
            }
        }
        repo.router().all_partitions()[2].set_down(true);

        let err = repo.batch_increment_clicks(&counts).await.unwrap_err();
        assert!(matches!(err, Error::PartialFailure { shard: 2, completed: 2, .. }));
    }

    #[tokio::test]
    async fn test_routed_transport_error_names_shard() {
        let repo = fake_shards(3);
        let code = codes_on(&repo, 0, 1).remove(0);
        repo.router().all_partitions()[0].set_down(true);
        let err = repo.get_by_code(&code).await.unwrap_err();
        assert!(matches!(err, Error::Shard { index: 0, .. }));
        assert!(matches!(repo.health_check().await, Err(Error::Shard { index: 0, .. })));
    }
}
