//! Generation Cache — reuses roadmaps produced for near-identical requests.
//!
//! The cache is an optimization only: every index failure is logged and
//! downgraded (lookup → miss, store → dropped write), and every index call
//! is capped by the cache timeout. It never fails or stalls the request it
//! serves.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::index::{IndexError, Metadata, NewDocument, VectorIndex};
use crate::metrics::CacheCounters;

/// Default acceptance threshold on cosine distance. Exclusive.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.2;
/// Upper bound for a single lookup or store against the index.
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(5);

const QUERY_SEPARATOR: &str = " | ";

pub const META_CAREER_GOAL: &str = "career_goal";
pub const META_PREFERRED_STACK: &str = "preferred_stack";
pub const META_CREATED_AT: &str = "created_at";

/// A previously generated roadmap that matched a lookup.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub id: String,
    pub text: String,
    pub distance: f32,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: Option<usize>,
    pub hits: u64,
    pub misses: u64,
    pub store_failures: u64,
}

#[derive(Clone)]
pub struct GenerationCache {
    index: Arc<dyn VectorIndex>,
    threshold: f32,
    timeout: Duration,
    counters: CacheCounters,
}

/// The text whose embedding keys a cache entry.
pub fn cache_key(career_goal: &str, preferred_stack: &str) -> String {
    format!("{career_goal}{QUERY_SEPARATOR}{preferred_stack}")
}

impl GenerationCache {
    pub fn new(index: Arc<dyn VectorIndex>, counters: CacheCounters) -> Self {
        Self {
            index,
            threshold: DEFAULT_DISTANCE_THRESHOLD,
            timeout: DEFAULT_CACHE_TIMEOUT,
            counters,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Returns the nearest stored roadmap when its distance is strictly
    /// below the threshold. A near miss is a miss.
    pub async fn lookup(&self, career_goal: &str, preferred_stack: &str) -> Option<CacheEntry> {
        let key = cache_key(career_goal, preferred_stack);

        let nearest = match tokio::time::timeout(self.timeout, self.index.query(&key, 1)).await {
            Ok(Ok(mut results)) => results.pop(),
            Ok(Err(e)) => {
                warn!("Cache lookup failed, treating as miss: {e}");
                self.counters.misses.inc();
                return None;
            }
            Err(_) => {
                warn!("Cache lookup timed out after {:?}, treating as miss", self.timeout);
                self.counters.misses.inc();
                return None;
            }
        };

        match nearest {
            Some(hit) if hit.distance < self.threshold => {
                info!("Cache hit (distance {:.4}) for '{}'", hit.distance, key);
                self.counters.hits.inc();
                Some(CacheEntry {
                    id: hit.document.id,
                    text: hit.document.text,
                    distance: hit.distance,
                    metadata: hit.document.metadata,
                })
            }
            Some(hit) => {
                debug!(
                    "Cache miss: nearest distance {:.4} not below {}",
                    hit.distance, self.threshold
                );
                self.counters.misses.inc();
                None
            }
            None => {
                debug!("Cache miss: cache is empty");
                self.counters.misses.inc();
                None
            }
        }
    }

    /// Persists a freshly generated roadmap under a new random id.
    /// Failures and timeouts are logged and dropped.
    pub async fn store(&self, career_goal: &str, preferred_stack: &str, result_text: &str) {
        let write = self.try_store(career_goal, preferred_stack, result_text);
        match tokio::time::timeout(self.timeout, write).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!("Cache write failed, result not cached: {e}");
                self.counters.store_failures.inc();
            }
            Err(_) => {
                warn!("Cache write timed out after {:?}, result not cached", self.timeout);
                self.counters.store_failures.inc();
            }
        }
    }

    /// Runs [`store`](Self::store) on a detached task so the caller can
    /// respond without waiting on the index.
    pub fn store_detached(
        &self,
        career_goal: String,
        preferred_stack: String,
        result_text: String,
    ) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            cache.store(&career_goal, &preferred_stack, &result_text).await;
        })
    }

    async fn try_store(
        &self,
        career_goal: &str,
        preferred_stack: &str,
        result_text: &str,
    ) -> Result<String, IndexError> {
        let id = Uuid::new_v4().to_string();

        let mut metadata = Metadata::new();
        metadata.insert(META_CAREER_GOAL.to_string(), career_goal.into());
        metadata.insert(META_PREFERRED_STACK.to_string(), preferred_stack.into());
        metadata.insert(META_CREATED_AT.to_string(), Utc::now().timestamp().into());

        self.index
            .insert_documents(vec![NewDocument {
                id: id.clone(),
                text: result_text.to_string(),
                embed_text: Some(cache_key(career_goal, preferred_stack)),
                metadata,
            }])
            .await?;

        debug!("Cached roadmap {id}");
        Ok(id)
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = match self.index.count().await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("Could not count cache entries: {e}");
                None
            }
        };
        CacheStats {
            entries,
            hits: self.counters.hits.get(),
            misses: self.counters.misses.get(),
            store_failures: self.counters.store_failures.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::embedding::HashingEmbedder;
    use crate::retrieval::index::{Document, ScoredDocument};
    use crate::retrieval::memory::InMemoryIndex;
    use async_trait::async_trait;

    /// Always returns one document at a fixed distance.
    struct FixedDistanceIndex(f32);

    #[async_trait]
    impl VectorIndex for FixedDistanceIndex {
        async fn insert_documents(&self, _documents: Vec<NewDocument>) -> Result<(), IndexError> {
            Ok(())
        }
        async fn query(&self, _text: &str, _top_k: usize) -> Result<Vec<ScoredDocument>, IndexError> {
            Ok(vec![ScoredDocument {
                document: Document {
                    id: "fixed".into(),
                    text: "cached roadmap".into(),
                    embedding: vec![],
                    metadata: Metadata::new(),
                },
                distance: self.0,
            }])
        }
        async fn contains(&self, _id: &str) -> Result<bool, IndexError> {
            Ok(true)
        }
        async fn count(&self) -> Result<usize, IndexError> {
            Ok(1)
        }
    }

    struct UnavailableIndex;

    #[async_trait]
    impl VectorIndex for UnavailableIndex {
        async fn insert_documents(&self, _documents: Vec<NewDocument>) -> Result<(), IndexError> {
            Err(IndexError::StorageUnavailable("connection refused".into()))
        }
        async fn query(&self, _text: &str, _top_k: usize) -> Result<Vec<ScoredDocument>, IndexError> {
            Err(IndexError::StorageUnavailable("connection refused".into()))
        }
        async fn contains(&self, _id: &str) -> Result<bool, IndexError> {
            Err(IndexError::StorageUnavailable("connection refused".into()))
        }
        async fn count(&self) -> Result<usize, IndexError> {
            Err(IndexError::StorageUnavailable("connection refused".into()))
        }
    }

    /// Sleeps far past any cache timeout on every call.
    struct StalledIndex;

    #[async_trait]
    impl VectorIndex for StalledIndex {
        async fn insert_documents(&self, _documents: Vec<NewDocument>) -> Result<(), IndexError> {
            tokio::time::sleep(Duration::from_secs(90)).await;
            Ok(())
        }
        async fn query(&self, _text: &str, _top_k: usize) -> Result<Vec<ScoredDocument>, IndexError> {
            tokio::time::sleep(Duration::from_secs(90)).await;
            Ok(Vec::new())
        }
        async fn contains(&self, _id: &str) -> Result<bool, IndexError> {
            Ok(false)
        }
        async fn count(&self) -> Result<usize, IndexError> {
            Ok(0)
        }
    }

    fn counters() -> CacheCounters {
        CacheCounters::new().unwrap()
    }

    fn cache_over(index: impl VectorIndex + 'static) -> GenerationCache {
        GenerationCache::new(Arc::new(index), counters())
    }

    fn memory_cache() -> (GenerationCache, Arc<InMemoryIndex>) {
        let index = Arc::new(InMemoryIndex::new(
            "project_roadmaps",
            Arc::new(HashingEmbedder::new()),
        ));
        (GenerationCache::new(index.clone(), counters()), index)
    }

    #[test]
    fn test_cache_key_joins_with_separator() {
        assert_eq!(cache_key("Backend Developer", "Rust"), "Backend Developer | Rust");
        assert_eq!(cache_key("Backend Developer", ""), "Backend Developer | ");
    }

    #[tokio::test]
    async fn test_distance_at_threshold_is_a_miss() {
        let cache = cache_over(FixedDistanceIndex(0.2));
        assert!(cache.lookup("goal", "stack").await.is_none());
    }

    #[tokio::test]
    async fn test_distance_below_threshold_is_a_hit() {
        let cache = cache_over(FixedDistanceIndex(0.199));
        let entry = cache.lookup("goal", "stack").await.unwrap();
        assert_eq!(entry.text, "cached roadmap");
        assert_eq!(entry.id, "fixed");
    }

    #[tokio::test]
    async fn test_custom_threshold_is_honored() {
        let cache = cache_over(FixedDistanceIndex(0.3)).with_threshold(0.35);
        assert!(cache.lookup("goal", "stack").await.is_some());
        assert_eq!(cache.threshold(), 0.35);
    }

    #[tokio::test]
    async fn test_store_then_lookup_returns_text_unchanged() {
        let (cache, _) = memory_cache();
        let roadmap = "Title: Policy Auditor\n\nLearning Roadmap:\n- Step 1: IAM basics";
        cache.store("Backend Developer", "Rust, Postgres", roadmap).await;

        let entry = cache.lookup("Backend Developer", "Rust, Postgres").await.unwrap();
        assert_eq!(entry.text, roadmap);
        assert!(entry.distance < 1e-5);
    }

    #[tokio::test]
    async fn test_store_records_request_metadata() {
        let (cache, _) = memory_cache();
        cache.store("DevOps Engineer", "Terraform", "roadmap").await;

        let entry = cache.lookup("DevOps Engineer", "Terraform").await.unwrap();
        assert_eq!(
            entry.metadata.get(META_CAREER_GOAL).and_then(|v| v.as_str()),
            Some("DevOps Engineer")
        );
        assert_eq!(
            entry.metadata.get(META_PREFERRED_STACK).and_then(|v| v.as_str()),
            Some("Terraform")
        );
        assert!(entry.metadata.get(META_CREATED_AT).and_then(|v| v.as_i64()).is_some());
    }

    #[tokio::test]
    async fn test_unrelated_request_misses() {
        let (cache, _) = memory_cache();
        cache.store("Cloud Security Engineer", "AWS", "security roadmap").await;
        assert!(cache.lookup("Game Developer", "Unity, C#").await.is_none());
    }

    // The hashing embedder normalizes case and whitespace, so this variant
    // lands at distance ~0 and is served from the cache.
    #[tokio::test]
    async fn test_case_and_whitespace_variant_hits() {
        let (cache, _) = memory_cache();
        cache.store("Cloud Security Engineer", "AWS", "security roadmap").await;

        let entry = cache.lookup("Cloud security engineer ", "AWS").await;
        assert_eq!(entry.map(|e| e.text), Some("security roadmap".to_string()));
    }

    #[tokio::test]
    async fn test_empty_cache_misses() {
        let (cache, _) = memory_cache();
        assert!(cache.lookup("anything", "").await.is_none());
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_a_miss() {
        let cache = cache_over(UnavailableIndex);
        assert!(cache.lookup("goal", "stack").await.is_none());
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed_and_counted() {
        let cache = cache_over(UnavailableIndex);
        cache.store("goal", "stack", "roadmap").await;

        let stats = cache.stats().await;
        assert_eq!(stats.store_failures, 1);
        assert_eq!(stats.entries, None);
    }

    #[tokio::test]
    async fn test_each_store_gets_a_distinct_id() {
        let (cache, index) = memory_cache();
        cache.store("goal", "stack", "first").await;
        cache.store("goal", "stack", "second").await;
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_stores_are_all_retrievable() {
        let (cache, index) = memory_cache();
        let goals: Vec<String> = (0..16).map(|i| format!("specialist track {i}")).collect();

        let handles: Vec<_> = goals
            .iter()
            .cloned()
            .map(|goal| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let text = format!("roadmap for {goal}");
                    cache.store(&goal, "Rust", &text).await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(index.count().await.unwrap(), goals.len());
        for goal in &goals {
            let entry = cache.lookup(goal, "Rust").await.unwrap();
            assert_eq!(entry.text, format!("roadmap for {goal}"));
        }
        assert_eq!(cache.stats().await.store_failures, 0);
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let (cache, _) = memory_cache();
        cache.store("Data Scientist", "Python", "roadmap").await;
        cache.lookup("Data Scientist", "Python").await;
        cache.lookup("Embedded Engineer", "C").await;

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_lookup_is_a_miss_within_timeout() {
        let cache = cache_over(StalledIndex);
        let started = tokio::time::Instant::now();

        assert!(cache.lookup("goal", "stack").await.is_none());
        assert!(started.elapsed() <= DEFAULT_CACHE_TIMEOUT + Duration::from_millis(10));
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_store_is_dropped_and_counted() {
        let cache = cache_over(StalledIndex).with_timeout(Duration::from_secs(2));
        let started = tokio::time::Instant::now();

        cache.store("goal", "stack", "roadmap").await;
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(cache.stats().await.store_failures, 1);
    }

    #[tokio::test]
    async fn test_detached_store_completes_in_background() {
        let (cache, index) = memory_cache();
        cache
            .store_detached("Backend Developer".into(), "Go".into(), "roadmap".into())
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
        assert!(cache.lookup("Backend Developer", "Go").await.is_some());
    }

    #[tokio::test]
    async fn test_swapped_goal_and_stack_do_not_hit() {
        let (cache, _) = memory_cache();
        cache.store("Rust", "Backend Developer", "rust-first roadmap").await;
        assert!(cache.lookup("Backend Developer", "Rust").await.is_none());
    }
}
