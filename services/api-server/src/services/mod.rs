//! Business logic between the handlers and the repositories.
//!
//! Every public operation is counted in [`OperationMetrics`]. Reads go
//! through the TTL cache, writes invalidate their service's key prefix.

pub mod mine;
pub mod partner;
pub mod product;
pub mod production;

pub use mine::{MineService, MineStatistics};
pub use partner::PartnerService;
pub use product::ProductService;
pub use production::{ProductionService, ProductionSummary};

use bauxite_models::{ListOptions, Page, MAX_PER_PAGE};
use bauxite_utils::{BauxiteResult, OperationMetrics, TtlCache};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::time::Duration;

/// Largest `limit` accepted by the search endpoints.
pub const MAX_SEARCH_LIMIT: u32 = 50;

/// Cache and metrics handles shared by all services.
#[derive(Clone)]
pub struct ServiceContext {
    pub cache: TtlCache,
    pub metrics: OperationMetrics,
    pub search_ttl: Duration,
}

impl ServiceContext {
    pub async fn track<T, F>(&self, service: &str, operation: &str, fut: F) -> BauxiteResult<T>
    where
        F: Future<Output = BauxiteResult<T>>,
    {
        self.metrics.track(service, operation, fut).await
    }

    /// Serves `key` from the cache, or awaits `load` and caches its result.
    pub async fn cached<T, F>(&self, service: &str, key: String, ttl: Duration, load: F) -> BauxiteResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = BauxiteResult<T>>,
    {
        if let Some(hit) = self.cache.get::<T>(&key).await {
            self.metrics.record_cache(service, true);
            return Ok(hit);
        }
        self.metrics.record_cache(service, false);

        let generation = self.cache.generation();
        let value = load.await?;
        // a write that invalidated meanwhile wins; the value is served but not kept
        self.cache.set_if_current(key, &value, ttl, generation).await;
        Ok(value)
    }

    pub fn default_ttl(&self) -> Duration {
        self.cache.default_ttl()
    }

    pub async fn invalidate(&self, prefix: &str) {
        self.cache.invalidate_prefix(prefix).await;
    }
}

/// Walks every page of a listing.
pub(crate) async fn collect_pages<T, F, Fut>(mut fetch: F) -> BauxiteResult<Vec<T>>
where
    F: FnMut(ListOptions) -> Fut,
    Fut: Future<Output = BauxiteResult<Page<T>>>,
{
    let mut items = Vec::new();
    let mut page = 1;
    loop {
        let batch = fetch(ListOptions::page(page, MAX_PER_PAGE)).await?;
        let pages = batch.pages;
        items.extend(batch.items);
        if page >= pages {
            return Ok(items);
        }
        page += 1;
    }
}

/// Prefixes each message, e.g. `Product 2: name is required`.
pub(crate) fn prefixed(prefix: &str, messages: Vec<String>) -> impl Iterator<Item = String> + '_ {
    messages
        .into_iter()
        .map(move |message| format!("{}: {}", prefix, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bauxite_utils::CacheConfig;

    fn context() -> ServiceContext {
        ServiceContext {
            cache: TtlCache::new(&CacheConfig {
                enabled: true,
                default_ttl_seconds: 300,
                search_ttl_seconds: 60,
            }),
            metrics: OperationMetrics::new("test").unwrap(),
            search_ttl: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_cached_loads_once() {
        let ctx = context();
        let first: i32 = ctx
            .cached("mine", "mine:1".to_string(), ctx.default_ttl(), async { Ok(1) })
            .await
            .unwrap();
        let second: i32 = ctx
            .cached("mine", "mine:1".to_string(), ctx.default_ttl(), async { Ok(2) })
            .await
            .unwrap();

        assert_eq!((first, second), (1, 1));
        let snapshot = ctx.metrics.snapshot("mine");
        assert_eq!(snapshot["cache"]["hits"], 1);
        assert_eq!(snapshot["cache"]["misses"], 1);
    }

    #[tokio::test]
    async fn test_invalidation_during_load_is_not_overwritten() {
        let ctx = context();
        let (loaded_tx, loaded_rx) = tokio::sync::oneshot::channel::<&'static str>();

        let read = ctx.cached("production", "production:1".to_string(), ctx.default_ttl(), async {
            Ok(loaded_rx.await.unwrap_or("closed").to_string())
        });
        let write = async {
            tokio::task::yield_now().await;
            // the status change lands while the read is still loading
            ctx.invalidate("production:").await;
            loaded_tx.send("draft").unwrap();
        };
        let (stale, ()) = tokio::join!(read, write);
        assert_eq!(stale.unwrap(), "draft");

        let fresh: String = ctx
            .cached("production", "production:1".to_string(), ctx.default_ttl(), async {
                Ok("active".to_string())
            })
            .await
            .unwrap();
        assert_eq!(fresh, "active");
    }

    #[tokio::test]
    async fn test_collect_pages_follows_page_count() {
        let all: Vec<u32> = (1..=250).collect();
        let items = collect_pages(|options: ListOptions| {
            let all = all.clone();
            async move {
                let slice = all
                    .iter()
                    .copied()
                    .skip(options.offset() as usize)
                    .take(options.limit() as usize)
                    .collect();
                Ok(Page::new(slice, &options, all.len() as i64))
            }
        })
        .await
        .unwrap();

        assert_eq!(items.len(), 250);
    }
}
