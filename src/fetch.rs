//! The coalesced fetch path
//!
//! Single entry point for everything that touches the upstream: request
//! handlers on a cache miss and the background poller both go through
//! [`SheetFetcher::fetch_and_cache`]. Fetches are coalesced per document,
//! so a burst of misses and an overlapping poll cycle collapse into one
//! upstream call.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cache::SheetCache;
use crate::coalesce::SingleFlight;
use crate::error::SheetsError;
use crate::metrics::UsageMetrics;
use crate::sheets::{SheetData, SheetsApi};

pub struct SheetFetcher {
    client: Arc<dyn SheetsApi>,
    cache: Arc<SheetCache>,
    metrics: Arc<UsageMetrics>,
    coalescer: SingleFlight<HashMap<String, SheetData>, SheetsError>,
}

impl SheetFetcher {
    pub fn new(
        client: Arc<dyn SheetsApi>,
        cache: Arc<SheetCache>,
        metrics: Arc<UsageMetrics>,
    ) -> Self {
        Self {
            client,
            cache,
            metrics,
            coalescer: SingleFlight::new(),
        }
    }

    /// Fetch the given tables of one document and store every returned
    /// table in the cache.
    ///
    /// Coalesced by document id: concurrent callers share one upstream
    /// call and its result. A caller that joins an in-flight fetch may
    /// receive a result produced for an earlier, narrower set of tables;
    /// when that result lacks a requested gid, one direct follow-up fetch
    /// fills the gap, so a table is only ever reported absent after an
    /// upstream call that actually asked for it. Errors propagate to
    /// every waiter and are never cached; existing cache entries are left
    /// untouched on failure.
    pub async fn fetch_and_cache(
        &self,
        spreadsheet_id: &str,
        gids: BTreeSet<String>,
    ) -> Result<HashMap<String, SheetData>, SheetsError> {
        let produced = Arc::new(AtomicBool::new(false));

        let tables = {
            let client = Arc::clone(&self.client);
            let cache = Arc::clone(&self.cache);
            let metrics = Arc::clone(&self.metrics);
            let produced = Arc::clone(&produced);
            let id = spreadsheet_id.to_string();
            let gids = gids.clone();

            self.coalescer
                .run(spreadsheet_id, async move {
                    produced.store(true, Ordering::SeqCst);
                    let tables = client.fetch_tables(&id, &gids).await?;
                    metrics.record_upstream_call(&id);

                    for (gid, data) in &tables {
                        cache.set(&id, gid, data.clone());
                    }
                    Ok(tables)
                })
                .await?
        };

        if produced.load(Ordering::SeqCst) || gids.iter().all(|gid| tables.contains_key(gid)) {
            return Ok(tables);
        }

        // Joined a fetch that was started before some of the requested
        // tables were subscribed. Fetch the full set directly.
        let retry = self.client.fetch_tables(spreadsheet_id, &gids).await?;
        self.metrics.record_upstream_call(spreadsheet_id);
        for (gid, data) in &retry {
            self.cache.set(spreadsheet_id, gid, data.clone());
        }
        Ok(retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::mock::{MockSheetsApi, sample_table};
    use std::time::Duration;

    fn fetcher_with(mock: Arc<MockSheetsApi>) -> (Arc<SheetFetcher>, Arc<SheetCache>) {
        let cache = Arc::new(SheetCache::new(Duration::from_secs(60)));
        let metrics = Arc::new(UsageMetrics::new());
        let fetcher = Arc::new(SheetFetcher::new(mock, Arc::clone(&cache), metrics));
        (fetcher, cache)
    }

    fn gids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_fetch_populates_cache() {
        let mock = Arc::new(MockSheetsApi::new().with_table(sample_table("doc-1", "0", "Alice")));
        let (fetcher, cache) = fetcher_with(mock);

        let tables = fetcher.fetch_and_cache("doc-1", gids(&["0"])).await.unwrap();
        assert_eq!(tables.len(), 1);

        let entry = cache.get("doc-1", "0").unwrap();
        assert_eq!(entry.data.data[0][0], "Alice");
        assert!(!entry.etag.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_fetches_coalesce() {
        let mock = Arc::new(MockSheetsApi::new().with_table(sample_table("doc-1", "0", "Alice")));
        mock.set_fetch_delay(Duration::from_millis(100));
        let (fetcher, _cache) = fetcher_with(Arc::clone(&mock));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let fetcher = Arc::clone(&fetcher);
                tokio::spawn(async move { fetcher.fetch_and_cache("doc-1", gids(&["0"])).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(mock.table_call_count(), 1);
    }

    #[tokio::test]
    async fn test_fetches_for_distinct_documents_run_separately() {
        let mock = Arc::new(
            MockSheetsApi::new()
                .with_table(sample_table("doc-1", "0", "a"))
                .with_table(sample_table("doc-2", "0", "b"))
                .with_table(sample_table("doc-3", "0", "c")),
        );
        mock.set_fetch_delay(Duration::from_millis(50));
        let (fetcher, _cache) = fetcher_with(Arc::clone(&mock));

        let handles: Vec<_> = ["doc-1", "doc-2", "doc-3"]
            .into_iter()
            .map(|doc| {
                let fetcher = Arc::clone(&fetcher);
                tokio::spawn(async move { fetcher.fetch_and_cache(doc, gids(&["0"])).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(mock.table_call_count(), 3);
    }

    #[tokio::test]
    async fn test_failure_leaves_cache_untouched() {
        let mock = Arc::new(MockSheetsApi::new().with_table(sample_table("doc-1", "0", "Alice")));
        let (fetcher, cache) = fetcher_with(Arc::clone(&mock));

        fetcher.fetch_and_cache("doc-1", gids(&["0"])).await.unwrap();
        let before = cache.get("doc-1", "0").unwrap();

        mock.fail_with(SheetsError::RateLimited {
            spreadsheet_id: "doc-1".to_string(),
        });
        let result = fetcher.fetch_and_cache("doc-1", gids(&["0"])).await;
        assert!(result.is_err());

        // Stale-on-error: the last good entry survives.
        assert_eq!(cache.get("doc-1", "0").unwrap().etag, before.etag);
    }

    #[tokio::test]
    async fn test_joiner_with_wider_gid_set_still_gets_its_table() {
        let mock = Arc::new(
            MockSheetsApi::new()
                .with_table(sample_table("doc-1", "0", "Alice"))
                .with_table(sample_table("doc-1", "5", "Eve")),
        );
        mock.set_fetch_delay(Duration::from_millis(100));
        let (fetcher, cache) = fetcher_with(Arc::clone(&mock));

        // Start a fetch that only covers gid 0.
        let narrow = {
            let fetcher = Arc::clone(&fetcher);
            tokio::spawn(async move { fetcher.fetch_and_cache("doc-1", gids(&["0"])).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // This call joins the in-flight fetch, whose result cannot
        // contain gid 5; the follow-up fetch must fill the gap.
        let tables = fetcher
            .fetch_and_cache("doc-1", gids(&["0", "5"]))
            .await
            .unwrap();
        assert_eq!(tables.get("5").unwrap().data[0][0], "Eve");

        assert!(narrow.await.unwrap().is_ok());
        assert_eq!(mock.table_call_count(), 2);
        assert!(cache.get("doc-1", "5").is_some());
    }

    #[tokio::test]
    async fn test_fetch_recovers_after_upstream_failure() {
        let mock = Arc::new(MockSheetsApi::new().with_table(sample_table("doc-1", "0", "Alice")));
        let (fetcher, cache) = fetcher_with(Arc::clone(&mock));

        mock.fail_with(SheetsError::Network {
            spreadsheet_id: "doc-1".to_string(),
            message: "request timed out".to_string(),
        });
        assert!(fetcher.fetch_and_cache("doc-1", gids(&["0"])).await.is_err());
        assert!(cache.get("doc-1", "0").is_none());

        // Upstream comes back: the next fetch succeeds and populates.
        mock.succeed();
        let tables = fetcher.fetch_and_cache("doc-1", gids(&["0"])).await.unwrap();
        assert_eq!(tables.len(), 1);
        assert!(cache.get("doc-1", "0").is_some());
    }
}
