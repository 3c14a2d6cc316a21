//! sheetproxy - Caching proxy for the Google Sheets API
//!
//! Sits between polling web clients and the rate-limited Sheets API.
//! Clients poll this server as often as they like; the server answers
//! from a short-TTL cache, coalesces concurrent misses into single
//! upstream calls, and keeps actively watched sheets warm with a
//! background poller that stands down when clients go quiet.

use std::sync::Arc;

pub mod cache;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod poller;
pub mod rate_limit;
pub mod server;
pub mod sheets;

use cache::SheetCache;
use config::Config;
use error::Result;
use fetch::SheetFetcher;
use metrics::UsageMetrics;
use poller::BackgroundPoller;
use rate_limit::SlidingWindowLimiter;
use server::AppState;
use sheets::GoogleSheetsClient;

/// A fully wired application: the router to serve and the poller whose
/// lifecycle the caller owns.
pub struct App {
    pub router: axum::Router,
    pub poller: Arc<BackgroundPoller>,
}

/// Wire every component from configuration.
///
/// Does not bind a socket or start the poller; `main` (and tests) decide
/// when those happen.
pub fn build_app(config: &Config) -> Result<App> {
    let limiter = Arc::new(SlidingWindowLimiter::new(config.upstream_rate_limit()));
    let client = Arc::new(GoogleSheetsClient::new(
        config.api_key.clone(),
        config.base_url.clone(),
        limiter,
        config.metadata_ttl(),
    )?);

    let cache = Arc::new(SheetCache::new(config.cache_ttl()));
    let metrics = Arc::new(UsageMetrics::new());
    let fetcher = Arc::new(SheetFetcher::new(
        client,
        Arc::clone(&cache),
        Arc::clone(&metrics),
    ));
    let poller = Arc::new(BackgroundPoller::new(
        Arc::clone(&fetcher),
        Arc::clone(&metrics),
        config.poll_interval(),
        config.inactivity_timeout(),
    ));

    let router = server::router(AppState {
        cache,
        fetcher,
        poller: Arc::clone(&poller),
        metrics,
    });

    Ok(App { router, poller })
}
