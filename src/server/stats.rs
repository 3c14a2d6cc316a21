//! GET /api/stats
//!
//! Flat JSON export of the usage metrics plus current cache and poller
//! state, for dashboards and manual inspection.

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

use super::AppState;
use crate::metrics::MetricsSnapshot;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    metrics: MetricsSnapshot,
    cache_entries: usize,
    subscriptions: usize,
    poller_active: bool,
}

pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        metrics: state.metrics.snapshot(),
        cache_entries: state.cache.len(),
        subscriptions: state.poller.subscription_count(),
        poller_active: state.poller.is_active(),
    })
}
