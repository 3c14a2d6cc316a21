//! HTTP boundary
//!
//! Thin axum layer over the caching core. Components are constructed once
//! at startup and shared by handle; handlers never own state.

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde_json::json;

use crate::cache::SheetCache;
use crate::error::SheetsError;
use crate::fetch::SheetFetcher;
use crate::metrics::UsageMetrics;
use crate::poller::BackgroundPoller;

pub mod sheets;
pub mod stats;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<SheetCache>,
    pub fetcher: Arc<SheetFetcher>,
    pub poller: Arc<BackgroundPoller>,
    pub metrics: Arc<UsageMetrics>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sheets", get(sheets::get_sheet))
        .route("/api/stats", get(stats::get_stats))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// A failed request, mapped to its response category.
///
/// Hard errors are never papered over with stale or synthetic data.
#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    message: String,
}

impl ApiFailure {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn from_sheets(err: &SheetsError) -> Self {
        let status = match err {
            SheetsError::NotFound { .. } => StatusCode::NOT_FOUND,
            SheetsError::NotPublic { .. } => StatusCode::FORBIDDEN,
            SheetsError::Config => StatusCode::INTERNAL_SERVER_ERROR,
            SheetsError::RateLimited { .. }
            | SheetsError::Network { .. }
            | SheetsError::Api { .. } => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"detail": self.message}))).into_response()
    }
}
