//! GET /api/sheets
//!
//! Serves one table, from cache when fresh, via a coalesced upstream
//! fetch otherwise. Supports conditional polling: a request carrying the
//! current content fingerprint in `If-None-Match` gets `304 Not Modified`
//! with no body.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{ApiFailure, AppState};
use crate::cache::compute_etag;
use crate::sheets::SheetData;

const SPREADSHEET_ID_MIN: usize = 10;
const SPREADSHEET_ID_MAX: usize = 100;
const GID_MAX: usize = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetQuery {
    pub spreadsheet_id: String,
    #[serde(default = "default_gid")]
    pub gid: String,
}

fn default_gid() -> String {
    "0".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SheetResponse {
    #[serde(flatten)]
    sheet: SheetData,
    last_updated: String,
}

pub async fn get_sheet(
    State(state): State<AppState>,
    Query(query): Query<SheetQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiFailure> {
    validate_query(&query)?;

    let client_etag = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    // Register interest before serving, so the poller keeps this table
    // warm for the client's next poll.
    state.poller.subscribe(&query.spreadsheet_id, &query.gid);

    if let Some(entry) = state.cache.get(&query.spreadsheet_id, &query.gid) {
        state.metrics.record_cache_hit();
        return Ok(sheet_response(entry.data, entry.etag, client_etag.as_deref()));
    }

    state.metrics.record_cache_miss();

    // Fetch the document's whole subscription set in one upstream call;
    // concurrent misses for the same document share it.
    let gids = state.poller.subscribed_gids(&query.spreadsheet_id);
    let mut tables = match state
        .fetcher
        .fetch_and_cache(&query.spreadsheet_id, gids)
        .await
    {
        Ok(tables) => tables,
        Err(err) => {
            state.metrics.record_error();
            return Err(ApiFailure::from_sheets(&err));
        }
    };

    match tables.remove(&query.gid) {
        Some(data) => {
            let etag = compute_etag(&data);
            Ok(sheet_response(data, etag, client_etag.as_deref()))
        }
        None => {
            // The spreadsheet exists; only the requested tab is missing.
            state.metrics.record_error();
            Err(ApiFailure::not_found(format!(
                "Sheet with gid {} not found in spreadsheet {}",
                query.gid, query.spreadsheet_id
            )))
        }
    }
}

fn validate_query(query: &SheetQuery) -> Result<(), ApiFailure> {
    if !is_valid_spreadsheet_id(&query.spreadsheet_id) {
        return Err(ApiFailure::bad_request("Invalid spreadsheet id"));
    }
    if !is_valid_gid(&query.gid) {
        return Err(ApiFailure::bad_request("Invalid gid"));
    }
    Ok(())
}

fn is_valid_spreadsheet_id(id: &str) -> bool {
    (SPREADSHEET_ID_MIN..=SPREADSHEET_ID_MAX).contains(&id.len())
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn is_valid_gid(gid: &str) -> bool {
    (1..=GID_MAX).contains(&gid.len()) && gid.bytes().all(|b| b.is_ascii_digit())
}

fn sheet_response(sheet: SheetData, etag: String, client_etag: Option<&str>) -> Response {
    let headers = [
        (header::ETAG, etag.clone()),
        (header::CACHE_CONTROL, "no-cache".to_string()),
    ];

    if client_etag == Some(etag.as_str()) {
        return (StatusCode::NOT_MODIFIED, headers).into_response();
    }

    let body = SheetResponse {
        sheet,
        last_updated: Utc::now().to_rfc3339(),
    };
    (headers, Json(body)).into_response()
}
