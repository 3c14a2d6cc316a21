//! Google Sheets API client implementation
//!
//! Two call shapes: a metadata lookup (gid to title, cached with its own
//! longer TTL since sheet structure changes far less often than cell
//! values) and a data fetch restricted to the requested sheets via one
//! `ranges` parameter per title, keeping upstream payloads small. Every
//! network call passes the rate limiter first.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};

use super::types::{SpreadsheetResponse, extract_rows, normalize_rows};
use super::{SheetData, SheetsApi};
use crate::error::SheetsError;
use crate::rate_limit::SlidingWindowLimiter;

/// Google Sheets API base URL
const API_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Upstream call timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type MetadataEntry = (HashMap<String, String>, Instant);

/// Google Sheets API client
pub struct GoogleSheetsClient {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
    limiter: Arc<SlidingWindowLimiter>,
    metadata_ttl: Duration,
    metadata_cache: Mutex<HashMap<String, MetadataEntry>>,
}

impl GoogleSheetsClient {
    /// Create a new client.
    ///
    /// `base_url` overrides the production endpoint (used by tests).
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        limiter: Arc<SlidingWindowLimiter>,
        metadata_ttl: Duration,
    ) -> Result<Self, SheetsError> {
        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SheetsError::Api {
                spreadsheet_id: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| API_BASE_URL.to_string()),
            api_key,
            limiter,
            metadata_ttl,
            metadata_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Missing credentials fail before any network attempt.
    fn require_api_key(&self) -> Result<&str, SheetsError> {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(SheetsError::Config),
        }
    }

    fn cached_metadata(&self, spreadsheet_id: &str) -> Option<HashMap<String, String>> {
        let mut cache = lock(&self.metadata_cache);
        match cache.get(spreadsheet_id) {
            Some((_, expires_at)) if Instant::now() > *expires_at => {
                cache.remove(spreadsheet_id);
                None
            }
            Some((mapping, _)) => Some(mapping.clone()),
            None => None,
        }
    }

    fn store_metadata(&self, spreadsheet_id: &str, mapping: HashMap<String, String>) {
        lock(&self.metadata_cache).insert(
            spreadsheet_id.to_string(),
            (mapping, Instant::now() + self.metadata_ttl),
        );
    }

    async fn get_spreadsheet(
        &self,
        spreadsheet_id: &str,
        query: &[(&str, &str)],
    ) -> Result<SpreadsheetResponse, SheetsError> {
        self.limiter.acquire().await;

        let url = format!("{}/{}", self.base_url, spreadsheet_id);
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| SheetsError::network(spreadsheet_id, &e))?;

        check_status(response.status(), spreadsheet_id)?;

        response
            .json::<SpreadsheetResponse>()
            .await
            .map_err(|e| SheetsError::Api {
                spreadsheet_id: spreadsheet_id.to_string(),
                message: format!("failed to parse response: {e}"),
            })
    }
}

fn check_status(status: StatusCode, spreadsheet_id: &str) -> Result<(), SheetsError> {
    let spreadsheet_id = spreadsheet_id.to_string();
    match status {
        StatusCode::NOT_FOUND => Err(SheetsError::NotFound { spreadsheet_id }),
        StatusCode::FORBIDDEN => Err(SheetsError::NotPublic { spreadsheet_id }),
        StatusCode::TOO_MANY_REQUESTS => Err(SheetsError::RateLimited { spreadsheet_id }),
        status if !status.is_success() => Err(SheetsError::Api {
            spreadsheet_id,
            message: format!("Google API error: {status}"),
        }),
        _ => Ok(()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl SheetsApi for GoogleSheetsClient {
    async fn fetch_metadata(
        &self,
        spreadsheet_id: &str,
    ) -> Result<HashMap<String, String>, SheetsError> {
        let api_key = self.require_api_key()?.to_string();

        if let Some(cached) = self.cached_metadata(spreadsheet_id) {
            return Ok(cached);
        }

        // Only sheet properties, no cell data.
        let query = [
            ("key", api_key.as_str()),
            ("fields", "sheets.properties(sheetId,title)"),
        ];
        let response = self.get_spreadsheet(spreadsheet_id, &query).await?;

        let mapping: HashMap<String, String> = response
            .sheets
            .iter()
            .map(|sheet| {
                (
                    sheet.properties.gid(),
                    sheet.properties.title_or_default(),
                )
            })
            .collect();

        self.store_metadata(spreadsheet_id, mapping.clone());
        Ok(mapping)
    }

    async fn fetch_tables(
        &self,
        spreadsheet_id: &str,
        gids: &BTreeSet<String>,
    ) -> Result<HashMap<String, SheetData>, SheetsError> {
        self.require_api_key()?;

        if gids.is_empty() {
            return Ok(HashMap::new());
        }

        let metadata = self.fetch_metadata(spreadsheet_id).await?;
        let sheet_names: Vec<&str> = gids
            .iter()
            .filter_map(|gid| metadata.get(gid).map(String::as_str))
            .collect();
        if sheet_names.is_empty() {
            return Ok(HashMap::new());
        }

        let api_key = self.require_api_key()?.to_string();
        let mut query: Vec<(&str, &str)> =
            vec![("key", api_key.as_str()), ("includeGridData", "true")];
        for name in &sheet_names {
            query.push(("ranges", name));
        }

        let response = self.get_spreadsheet(spreadsheet_id, &query).await?;

        let mut result = HashMap::new();
        for sheet in &response.sheets {
            let gid = sheet.properties.gid();
            if !gids.contains(&gid) {
                continue;
            }

            let rows = sheet
                .data
                .first()
                .map(|grid| extract_rows(&grid.row_data))
                .unwrap_or_default();

            let mut rows = rows.into_iter();
            let headers = rows.next().unwrap_or_default();
            let (headers, data) = normalize_rows(headers, rows.collect());

            result.insert(
                gid.clone(),
                SheetData {
                    spreadsheet_id: spreadsheet_id.to_string(),
                    gid,
                    title: sheet.properties.title_or_default(),
                    headers,
                    data,
                },
            );
        }

        Ok(result)
    }
}
