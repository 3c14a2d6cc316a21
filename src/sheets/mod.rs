//! Google Sheets API client

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;

use crate::error::SheetsError;

pub mod client;
#[cfg(test)]
pub mod mock;
pub mod types;

pub use client::GoogleSheetsClient;
#[cfg(test)]
pub use mock::MockSheetsApi;
pub use types::SheetData;

/// Upstream tabular-data API.
///
/// The trait seam keeps the fetch path and the poller testable with a
/// mock; production uses [`GoogleSheetsClient`].
#[async_trait]
pub trait SheetsApi: Send + Sync {
    /// Fetch the gid-to-title mapping for a spreadsheet.
    async fn fetch_metadata(
        &self,
        spreadsheet_id: &str,
    ) -> Result<HashMap<String, String>, SheetsError>;

    /// Fetch the requested sheets of one spreadsheet in a single upstream
    /// call, keyed by gid.
    async fn fetch_tables(
        &self,
        spreadsheet_id: &str,
        gids: &BTreeSet<String>,
    ) -> Result<HashMap<String, SheetData>, SheetsError>;
}
