//! Mock Sheets API for tests
//!
//! Serves canned tables, counts calls, and can be switched to fail, so
//! fetch-path and poller tests never touch the network.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{SheetData, SheetsApi};
use crate::error::SheetsError;

#[derive(Default)]
pub struct MockSheetsApi {
    tables: Mutex<HashMap<(String, String), SheetData>>,
    failure: Mutex<Option<SheetsError>>,
    fetch_delay: Mutex<Option<Duration>>,
    table_calls: AtomicUsize,
}

impl MockSheetsApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, data: SheetData) -> Self {
        self.insert_table(data);
        self
    }

    pub fn insert_table(&self, data: SheetData) {
        self.tables
            .lock()
            .unwrap()
            .insert((data.spreadsheet_id.clone(), data.gid.clone()), data);
    }

    /// Make every subsequent fetch fail with `err`.
    pub fn fail_with(&self, err: SheetsError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn succeed(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Delay each fetch_tables call (for coalescing tests).
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub fn table_call_count(&self) -> usize {
        self.table_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SheetsApi for MockSheetsApi {
    async fn fetch_metadata(
        &self,
        spreadsheet_id: &str,
    ) -> Result<HashMap<String, String>, SheetsError> {
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }

        Ok(self
            .tables
            .lock()
            .unwrap()
            .iter()
            .filter(|((id, _), _)| id == spreadsheet_id)
            .map(|((_, gid), data)| (gid.clone(), data.title.clone()))
            .collect())
    }

    async fn fetch_tables(
        &self,
        spreadsheet_id: &str,
        gids: &BTreeSet<String>,
    ) -> Result<HashMap<String, SheetData>, SheetsError> {
        self.table_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }

        Ok(self
            .tables
            .lock()
            .unwrap()
            .iter()
            .filter(|((id, gid), _)| id == spreadsheet_id && gids.contains(gid))
            .map(|((_, gid), data)| (gid.clone(), data.clone()))
            .collect())
    }
}

/// A one-row table for tests.
pub fn sample_table(spreadsheet_id: &str, gid: &str, cell: &str) -> SheetData {
    SheetData {
        spreadsheet_id: spreadsheet_id.to_string(),
        gid: gid.to_string(),
        title: format!("Sheet{gid}"),
        headers: vec!["Name".to_string()],
        data: vec![vec![cell.to_string()]],
    }
}
