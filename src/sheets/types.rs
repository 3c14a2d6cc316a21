//! Domain and wire types for the Google Sheets API

use serde::{Deserialize, Serialize};

/// One sheet (tab) of a spreadsheet, normalized into header + data rows.
///
/// All rows, headers included, are right-padded with empty strings to the
/// maximum observed column count, so consumers never see ragged rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetData {
    pub spreadsheet_id: String,
    pub gid: String,
    pub title: String,
    pub headers: Vec<String>,
    pub data: Vec<Vec<String>>,
}

// Wire shapes for the Sheets v4 spreadsheets.get response. Only the fields
// the proxy reads are modeled; everything else is ignored.

#[derive(Debug, Deserialize)]
pub(crate) struct SpreadsheetResponse {
    #[serde(default)]
    pub sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SheetEntry {
    #[serde(default)]
    pub properties: SheetProperties,
    #[serde(default)]
    pub data: Vec<GridData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SheetProperties {
    #[serde(default)]
    pub sheet_id: i64,
    pub title: Option<String>,
}

impl SheetProperties {
    pub fn gid(&self) -> String {
        self.sheet_id.to_string()
    }

    pub fn title_or_default(&self) -> String {
        self.title.clone().unwrap_or_else(|| "Sheet".to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GridData {
    #[serde(default)]
    pub row_data: Vec<RowData>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RowData {
    #[serde(default)]
    pub values: Vec<CellData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CellData {
    pub formatted_value: Option<String>,
}

/// Flatten the grid's rowData into plain string rows.
pub(crate) fn extract_rows(row_data: &[RowData]) -> Vec<Vec<String>> {
    row_data
        .iter()
        .map(|row| {
            row.values
                .iter()
                .map(|cell| cell.formatted_value.clone().unwrap_or_default())
                .collect()
        })
        .collect()
}

/// Right-pad headers and data rows with empty cells so every row has the
/// maximum observed column count.
pub(crate) fn normalize_rows(
    mut headers: Vec<String>,
    mut rows: Vec<Vec<String>>,
) -> (Vec<String>, Vec<Vec<String>>) {
    let max_cols = rows
        .iter()
        .map(Vec::len)
        .max()
        .unwrap_or(0)
        .max(headers.len());

    headers.resize(max_cols, String::new());
    for row in &mut rows {
        row.resize(max_cols, String::new());
    }

    (headers, rows)
}
