//! Google Sheets exporter.
//!
//! Creates a new spreadsheet, writes the result set starting at `Sheet1!A1`
//! (header first, data rows below in engine order), then moves the file into
//! the target Drive folder. There is no rollback: a failure after creation
//! leaves the partial sheet in place, and the error carries its id so the
//! user can clean up.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{ExportError, Result};
use crate::models::{
    ApiErrorResponse, FileParents, ResultSet, SpreadsheetResponse, UpdateValuesResponse,
};

/// Base URL for the Google Sheets API v4.
const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";

/// Base URL for the Google Drive API v3.
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Rows per values call; larger result sets are appended in batches.
const BATCH_SIZE: usize = 5000;

/// Backoff schedule for transient API failures.
const MAX_RETRIES: u32 = 5;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Client for the Sheets and Drive endpoints, bound to one access token.
pub struct SheetsClient {
    access_token: String,
    sheets_base: String,
    drive_base: String,
    http: Client,
}

impl SheetsClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base_urls(
            access_token,
            SHEETS_API_BASE.to_string(),
            DRIVE_API_BASE.to_string(),
        )
    }

    /// Override the API endpoints (tests point these at a local server).
    pub fn with_base_urls(access_token: String, sheets_base: String, drive_base: String) -> Self {
        Self {
            access_token,
            sheets_base,
            drive_base,
            http: Client::new(),
        }
    }

    /// Create the spreadsheet, write the result set, move it into the folder.
    pub async fn export(
        &self,
        result: &ResultSet,
        title: &str,
        folder_id: &str,
    ) -> Result<SpreadsheetResponse> {
        let spreadsheet = self.create_spreadsheet(title).await?;
        info!("created spreadsheet {}", spreadsheet.spreadsheet_id);

        self.write_values(&spreadsheet.spreadsheet_id, result).await?;
        info!(
            "wrote {} data rows to spreadsheet {}",
            result.row_count(),
            spreadsheet.spreadsheet_id
        );

        self.move_to_folder(&spreadsheet.spreadsheet_id, folder_id).await?;
        info!(
            "moved spreadsheet {} to folder {}",
            spreadsheet.spreadsheet_id, folder_id
        );

        Ok(spreadsheet)
    }

    /// Create an empty spreadsheet with the given title.
    pub async fn create_spreadsheet(&self, title: &str) -> Result<SpreadsheetResponse> {
        info!("creating spreadsheet '{title}'");
        let body = json!({"properties": {"title": title}});

        let response = self
            .send_with_retry(|| {
                self.http
                    .post(format!("{}/spreadsheets", self.sheets_base))
                    .bearer_auth(&self.access_token)
                    .query(&[("fields", "spreadsheetId,spreadsheetUrl")])
                    .json(&body)
            })
            .await?;

        parse_response(response, |status, message| ExportError::SheetCreate {
            status,
            message,
        })
        .await
    }

    /// Write header and data rows starting at the top-left origin.
    pub async fn write_values(&self, spreadsheet_id: &str, result: &ResultSet) -> Result<()> {
        let values = result.to_value_rows()?;
        info!(
            "writing {} rows ({} columns) to spreadsheet {}",
            values.len(),
            result.column_count(),
            spreadsheet_id
        );

        let wrap = |status: u16, message: String| ExportError::SheetWrite {
            spreadsheet_id: spreadsheet_id.to_string(),
            status,
            message,
        };

        for (index, chunk) in values.chunks(BATCH_SIZE).enumerate() {
            let body = json!({ "values": chunk });
            if index == 0 {
                let response = self
                    .send_with_retry(|| {
                        self.http
                            .put(format!(
                                "{}/spreadsheets/{}/values/Sheet1!A1",
                                self.sheets_base, spreadsheet_id
                            ))
                            .bearer_auth(&self.access_token)
                            .query(&[("valueInputOption", "RAW")])
                            .json(&body)
                    })
                    .await?;
                let update: UpdateValuesResponse = parse_response(response, wrap).await?;
                if let Some(cells) = update.updated_cells {
                    info!("updated {cells} cells");
                }
            } else {
                info!("appending batch {} of {}", index + 1, values.len().div_ceil(BATCH_SIZE));
                let response = self
                    .send_with_retry(|| {
                        self.http
                            .post(format!(
                                "{}/spreadsheets/{}/values/Sheet1!A1:append",
                                self.sheets_base, spreadsheet_id
                            ))
                            .bearer_auth(&self.access_token)
                            .query(&[
                                ("valueInputOption", "RAW"),
                                ("insertDataOption", "INSERT_ROWS"),
                            ])
                            .json(&body)
                    })
                    .await?;
                ensure_success(response, wrap).await?;
            }
        }

        Ok(())
    }

    /// Move the spreadsheet out of the user's Drive root into the folder.
    pub async fn move_to_folder(&self, spreadsheet_id: &str, folder_id: &str) -> Result<()> {
        info!("moving spreadsheet {spreadsheet_id} to folder {folder_id}");

        let wrap = |status: u16, message: String| ExportError::SheetMove {
            spreadsheet_id: spreadsheet_id.to_string(),
            status,
            message,
        };

        let response = self
            .send_with_retry(|| {
                self.http
                    .get(format!("{}/files/{}", self.drive_base, spreadsheet_id))
                    .bearer_auth(&self.access_token)
                    .query(&[("fields", "parents"), ("supportsAllDrives", "true")])
            })
            .await?;
        let current: FileParents = parse_response(response, wrap).await?;
        let previous_parents = current.parents.join(",");

        let response = self
            .send_with_retry(|| {
                let mut request = self
                    .http
                    .patch(format!("{}/files/{}", self.drive_base, spreadsheet_id))
                    .bearer_auth(&self.access_token)
                    .query(&[
                        ("addParents", folder_id),
                        ("fields", "id, parents"),
                        ("supportsAllDrives", "true"),
                    ])
                    .json(&json!({}));
                if !previous_parents.is_empty() {
                    request = request.query(&[("removeParents", previous_parents.as_str())]);
                }
                request
            })
            .await?;
        ensure_success(response, wrap).await
    }

    /// Send a request, retrying transient API failures with backoff.
    async fn send_with_retry(&self, build: impl Fn() -> RequestBuilder) -> Result<Response> {
        let mut delay = INITIAL_RETRY_DELAY;
        let mut attempt = 1;
        loop {
            let response = build().send().await?;
            let status = response.status();
            if is_retryable(status) && attempt < MAX_RETRIES {
                warn!(
                    "Google API returned {status}, retrying in {delay:?} (attempt {attempt}/{MAX_RETRIES})"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
                continue;
            }
            return Ok(response);
        }
    }
}

/// Spreadsheet title for this run, derived from the query file name and a
/// second-precision UTC timestamp so repeated runs never collide.
pub fn sheet_title(sql_file: &Path, now: DateTime<Utc>) -> String {
    let stem = sql_file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("query");
    format!("{} export {}", stem, now.format("%Y-%m-%d %H:%M:%S"))
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// Decode a successful response body, or map the API error payload through
/// `wrap` into the stage-specific error variant.
async fn parse_response<T, F>(response: Response, wrap: F) -> Result<T>
where
    T: DeserializeOwned,
    F: Fn(u16, String) -> ExportError,
{
    let status = response.status();
    if !status.is_success() {
        return Err(error_from_body(status, response, wrap).await);
    }
    response.json::<T>().await.map_err(ExportError::Http)
}

async fn ensure_success<F>(response: Response, wrap: F) -> Result<()>
where
    F: Fn(u16, String) -> ExportError,
{
    let status = response.status();
    if !status.is_success() {
        return Err(error_from_body(status, response, wrap).await);
    }
    Ok(())
}

async fn error_from_body<F>(status: StatusCode, response: Response, wrap: F) -> ExportError
where
    F: Fn(u16, String) -> ExportError,
{
    let body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&body) {
        return wrap(api_error.error.code, api_error.error.message);
    }
    wrap(status.as_u16(), body)
}
