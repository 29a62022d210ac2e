//! Error types for the trino_sheets crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while exporting a Trino query to Google Sheets.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingConfig(Vec<String>),

    #[error("invalid value for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("failed to read query file {path}: {source}")]
    QuerySource {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("query file {path} is empty")]
    EmptyQuery { path: PathBuf },

    #[error("failed to load client secret {path}: {reason}")]
    Credentials { path: PathBuf, reason: String },

    #[error("could not reach Trino coordinator: {0}")]
    TrinoConnection(#[source] reqwest::Error),

    #[error("Trino rejected the request ({status}): {message}")]
    TrinoAuth { status: u16, message: String },

    #[error("query failed ({error_name}, code {error_code}): {message}")]
    TrinoQuery {
        message: String,
        error_code: i64,
        error_name: String,
    },

    #[error("authorization failed: {0}")]
    Authorization(String),

    #[error("failed to persist token to {path}: {reason}")]
    TokenStore { path: PathBuf, reason: String },

    #[error("row {row} has {actual} values but the header has {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("failed to create spreadsheet ({status}): {message}")]
    SheetCreate { status: u16, message: String },

    #[error("failed to write values to spreadsheet {spreadsheet_id} ({status}): {message}")]
    SheetWrite {
        spreadsheet_id: String,
        status: u16,
        message: String,
    },

    #[error("failed to move spreadsheet {spreadsheet_id} to folder ({status}): {message}")]
    SheetMove {
        spreadsheet_id: String,
        status: u16,
        message: String,
    },

    #[error("invalid Drive folder URL or ID: {0}")]
    InvalidFolder(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl ExportError {
    /// The spreadsheet created before the failure, if any, so the caller can
    /// point the user at the sheet that needs manual cleanup.
    pub fn spreadsheet_id(&self) -> Option<&str> {
        match self {
            Self::SheetWrite { spreadsheet_id, .. } | Self::SheetMove { spreadsheet_id, .. } => {
                Some(spreadsheet_id)
            }
            _ => None,
        }
    }
}

/// Result type alias for ExportError.
pub type Result<T> = std::result::Result<T, ExportError>;
