//! Environment-backed configuration.
//!
//! All parameters come from the process environment; the binary takes no
//! arguments. Required keys are collected and reported together so a missing
//! configuration is discovered in one run instead of one key at a time.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ExportError, Result};
use crate::url_parser::extract_folder_id;

pub const TRINO_HOST: &str = "TRINO_HOST";
pub const TRINO_PORT: &str = "TRINO_PORT";
pub const TRINO_USER: &str = "TRINO_USER";
pub const TRINO_PASSWORD: &str = "TRINO_PASSWORD";
pub const TRINO_CATALOG: &str = "TRINO_CATALOG";
pub const TRINO_SCHEMA: &str = "TRINO_SCHEMA";
pub const TRINO_HTTP_SCHEME: &str = "TRINO_HTTP_SCHEME";
pub const GOOGLE_CLIENT_SECRET_FILE: &str = "GOOGLE_CLIENT_SECRET_FILE";
pub const TOKEN_PATH: &str = "TOKEN_PATH";
pub const SQL_FILE_PATH: &str = "SQL_FILE_PATH";
pub const DRIVE_FOLDER_ID: &str = "DRIVE_FOLDER_ID";
pub const OAUTH_TIMEOUT_SECS: &str = "OAUTH_TIMEOUT_SECS";

/// Default bound on the interactive authorization wait.
const DEFAULT_OAUTH_TIMEOUT: Duration = Duration::from_secs(300);

/// Immutable settings for one export run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub trino_host: String,
    pub trino_port: u16,
    pub trino_user: String,
    pub trino_password: Option<String>,
    pub trino_catalog: String,
    pub trino_schema: String,
    /// `http` or `https`; `https` unless overridden.
    pub trino_http_scheme: String,
    pub client_secret_path: PathBuf,
    pub token_path: PathBuf,
    pub sql_file_path: PathBuf,
    pub drive_folder_id: String,
    pub oauth_timeout: Duration,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings through an arbitrary lookup function.
    ///
    /// The indirection keeps tests independent of process-wide environment
    /// state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut missing = Vec::new();
        let mut required = |key: &str| {
            get(key).unwrap_or_else(|| {
                missing.push(key.to_string());
                String::new()
            })
        };

        let host = required(TRINO_HOST);
        let port_raw = required(TRINO_PORT);
        let user = required(TRINO_USER);
        let catalog = required(TRINO_CATALOG);
        let schema = required(TRINO_SCHEMA);
        let client_secret = required(GOOGLE_CLIENT_SECRET_FILE);
        let token_path = required(TOKEN_PATH);
        let sql_file = required(SQL_FILE_PATH);
        let folder_raw = required(DRIVE_FOLDER_ID);

        if !missing.is_empty() {
            return Err(ExportError::MissingConfig(missing));
        }

        let port = port_raw.parse::<u16>().map_err(|_| ExportError::InvalidConfig {
            key: TRINO_PORT.to_string(),
            reason: format!("expected a port number, got '{port_raw}'"),
        })?;

        let scheme = match get(TRINO_HTTP_SCHEME) {
            None => "https".to_string(),
            Some(s) if s == "http" || s == "https" => s,
            Some(s) => {
                return Err(ExportError::InvalidConfig {
                    key: TRINO_HTTP_SCHEME.to_string(),
                    reason: format!("expected 'http' or 'https', got '{s}'"),
                })
            }
        };

        let oauth_timeout = match get(OAUTH_TIMEOUT_SECS) {
            None => DEFAULT_OAUTH_TIMEOUT,
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ExportError::InvalidConfig {
                        key: OAUTH_TIMEOUT_SECS.to_string(),
                        reason: format!("expected a positive number of seconds, got '{raw}'"),
                    })
                }
            },
        };

        let drive_folder_id =
            extract_folder_id(&folder_raw).map_err(|err| ExportError::InvalidConfig {
                key: DRIVE_FOLDER_ID.to_string(),
                reason: err.to_string(),
            })?;

        Ok(Settings {
            trino_host: host,
            trino_port: port,
            trino_user: user,
            trino_password: get(TRINO_PASSWORD),
            trino_catalog: catalog,
            trino_schema: schema,
            trino_http_scheme: scheme,
            client_secret_path: PathBuf::from(client_secret),
            token_path: PathBuf::from(token_path),
            sql_file_path: PathBuf::from(sql_file),
            drive_folder_id,
            oauth_timeout,
        })
    }

    /// Base URL of the Trino coordinator.
    pub fn trino_base_url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.trino_http_scheme, self.trino_host, self.trino_port
        )
    }
}
