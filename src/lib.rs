//! trino_sheets - run a SQL query against Trino and export the result set to
//! a newly created Google Sheet.
//!
//! The pipeline is linear:
//! - Load settings from the process environment
//! - Read the SQL statement from a file
//! - Execute it on the Trino coordinator and materialize the rows
//! - Obtain a Google access token (cached, refreshed, or interactive OAuth2)
//! - Create a spreadsheet, write header and rows, move it into a Drive folder
//!
//! # Example
//!
//! ```no_run
//! use trino_sheets::{Authenticator, Settings, SheetsClient, TrinoClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env()?;
//!     let query = trino_sheets::query::read_query(&settings.sql_file_path)?;
//!     let result = TrinoClient::new(&settings).execute(&query).await?;
//!
//!     let auth = Authenticator::from_file(
//!         &settings.client_secret_path,
//!         settings.token_path.clone(),
//!         settings.oauth_timeout,
//!     )?;
//!     let token = auth.get_access_token().await?;
//!
//!     let sheets = SheetsClient::new(token);
//!     let spreadsheet = sheets
//!         .export(&result, "billing export", &settings.drive_folder_id)
//!         .await?;
//!     println!("{}", spreadsheet.spreadsheet_id);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod query;
pub mod sheets;
pub mod trino;
pub mod url_parser;

// Re-exports for convenience
pub use auth::Authenticator;
pub use config::Settings;
pub use error::{ExportError, Result};
pub use models::{Cell, ResultSet};
pub use sheets::SheetsClient;
pub use trino::TrinoClient;
pub use url_parser::extract_folder_id;
