//! trino_sheets binary - sequence the export pipeline once and exit.
//!
//! All parameters come from the environment; there are no CLI arguments.
//! Exit code is 0 on success and non-zero on any stage failure.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use trino_sheets::auth::Authenticator;
use trino_sheets::config::Settings;
use trino_sheets::query::read_query;
use trino_sheets::sheets::{sheet_title, SheetsClient};
use trino_sheets::trino::TrinoClient;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        error!("export failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    info!("loading configuration from environment");
    let settings = Settings::from_env().context("loading configuration")?;

    let query = read_query(&settings.sql_file_path).context("reading query file")?;

    info!("executing query against {}", settings.trino_base_url());
    let trino = TrinoClient::new(&settings);
    let result = trino.execute(&query).await.context("executing Trino query")?;

    info!("authenticating with Google");
    let auth = Authenticator::from_file(
        &settings.client_secret_path,
        settings.token_path.clone(),
        settings.oauth_timeout,
    )
    .context("loading Google credentials")?;
    let access_token = auth
        .get_access_token()
        .await
        .context("authorizing with Google")?;

    let title = sheet_title(&settings.sql_file_path, Utc::now());
    let sheets = SheetsClient::new(access_token);
    let spreadsheet = match sheets
        .export(&result, &title, &settings.drive_folder_id)
        .await
    {
        Ok(spreadsheet) => spreadsheet,
        Err(err) => {
            if let Some(id) = err.spreadsheet_id() {
                error!("partially written spreadsheet {id} was left in place; delete it manually if unwanted");
            }
            return Err(err).context("exporting to Google Sheets");
        }
    };

    match &spreadsheet.spreadsheet_url {
        Some(url) => info!(
            "export complete: spreadsheet {} ({url})",
            spreadsheet.spreadsheet_id
        ),
        None => info!("export complete: spreadsheet {}", spreadsheet.spreadsheet_id),
    }
    Ok(())
}
