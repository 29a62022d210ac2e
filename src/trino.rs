//! Trino REST client for one-shot statement execution.
//!
//! Speaks the client side of the coordinator protocol: `POST /v1/statement`
//! with the SQL text, then follow `nextUri` until the query finishes,
//! accumulating data pages. The full result set is materialized in memory;
//! paging results out to the caller is out of scope.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{ExportError, Result};
use crate::models::{Cell, Column, QueryResults, ResultSet};

/// Statement submission path on the coordinator.
const STATEMENT_PATH: &str = "/v1/statement";

/// Client identifier sent as `X-Trino-Source`.
const CLIENT_SOURCE: &str = "trino_sheets";

/// A 503 from the coordinator means "busy, resubmit the same request".
const MAX_BUSY_RETRIES: u32 = 5;
const BUSY_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Client scoped to one coordinator and one catalog/schema pair.
pub struct TrinoClient {
    base_url: String,
    user: String,
    password: Option<String>,
    catalog: String,
    schema: String,
    http: Client,
}

impl TrinoClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            base_url: settings.trino_base_url(),
            user: settings.trino_user.clone(),
            password: settings.trino_password.clone(),
            catalog: settings.trino_catalog.clone(),
            schema: settings.trino_schema.clone(),
            http: Client::new(),
        }
    }

    /// Execute one statement and materialize the complete result set.
    pub async fn execute(&self, sql: &str) -> Result<ResultSet> {
        info!("submitting statement to {}", self.base_url);

        let mut page = self
            .send(|| {
                self.authenticated(
                    self.http
                        .post(format!("{}{}", self.base_url, STATEMENT_PATH))
                        .header("X-Trino-Catalog", self.catalog.as_str())
                        .header("X-Trino-Schema", self.schema.as_str())
                        .body(sql.to_string()),
                )
            })
            .await?;

        let query_id = page.id.clone();
        let mut columns: Option<Vec<Column>> = None;
        let mut data: Vec<Vec<serde_json::Value>> = Vec::new();

        loop {
            if let Some(error) = page.error.take() {
                return Err(ExportError::TrinoQuery {
                    message: error.message,
                    error_code: error.error_code,
                    error_name: error.error_name,
                });
            }
            if columns.is_none() {
                columns = page.columns.take();
            }
            if let Some(rows) = page.data.take() {
                data.extend(rows);
            }

            let Some(uri) = page.next_uri.take() else {
                break;
            };
            debug!("fetching result page {uri}");
            match self.send(|| self.authenticated(self.http.get(&uri))).await {
                Ok(next) => page = next,
                Err(err) => {
                    // Tell the coordinator we are abandoning the query so it
                    // can release resources; the original failure wins.
                    self.cancel(&uri).await;
                    return Err(err);
                }
            }
        }

        let columns = columns.ok_or_else(|| ExportError::TrinoQuery {
            message: "query finished without column metadata".to_string(),
            error_code: 0,
            error_name: "NO_COLUMNS".to_string(),
        })?;

        let rows: Vec<Vec<Cell>> = data
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .enumerate()
                    .map(|(i, value)| {
                        let type_name =
                            columns.get(i).map(|c| c.type_name.as_str()).unwrap_or("varchar");
                        Cell::from_wire(&value, type_name)
                    })
                    .collect()
            })
            .collect();

        info!(
            "query {} returned {} rows, {} columns",
            query_id,
            rows.len(),
            columns.len()
        );

        Ok(ResultSet {
            columns: columns.into_iter().map(|c| c.name).collect(),
            rows,
        })
    }

    fn authenticated(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header("X-Trino-User", self.user.as_str())
            .header("X-Trino-Source", CLIENT_SOURCE);
        match &self.password {
            Some(password) => request.basic_auth(&self.user, Some(password)),
            None => request,
        }
    }

    /// Send a request, honoring the protocol's busy-retry on 503.
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<QueryResults> {
        let mut delay = BUSY_RETRY_DELAY;
        let mut attempts = 0;
        loop {
            let response = build().send().await.map_err(ExportError::TrinoConnection)?;
            if response.status() == StatusCode::SERVICE_UNAVAILABLE && attempts < MAX_BUSY_RETRIES {
                attempts += 1;
                debug!("coordinator busy, retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                delay *= 2;
                continue;
            }
            return parse_page(response).await;
        }
    }

    /// Best-effort cancellation of an in-flight query.
    async fn cancel(&self, next_uri: &str) {
        if let Err(err) = self.authenticated(self.http.delete(next_uri)).send().await {
            warn!("failed to cancel query: {err}");
        }
    }
}

async fn parse_page(response: Response) -> Result<QueryResults> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let message = response.text().await.unwrap_or_default();
        return Err(ExportError::TrinoAuth {
            status: status.as_u16(),
            message,
        });
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ExportError::TrinoQuery {
            message,
            error_code: 0,
            error_name: format!("HTTP_{}", status.as_u16()),
        });
    }
    response
        .json::<QueryResults>()
        .await
        .map_err(ExportError::TrinoConnection)
}
