//! OAuth2 token management for the Google APIs.
//!
//! Implements the installed-app authorization-code flow: a cached token is
//! reused while valid, refreshed without user interaction once expired, and
//! only as a last resort is the user asked to visit the authorization URL,
//! with the redirect captured on a loopback listener. Every successful
//! (re)authorization rewrites the token file atomically.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Url};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::error::{ExportError, Result};
use crate::models::{ClientSecretFile, InstalledClientSecret, StoredToken, TokenResponse};

/// Scopes required to create the spreadsheet and move it into a folder.
pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.file",
];

/// Page shown in the browser once the redirect has been captured.
const CALLBACK_PAGE: &str =
    "<html><body><h3>Authorization received.</h3>You may close this window and \
     return to the terminal.</body></html>";

/// Token manager for a single OAuth client and token cache file.
#[derive(Debug)]
pub struct Authenticator {
    secret: InstalledClientSecret,
    token_path: PathBuf,
    timeout: Duration,
    http: Client,
}

impl Authenticator {
    /// Create an authenticator from an installed-app client secret file.
    pub fn from_file<P: AsRef<Path>>(
        client_secret_path: P,
        token_path: PathBuf,
        timeout: Duration,
    ) -> Result<Self> {
        let path = client_secret_path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| ExportError::Credentials {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        let file: ClientSecretFile =
            serde_json::from_str(&content).map_err(|err| ExportError::Credentials {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        Ok(Self {
            secret: file.installed,
            token_path,
            timeout,
            http: Client::new(),
        })
    }

    /// Get a valid access token, refreshing or re-authorizing as needed.
    pub async fn get_access_token(&self) -> Result<String> {
        if let Some(cached) = self.load_cached() {
            if cached.is_valid_for(&SCOPES, Utc::now()) {
                info!("using cached token from {}", self.token_path.display());
                return Ok(cached.access_token);
            }
            // A refresh keeps the granted scopes, so it only helps when the
            // cached grant already covers what we need.
            let scopes_covered = SCOPES
                .iter()
                .all(|s| cached.scopes.iter().any(|have| have == s));
            if let Some(refresh_token) = cached.refresh_token.filter(|_| scopes_covered) {
                info!("access token expired, refreshing");
                match self.refresh(&refresh_token).await {
                    Ok(token) => return Ok(token.access_token),
                    Err(err) => {
                        warn!("token refresh failed, starting authorization flow: {err}")
                    }
                }
            }
        }

        let token = self.authorize().await?;
        Ok(token.access_token)
    }

    fn load_cached(&self) -> Option<StoredToken> {
        let content = std::fs::read_to_string(&self.token_path).ok()?;
        match serde_json::from_str(&content) {
            Ok(token) => Some(token),
            Err(err) => {
                warn!(
                    "ignoring unparsable token cache {}: {err}",
                    self.token_path.display()
                );
                None
            }
        }
    }

    /// Obtain a new access token from a refresh token, without interaction.
    async fn refresh(&self, refresh_token: &str) -> Result<StoredToken> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.secret.client_id),
            ("client_secret", &self.secret.client_secret),
        ];

        let response = self
            .http
            .post(&self.secret.token_uri)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExportError::Authorization(format!(
                "token refresh rejected ({status}): {body}"
            )));
        }

        let token: TokenResponse = response.json().await?;
        self.store(token, Some(refresh_token.to_string()))
    }

    /// Interactive authorization-code flow with a loopback redirect.
    async fn authorize(&self) -> Result<StoredToken> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.map_err(|err| {
            ExportError::Authorization(format!("could not bind callback listener: {err}"))
        })?;
        let port = listener
            .local_addr()
            .map_err(|err| ExportError::Authorization(err.to_string()))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{port}");
        let state = nonce();
        let scope = SCOPES.join(" ");

        let auth_url = Url::parse_with_params(
            &self.secret.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", self.secret.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("state", state.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|err| ExportError::Authorization(format!("invalid auth_uri: {err}")))?;

        println!("Open this URL in your browser to authorize access:");
        println!();
        println!("  {auth_url}");
        println!();
        info!("waiting up to {:?} for the authorization redirect", self.timeout);

        let code = tokio::time::timeout(self.timeout, wait_for_code(listener, &state))
            .await
            .map_err(|_| {
                ExportError::Authorization(
                    "timed out waiting for the authorization redirect".to_string(),
                )
            })??;

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", &self.secret.client_id),
            ("client_secret", &self.secret.client_secret),
            ("redirect_uri", redirect_uri.as_str()),
        ];

        let response = self
            .http
            .post(&self.secret.token_uri)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExportError::Authorization(format!(
                "code exchange rejected ({status}): {body}"
            )));
        }

        let token: TokenResponse = response.json().await?;
        self.store(token, None)
    }

    /// Build the durable token record and persist it.
    fn store(&self, response: TokenResponse, previous_refresh: Option<String>) -> Result<StoredToken> {
        let scopes = response
            .scope
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_else(|| SCOPES.iter().map(|s| s.to_string()).collect());
        let token = StoredToken {
            access_token: response.access_token,
            // Google omits the refresh token on refresh responses; keep the
            // one that earned this access token.
            refresh_token: response.refresh_token.or(previous_refresh),
            expiry: Utc::now() + chrono::Duration::seconds(response.expires_in as i64),
            scopes,
        };
        persist_token(&self.token_path, &token)?;
        Ok(token)
    }
}

/// Write the token record atomically: serialize to a sibling temp file, then
/// rename over the destination, so a crash mid-write cannot corrupt a
/// previously valid token.
pub fn persist_token(path: &Path, token: &StoredToken) -> Result<()> {
    let store_err = |reason: String| ExportError::TokenStore {
        path: path.to_path_buf(),
        reason,
    };

    let serialized = serde_json::to_string_pretty(token).map_err(|err| store_err(err.to_string()))?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, serialized).map_err(|err| store_err(err.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|err| store_err(err.to_string()))?;
    info!("token saved to {}", path.display());
    Ok(())
}

/// Wait for the provider to redirect the browser to the loopback listener
/// and extract the authorization code.
async fn wait_for_code(listener: TcpListener, expected_state: &str) -> Result<String> {
    loop {
        let (mut stream, _) = listener
            .accept()
            .await
            .map_err(|err| ExportError::Authorization(format!("callback accept failed: {err}")))?;

        let mut buf = vec![0u8; 8192];
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|err| ExportError::Authorization(format!("callback read failed: {err}")))?;
        let request = String::from_utf8_lossy(&buf[..n]).into_owned();

        let Some(target) = request_target(&request) else {
            respond(&mut stream, "400 Bad Request", "").await;
            continue;
        };
        // Browsers also probe for /favicon.ico; answer and keep waiting.
        if !target.starts_with("/?") {
            respond(&mut stream, "404 Not Found", "").await;
            continue;
        }

        let url = match Url::parse(&format!("http://127.0.0.1{target}")) {
            Ok(url) => url,
            Err(_) => {
                respond(&mut stream, "400 Bad Request", "").await;
                continue;
            }
        };

        let mut code = None;
        let mut state = None;
        let mut denial = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => denial = Some(value.into_owned()),
                _ => {}
            }
        }

        respond(&mut stream, "200 OK", CALLBACK_PAGE).await;

        if let Some(denial) = denial {
            return Err(ExportError::Authorization(format!(
                "authorization denied: {denial}"
            )));
        }
        if state.as_deref() != Some(expected_state) {
            return Err(ExportError::Authorization(
                "state mismatch in authorization redirect".to_string(),
            ));
        }
        return code.ok_or_else(|| {
            ExportError::Authorization("redirect carried no authorization code".to_string())
        });
    }
}

/// Request target of the first line of an HTTP/1.1 request.
fn request_target(request: &str) -> Option<&str> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    if method != "GET" {
        return None;
    }
    parts.next()
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(err) = stream.write_all(response.as_bytes()).await {
        warn!("failed to answer callback request: {err}");
    }
    let _ = stream.shutdown().await;
}

/// Single-use state value for the authorization request.
fn nonce() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{:x}{:x}", std::process::id(), nanos)
}
