//! Data models for the Trino wire protocol, Google API payloads, and the
//! in-memory result set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One page of results from the Trino statement endpoint.
///
/// The coordinator returns a document per request; `next_uri` points at the
/// next page until the query is finished or failed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    pub id: String,
    #[serde(default)]
    pub next_uri: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<Column>>,
    #[serde(default)]
    pub data: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    pub error: Option<QueryError>,
}

/// Column metadata from the query result.
#[derive(Debug, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Failure reported by the engine inside a result page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryError {
    pub message: String,
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub error_name: String,
}

/// A single scalar value from the result set.
///
/// Tags carry the engine's declared type so rendering to the spreadsheet is
/// total: every variant has exactly one JSON representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Date/time values in the textual form the engine returned them.
    Timestamp(String),
}

impl Cell {
    /// Map a wire value to a cell using the declared column type.
    ///
    /// Values that do not match their declared type degrade to `Text` of
    /// their JSON rendering rather than failing the export.
    pub fn from_wire(value: &Value, type_name: &str) -> Cell {
        if value.is_null() {
            return Cell::Null;
        }
        // "timestamp(3) with time zone" and friends all share the base name
        // before the precision parenthesis.
        let base = type_name.split('(').next().unwrap_or(type_name).trim();
        let mapped = match base {
            "boolean" => value.as_bool().map(Cell::Bool),
            "tinyint" | "smallint" | "integer" | "bigint" => value.as_i64().map(Cell::Int),
            "real" | "double" => value.as_f64().map(Cell::Float),
            "date" | "time" | "timestamp" => {
                value.as_str().map(|s| Cell::Timestamp(s.to_string()))
            }
            _ => None,
        };
        mapped.unwrap_or_else(|| match value.as_str() {
            Some(s) => Cell::Text(s.to_string()),
            None => Cell::Text(value.to_string()),
        })
    }

    /// Render the cell for a `valueInputOption=RAW` values write.
    ///
    /// Numbers and booleans keep their native JSON type; nulls leave the
    /// spreadsheet cell empty. Non-finite floats are not representable in
    /// JSON and degrade to their textual form.
    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Bool(b) => Value::Bool(*b),
            Cell::Int(i) => Value::from(*i),
            Cell::Float(f) => match serde_json::Number::from_f64(*f) {
                Some(n) => Value::Number(n),
                None => Value::String(f.to_string()),
            },
            Cell::Text(s) | Cell::Timestamp(s) => Value::String(s.clone()),
        }
    }
}

/// Materialized query result: a column header plus data rows in engine order.
#[derive(Debug, Clone)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Render header and data rows as JSON value rows for the Sheets API.
    ///
    /// Rows shorter than the header are padded with empty cells; rows longer
    /// than the header are a data-integrity failure and are rejected before
    /// anything is written.
    pub fn to_value_rows(&self) -> crate::error::Result<Vec<Vec<Value>>> {
        let width = self.columns.len();
        let mut values = Vec::with_capacity(self.rows.len() + 1);
        values.push(self.columns.iter().map(|c| Value::String(c.clone())).collect());
        for (idx, row) in self.rows.iter().enumerate() {
            if row.len() > width {
                return Err(crate::error::ExportError::RowWidth {
                    row: idx,
                    expected: width,
                    actual: row.len(),
                });
            }
            let mut rendered: Vec<Value> = row.iter().map(Cell::to_json).collect();
            rendered.resize(width, Value::Null);
            values.push(rendered);
        }
        Ok(values)
    }
}

/// OAuth client credentials file as downloaded from the Google Cloud Console
/// for a desktop ("installed") application.
#[derive(Debug, Deserialize)]
pub struct ClientSecretFile {
    pub installed: InstalledClientSecret,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstalledClientSecret {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
}

/// OAuth2 token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Token record persisted across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
    pub scopes: Vec<String>,
}

impl StoredToken {
    /// Whether the access token is still usable for the given scopes.
    ///
    /// A 60 second buffer keeps a token that would expire mid-export from
    /// being treated as valid.
    pub fn is_valid_for(&self, scopes: &[&str], now: DateTime<Utc>) -> bool {
        let covered = scopes.iter().all(|s| self.scopes.iter().any(|have| have == s));
        covered && self.expiry > now + chrono::Duration::seconds(60)
    }
}

/// Response from the spreadsheet create call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadsheetResponse {
    pub spreadsheet_id: String,
    #[serde(default)]
    pub spreadsheet_url: Option<String>,
}

/// Response from a values update/append call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValuesResponse {
    #[serde(default)]
    pub updated_rows: Option<u64>,
    #[serde(default)]
    pub updated_cells: Option<u64>,
}

/// Parent folders of a Drive file.
#[derive(Debug, Deserialize)]
pub struct FileParents {
    #[serde(default)]
    pub parents: Vec<String>,
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_results_deserialize() {
        let json = r#"{
            "id": "20260807_000001_00001_abcde",
            "nextUri": "http://coordinator:8080/v1/statement/queued/x/y/1",
            "columns": [
                {"name": "a", "type": "bigint"},
                {"name": "b", "type": "varchar(1)"}
            ],
            "data": [[1, "x"]]
        }"#;

        let page: QueryResults = serde_json::from_str(json).unwrap();
        assert_eq!(page.id, "20260807_000001_00001_abcde");
        assert!(page.next_uri.is_some());
        let columns = page.columns.unwrap();
        assert_eq!(columns[0].name, "a");
        assert_eq!(columns[1].type_name, "varchar(1)");
        assert_eq!(page.data.unwrap(), vec![vec![json!(1), json!("x")]]);
    }

    #[test]
    fn test_cell_from_wire_by_declared_type() {
        assert_eq!(Cell::from_wire(&json!(42), "bigint"), Cell::Int(42));
        assert_eq!(Cell::from_wire(&json!(1.5), "double"), Cell::Float(1.5));
        assert_eq!(Cell::from_wire(&json!(true), "boolean"), Cell::Bool(true));
        assert_eq!(
            Cell::from_wire(&json!("2026-08-07 12:00:00.000"), "timestamp(3)"),
            Cell::Timestamp("2026-08-07 12:00:00.000".to_string())
        );
        assert_eq!(
            Cell::from_wire(&json!("hello"), "varchar"),
            Cell::Text("hello".to_string())
        );
        assert_eq!(Cell::from_wire(&Value::Null, "bigint"), Cell::Null);
    }

    #[test]
    fn test_cell_from_wire_decimal_stays_exact() {
        // Decimals arrive as strings; they are carried as text rather than
        // coerced to floating point.
        assert_eq!(
            Cell::from_wire(&json!("123.45"), "decimal(10,2)"),
            Cell::Text("123.45".to_string())
        );
    }

    #[test]
    fn test_cell_from_wire_mismatched_value_degrades_to_text() {
        assert_eq!(
            Cell::from_wire(&json!([1, 2]), "array(integer)"),
            Cell::Text("[1,2]".to_string())
        );
    }

    #[test]
    fn test_cell_to_json_nonfinite_float() {
        assert_eq!(Cell::Float(f64::NAN).to_json(), json!("NaN"));
        assert_eq!(Cell::Float(2.5).to_json(), json!(2.5));
    }

    #[test]
    fn test_result_set_pads_short_rows() {
        let rs = ResultSet {
            columns: vec!["a".into(), "b".into(), "c".into()],
            rows: vec![vec![Cell::Int(1)]],
        };

        let values = rs.to_value_rows().unwrap();
        assert_eq!(values[0], vec![json!("a"), json!("b"), json!("c")]);
        assert_eq!(values[1], vec![json!(1), Value::Null, Value::Null]);
    }

    #[test]
    fn test_result_set_rejects_long_rows() {
        let rs = ResultSet {
            columns: vec!["a".into()],
            rows: vec![vec![Cell::Int(1), Cell::Int(2)]],
        };

        assert!(rs.to_value_rows().is_err());
    }

    #[test]
    fn test_stored_token_validity() {
        let now = Utc::now();
        let token = StoredToken {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            expiry: now + chrono::Duration::hours(1),
            scopes: vec!["https://www.googleapis.com/auth/spreadsheets".to_string()],
        };

        assert!(token.is_valid_for(&["https://www.googleapis.com/auth/spreadsheets"], now));
        // Missing scope invalidates the token even before expiry.
        assert!(!token.is_valid_for(&["https://www.googleapis.com/auth/drive.file"], now));
        // Inside the expiry buffer the token is no longer usable.
        assert!(!token.is_valid_for(
            &["https://www.googleapis.com/auth/spreadsheets"],
            now + chrono::Duration::minutes(59)
        ));
    }

    #[test]
    fn test_token_response_deserialize() {
        let json = r#"{
            "access_token": "ya29.token",
            "token_type": "Bearer",
            "expires_in": 3599,
            "refresh_token": "1//refresh",
            "scope": "https://www.googleapis.com/auth/spreadsheets"
        }"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access_token, "ya29.token");
        assert_eq!(response.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(response.expires_in, 3599);
    }
}
