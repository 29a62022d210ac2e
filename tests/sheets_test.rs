//! Tests for the Sheets exporter with mocked HTTP responses.

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use trino_sheets::error::ExportError;
use trino_sheets::models::{Cell, ResultSet};
use trino_sheets::SheetsClient;

fn result_set() -> ResultSet {
    ResultSet {
        columns: vec!["a".to_string(), "b".to_string()],
        rows: vec![vec![Cell::Int(1), Cell::Text("x".to_string())]],
    }
}

fn client_for(server: &ServerGuard) -> SheetsClient {
    SheetsClient::with_base_urls("test-token".to_string(), server.url(), server.url())
}

#[tokio::test]
async fn test_export_creates_writes_and_moves() {
    let mut server = Server::new_async().await;

    let create = server
        .mock("POST", "/spreadsheets")
        .match_header("authorization", "Bearer test-token")
        .match_query(Matcher::UrlEncoded(
            "fields".into(),
            "spreadsheetId,spreadsheetUrl".into(),
        ))
        .match_body(Matcher::Json(json!({
            "properties": {"title": "billing export 2026-08-07 09:30:00"}
        })))
        .with_status(200)
        .with_body(
            json!({
                "spreadsheetId": "sheet1",
                "spreadsheetUrl": "https://docs.google.com/spreadsheets/d/sheet1/edit"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let write = server
        .mock("PUT", "/spreadsheets/sheet1/values/Sheet1!A1")
        .match_query(Matcher::UrlEncoded("valueInputOption".into(), "RAW".into()))
        .match_body(Matcher::Json(json!({
            "values": [["a", "b"], [1, "x"]]
        })))
        .with_status(200)
        .with_body(
            json!({
                "spreadsheetId": "sheet1",
                "updatedRows": 2,
                "updatedCells": 4
            })
            .to_string(),
        )
        .create_async()
        .await;

    let parents = server
        .mock("GET", "/files/sheet1")
        .match_query(Matcher::UrlEncoded("fields".into(), "parents".into()))
        .with_status(200)
        .with_body(json!({"parents": ["rootabc"]}).to_string())
        .create_async()
        .await;

    let patch = server
        .mock("PATCH", "/files/sheet1")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("addParents".into(), "folder9".into()),
            Matcher::UrlEncoded("removeParents".into(), "rootabc".into()),
        ]))
        .with_status(200)
        .with_body(json!({"id": "sheet1", "parents": ["folder9"]}).to_string())
        .create_async()
        .await;

    let client = client_for(&server);
    let spreadsheet = client
        .export(&result_set(), "billing export 2026-08-07 09:30:00", "folder9")
        .await
        .unwrap();

    assert_eq!(spreadsheet.spreadsheet_id, "sheet1");
    create.assert_async().await;
    write.assert_async().await;
    parents.assert_async().await;
    patch.assert_async().await;
}

#[tokio::test]
async fn test_create_failure_maps_api_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/spreadsheets")
        .match_query(Matcher::Any)
        .with_status(403)
        .with_body(
            json!({
                "error": {
                    "code": 403,
                    "message": "The caller does not have permission",
                    "status": "PERMISSION_DENIED"
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client.create_spreadsheet("title").await.unwrap_err();

    match err {
        ExportError::SheetCreate { status, message } => {
            assert_eq!(status, 403);
            assert!(message.contains("does not have permission"));
        }
        other => panic!("expected SheetCreate, got {other:?}"),
    }
}

#[tokio::test]
async fn test_write_failure_carries_spreadsheet_id() {
    let mut server = Server::new_async().await;
    let write = server
        .mock("PUT", "/spreadsheets/sheet1/values/Sheet1!A1")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(
            json!({"error": {"code": 400, "message": "Invalid values"}}).to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .write_values("sheet1", &result_set())
        .await
        .unwrap_err();

    assert_eq!(err.spreadsheet_id(), Some("sheet1"));
    assert!(matches!(err, ExportError::SheetWrite { status: 400, .. }));
    // A 400 is not retryable; exactly one request was made.
    write.assert_async().await;
}

#[tokio::test(start_paused = true)]
async fn test_retryable_status_is_retried_with_backoff() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/spreadsheets")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_body(
            json!({"error": {"code": 429, "message": "Rate limit exceeded"}}).to_string(),
        )
        .expect(5)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client.create_spreadsheet("title").await.unwrap_err();

    assert!(matches!(err, ExportError::SheetCreate { status: 429, .. }));
    // All five attempts were spent before giving up.
    create.assert_async().await;
}

#[tokio::test]
async fn test_move_failure_carries_spreadsheet_id() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/files/sheet1")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(
            json!({"error": {"code": 404, "message": "File not found"}}).to_string(),
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client.move_to_folder("sheet1", "folder9").await.unwrap_err();

    assert_eq!(err.spreadsheet_id(), Some("sheet1"));
    assert!(matches!(err, ExportError::SheetMove { status: 404, .. }));
}

#[tokio::test]
async fn test_long_row_rejected_before_any_request() {
    // No mocks registered: a request would fail loudly.
    let server = Server::new_async().await;
    let ragged = ResultSet {
        columns: vec!["a".to_string()],
        rows: vec![vec![Cell::Int(1), Cell::Int(2)]],
    };

    let client = client_for(&server);
    let err = client.write_values("sheet1", &ragged).await.unwrap_err();

    assert!(matches!(
        err,
        ExportError::RowWidth {
            row: 0,
            expected: 1,
            actual: 2
        }
    ));
}

#[tokio::test]
async fn test_large_result_sets_are_written_in_batches() {
    let mut server = Server::new_async().await;
    let update = server
        .mock("PUT", "/spreadsheets/sheet1/values/Sheet1!A1")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({"spreadsheetId": "sheet1", "updatedRows": 5000}).to_string())
        .expect(1)
        .create_async()
        .await;
    let append = server
        .mock("POST", "/spreadsheets/sheet1/values/Sheet1!A1:append")
        .match_query(Matcher::UrlEncoded(
            "insertDataOption".into(),
            "INSERT_ROWS".into(),
        ))
        .with_status(200)
        .with_body(json!({"spreadsheetId": "sheet1"}).to_string())
        .expect(1)
        .create_async()
        .await;

    // Header plus 5001 data rows: one full update batch, one appended batch.
    let big = ResultSet {
        columns: vec!["n".to_string()],
        rows: (0..5001).map(|i| vec![Cell::Int(i)]).collect(),
    };

    let client = client_for(&server);
    client.write_values("sheet1", &big).await.unwrap();

    update.assert_async().await;
    append.assert_async().await;
}
