mod common;

use axum_test::TestServer;
use utoipa::OpenApi;

use live_api::routes::ApiDoc;

#[tokio::test]
async fn health_reports_ok() {
    let (app, _state, _membership) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server.get("/health").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["channels"], 0);
}

#[tokio::test]
async fn plain_get_on_live_is_not_an_upgrade() {
    let (app, _state, _membership) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server.get("/live").expect_failure().await;
    assert!(resp.status_code().is_client_error());
}

#[test]
fn openapi_documents_both_endpoints() {
    let doc = ApiDoc::openapi();
    assert!(doc.paths.paths.contains_key("/health"));
    assert!(doc.paths.paths.contains_key("/live"));
}
