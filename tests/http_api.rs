//! HTTP API tests driven through the router without a socket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use geneblock::routes::{router, AppState, SESSION_TOKEN_HEADER};
use geneblock::{Session, SessionConfig};

fn app() -> Router {
    router(AppState::new(Session::seeded(SessionConfig::default()).unwrap()))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    call_as(app, None, method, uri, body).await
}

async fn call_as(
    app: &Router,
    token: Option<&str>,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(SESSION_TOKEN_HEADER, token);
    }
    let req = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_and_ledger_views() {
    let app = app();
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = call(&app, "GET", "/ledger", None).await;
    assert_eq!(status, StatusCode::OK);
    let blocks = body.as_array().unwrap();
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0]["metadata"]["Patient ID"], "P001");
    assert_ne!(blocks[0]["payload"], "ATGCTACGATCG");

    let (_, body) = call(&app, "GET", "/ledger/validate", None).await;
    assert_eq!(body["valid"], true);
}

#[tokio::test]
async fn tamper_then_consensus_and_audit() {
    let app = app();
    let (status, record) = call(
        &app,
        "POST",
        "/replicas/Server%201/blocks/1/tamper",
        Some(json!({ "payload": "HACKED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["replica_id"], "Server 1");
    assert_eq!(record["propagation"], "cascade");

    let (_, body) = call(&app, "GET", "/replicas/Server%201/validate", None).await;
    assert_eq!(body["valid"], true);

    let (_, body) = call(&app, "GET", "/consensus", None).await;
    assert_eq!(body["statuses"]["Server 1"], "Rejected");
    assert_eq!(body["statuses"]["Server 2"], "Accepted");
    assert_eq!(body["statuses"]["Server 3"], "Accepted");
    assert_eq!(body["majority"][1]["status"], "agreed");

    let (_, body) = call(&app, "GET", "/audit", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = call(&app, "GET", "/replicas/Server%201/blocks/2/editable", None).await;
    assert_eq!(body["allowed"], false);
}

#[tokio::test]
async fn tamper_rejections_map_to_status_codes() {
    let app = app();
    let (status, _) = call(
        &app,
        "POST",
        "/replicas/Server%209/blocks/0/tamper",
        Some(json!({ "payload": "X" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "POST",
        "/replicas/Server%201/blocks/3/tamper",
        Some(json!({ "payload": "X" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = call(
        &app,
        "POST",
        "/replicas/Server%201/blocks/0/tamper",
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    call(
        &app,
        "POST",
        "/replicas/Server%202/blocks/0/tamper",
        Some(json!({ "payload": "X", "propagation": "isolated" })),
    )
    .await;
    let (status, _) = call(
        &app,
        "POST",
        "/replicas/Server%202/blocks/1/tamper",
        Some(json!({ "payload": "Y", "enforce_edit_guard": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = call(&app, "GET", "/audit", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn admin_login_key_issue_and_decrypt() {
    let app = app();
    let (status, _) = call(&app, "GET", "/ledger/decrypted", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, "POST", "/admin/key", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) =
        call(&app, "POST", "/admin/login", Some(json!({ "credential": "nope" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) =
        call(&app, "POST", "/admin/login", Some(json!({ "credential": "ADMIN123" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "AdminAuthenticated");
    let admin = body["token"].as_str().unwrap().to_string();
    let admin = Some(admin.as_str());

    let (_, body) = call_as(&app, admin, "GET", "/ledger/decrypted", None).await;
    assert_eq!(body[0]["payload"], "ATGCTACGATCG");
    assert_eq!(body[2]["payload"], "TACGGGCTAGCA");

    let (_, old) = call_as(&app, admin, "POST", "/admin/key", None).await;
    let (_, current) = call_as(&app, admin, "POST", "/admin/key", None).await;
    let (status, _) = call(&app, "POST", "/access/key", Some(json!({ "key": old["key"] }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) =
        call(&app, "POST", "/access/key", Some(json!({ "key": current["key"] }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authorized"], true);
    let reader = body["token"].as_str().unwrap().to_string();
    let reader = Some(reader.as_str());

    let (status, body) = call_as(&app, reader, "GET", "/replicas/Server%203/decrypted", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[1]["payload"], "GGGCTAGCTTAC");
    let (status, _) = call_as(&app, reader, "POST", "/admin/key", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // admin sign-out revokes the issued key for the reader too
    let (_, body) = call_as(&app, admin, "POST", "/admin/logout", None).await;
    assert_eq!(body["state"], "Unauthenticated");
    let (status, _) = call_as(&app, admin, "GET", "/ledger/decrypted", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call_as(&app, reader, "GET", "/replicas/Server%203/decrypted", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_login_does_not_unlock_other_callers() {
    let app = app();
    let (_, body) =
        call(&app, "POST", "/admin/login", Some(json!({ "credential": "ADMIN123" }))).await;
    let admin = body["token"].as_str().unwrap().to_string();
    let (status, _) = call_as(&app, Some(&admin), "POST", "/admin/key", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, "GET", "/ledger/decrypted", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, "GET", "/replicas/Server%201/decrypted", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call_as(&app, Some("made-up"), "GET", "/ledger/decrypted", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, "POST", "/admin/key", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn removed_block_shows_in_validation_and_consensus() {
    let app = app();
    let (status, record) = call(
        &app,
        "DELETE",
        "/replicas/Server%202/blocks/1?propagation=isolated",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["note"], "Block deleted.");
    assert_eq!(record["propagation"], "isolated");

    let (_, body) = call(&app, "GET", "/replicas/Server%202/validate", None).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["first_divergence_index"], 1);

    let (_, body) = call(&app, "GET", "/consensus", None).await;
    assert_eq!(body["statuses"]["Server 2"], "Rejected");
    assert_eq!(body["statuses"]["Server 1"], "Accepted");
    assert_eq!(body["majority"].as_array().unwrap().len(), 3);
    assert_eq!(body["no_consensus"].as_array().unwrap().len(), 0);

    let (status, _) = call(&app, "DELETE", "/replicas/Server%202/blocks/5", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (_, body) = call(&app, "GET", "/audit", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn rebuild_replaces_ledger_and_replicas() {
    let app = app();
    let (status, body) = call(
        &app,
        "POST",
        "/ledger",
        Some(json!({ "records": [
            { "metadata": { "Patient ID": "P010" }, "payload": "AAAA" },
            { "payload": "CCCC" }
        ] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = call(&app, "GET", "/replicas", None).await;
    assert_eq!(body["Server 2"]["blocks"].as_array().unwrap().len(), 2);

    let (status, _) = call(&app, "POST", "/ledger", Some(json!({ "records": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
