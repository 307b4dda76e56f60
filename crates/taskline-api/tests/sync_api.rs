//! API integration tests.
//!
//! Tests the complete request flow: HTTP → routes → sync engine → stores.

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use taskline_api::config::{Config, JwtConfig};
use taskline_api::server::Server;

const TEST_JWT_SECRET: &str = "test-jwt-secret";

fn test_router() -> Router {
    Server::new(Config::default()).test_router()
}

fn test_router_prod() -> Router {
    let config = Config {
        debug: false,
        jwt: JwtConfig {
            hs256_secret: Some(TEST_JWT_SECRET.to_string()),
            ..JwtConfig::default()
        },
        ..Config::default()
    };
    Server::new(config).test_router()
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("X-User-Id", user);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };

    let response = router.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).context("response body is not JSON")?
    };
    Ok((status, value))
}

async fn push(router: &Router, user: &str, operations: Value) -> Result<(StatusCode, Value)> {
    send(
        router,
        Method::POST,
        "/sync/push",
        Some(user),
        Some(json!({ "operations": operations })),
    )
    .await
}

#[tokio::test]
async fn health_is_public() -> Result<()> {
    let (status, body) = send(&test_router(), Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn ready_probes_the_cursor_store() -> Result<()> {
    let (status, body) = send(&test_router(), Method::GET, "/ready", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    Ok(())
}

#[tokio::test]
async fn push_requires_a_user() -> Result<()> {
    let router = test_router();
    let (status, _) = send(
        &router,
        Method::POST,
        "/sync/push",
        None,
        Some(json!({"operations": []})),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&router, Method::GET, "/sync/pull", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn undecodable_body_is_a_400_invalid_body() -> Result<()> {
    let router = test_router();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/sync/push")
        .header("X-User-Id", "u1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))?;
    let response = router.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await?.to_bytes();
    let body: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body["error"], "invalid body");
    Ok(())
}

#[tokio::test]
async fn null_operations_is_an_empty_batch() -> Result<()> {
    let router = test_router();
    let (status, body) = send(
        &router,
        Method::POST,
        "/sync/push",
        Some("u1"),
        Some(json!({})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], json!([]));
    assert_eq!(body["conflicts"], json!([]));
    assert_eq!(body["new_cursor"], "0");
    Ok(())
}

#[tokio::test]
async fn create_then_pull_round_trips() -> Result<()> {
    let router = test_router();
    let (status, body) = push(
        &router,
        "u1",
        json!([{
            "op_id": "o1",
            "entity_id": "t1",
            "operation": "create",
            "base_version": 0,
            "payload": {"title": "A"}
        }]),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], json!(["o1"]));
    assert_eq!(body["conflicts"], json!([]));
    assert_eq!(body["new_cursor"], "1");

    let (status, body) = send(
        &router,
        Method::GET,
        "/sync/pull?cursor=0",
        Some("u1"),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let changes = body["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["cursor"], "1");
    assert_eq!(changes[0]["entity_id"], "t1");
    assert_eq!(changes[0]["operation"], "create");
    assert_eq!(changes[0]["deleted"], false);
    assert_eq!(changes[0]["snapshot"]["id"], "t1");
    assert_eq!(changes[0]["snapshot"]["title"], "A");
    assert_eq!(changes[0]["snapshot"]["version"], 1);
    assert_eq!(body["next_cursor"], "1");
    Ok(())
}

#[tokio::test]
async fn stale_update_reports_the_latest_snapshot() -> Result<()> {
    let router = test_router();
    push(
        &router,
        "u1",
        json!([{"op_id": "o1", "entity_id": "t1", "operation": "create",
                "base_version": 0, "payload": {"title": "A"}}]),
    )
    .await?;

    let (status, body) = push(
        &router,
        "u1",
        json!([{"op_id": "o2", "entity_id": "t1", "operation": "update",
                "base_version": 99, "payload": {"title": "B"}}]),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], json!([]));
    let conflicts = body["conflicts"].as_array().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0]["op_id"], "o2");
    assert_eq!(conflicts[0]["error"], "version mismatch");
    assert_eq!(conflicts[0]["latest"]["title"], "A");
    assert_eq!(conflicts[0]["latest"]["version"], 1);
    assert_eq!(body["new_cursor"], "1");
    Ok(())
}

#[tokio::test]
async fn replayed_push_is_idempotent() -> Result<()> {
    let router = test_router();
    let op = json!([{"op_id": "o1", "entity_id": "t1", "operation": "create",
                     "base_version": 0, "payload": {"title": "A"}}]);

    for _ in 0..3 {
        let (status, body) = push(&router, "u1", op.clone()).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["applied"], json!(["o1"]));
        assert_eq!(body["new_cursor"], "1");
    }

    let (_, body) = send(&router, Method::GET, "/sync/pull", Some("u1"), None).await?;
    assert_eq!(body["changes"].as_array().unwrap().len(), 1);
    assert_eq!(body["changes"][0]["snapshot"]["version"], 1);
    Ok(())
}

#[tokio::test]
async fn pull_paginates_with_a_limit() -> Result<()> {
    let router = test_router();
    let ops: Vec<Value> = (1..=5)
        .map(|i| {
            json!({"op_id": format!("o{i}"), "entity_id": format!("t{i}"),
                   "operation": "create", "base_version": 0,
                   "payload": {"title": format!("task {i}")}})
        })
        .collect();
    push(&router, "u1", Value::Array(ops)).await?;

    let (_, first) = send(
        &router,
        Method::GET,
        "/sync/pull?cursor=0&limit=2",
        Some("u1"),
        None,
    )
    .await?;
    assert_eq!(first["changes"].as_array().unwrap().len(), 2);
    assert_eq!(first["next_cursor"], "2");

    let (_, second) = send(
        &router,
        Method::GET,
        "/sync/pull?cursor=2&limit=2",
        Some("u1"),
        None,
    )
    .await?;
    assert_eq!(second["changes"].as_array().unwrap().len(), 2);
    assert_eq!(second["changes"][0]["cursor"], "3");
    assert_eq!(second["next_cursor"], "4");
    Ok(())
}

#[tokio::test]
async fn change_streams_are_user_scoped() -> Result<()> {
    let router = test_router();
    push(
        &router,
        "alice",
        json!([{"op_id": "o1", "entity_id": "t1", "operation": "create",
                "base_version": 0, "payload": {"title": "private"}}]),
    )
    .await?;

    let (_, body) = send(&router, Method::GET, "/sync/pull", Some("bob"), None).await?;
    assert_eq!(body["changes"], json!([]));
    assert_eq!(body["next_cursor"], "0");
    Ok(())
}

#[tokio::test]
async fn prod_mode_accepts_a_valid_bearer_token() -> Result<()> {
    let router = test_router_prod();
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &json!({"sub": "u1", "exp": 4_102_444_800_u64}),
        &jsonwebtoken::EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )?;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/sync/push")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&json!({"operations": []}))?))?;
    let response = router.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn prod_mode_rejects_missing_and_garbage_tokens() -> Result<()> {
    let router = test_router_prod();

    let (status, _) = send(&router, Method::GET, "/sync/pull", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/sync/pull")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())?;
    let response = router.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let (status, body) = send(&test_router(), Method::GET, "/openapi.json", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"].get("/sync/push").is_some());
    Ok(())
}
