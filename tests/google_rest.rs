//! The Google REST clients against an in-process server that answers like
//! the BigQuery, Firestore and metadata endpoints.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Json, Router,
    body::{Body, Bytes, to_bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use clap::Parser;
use datadrive::{AppConfig, AppState, Backends, build_router};
use serde_json::{Value, json};
use tower::ServiceExt;

const TOKEN: &str = "meta-token";

#[derive(Clone, Default)]
struct Fake {
    token_requests: Arc<AtomicUsize>,
    polls: Arc<AtomicUsize>,
}

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {TOKEN}");
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some(expected.as_str())
}

fn google_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {"code": status.as_u16(), "message": message}})),
    )
        .into_response()
}

async fn metadata_token(State(fake): State<Fake>, headers: HeaderMap) -> Response {
    if headers.get("metadata-flavor").and_then(|v| v.to_str().ok()) != Some("Google") {
        return StatusCode::FORBIDDEN.into_response();
    }
    fake.token_requests.fetch_add(1, Ordering::SeqCst);
    Json(json!({"access_token": TOKEN, "expires_in": 3599, "token_type": "Bearer"})).into_response()
}

fn job_reference(project: &str) -> Value {
    json!({"projectId": project, "jobId": "job_1", "location": "EU"})
}

async fn bigquery_query(
    Path(project): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return google_error(StatusCode::UNAUTHORIZED, "missing credentials");
    }
    if project == "missing" {
        return google_error(StatusCode::NOT_FOUND, "Not found: Dataset missing:d1");
    }
    if body["useLegacySql"] != json!(false) || body["query"] != json!("SELECT * FROM `p1.d1.v1`") {
        return google_error(StatusCode::BAD_REQUEST, "unexpected query");
    }
    Json(json!({"jobReference": job_reference(&project), "jobComplete": false})).into_response()
}

async fn bigquery_results(
    State(fake): State<Fake>,
    Path((project, job)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return google_error(StatusCode::UNAUTHORIZED, "missing credentials");
    }
    if job != "job_1" || params.get("location").map(String::as_str) != Some("EU") {
        return google_error(StatusCode::NOT_FOUND, "no such job");
    }
    fake.polls.fetch_add(1, Ordering::SeqCst);

    let schema = json!({"fields": [
        {"name": "a", "type": "INTEGER"},
        {"name": "ts", "type": "TIMESTAMP"},
        {"name": "tags", "type": "STRING", "mode": "REPEATED"}
    ]});

    match params.get("pageToken").map(String::as_str) {
        None => Json(json!({
            "jobReference": job_reference(&project),
            "jobComplete": true,
            "schema": schema,
            "rows": [{"f": [{"v": "1"}, {"v": "1.6E9"}, {"v": [{"v": "x"}]}]}],
            "pageToken": "page_2"
        }))
        .into_response(),
        Some("page_2") => Json(json!({
            "jobReference": job_reference(&project),
            "jobComplete": true,
            "schema": schema,
            "rows": [{"f": [{"v": "2"}, {"v": null}, {"v": []}]}]
        }))
        .into_response(),
        Some(_) => google_error(StatusCode::BAD_REQUEST, "bad page token"),
    }
}

fn firestore_doc(project: &str, path: &str, fields: Value) -> Value {
    json!({
        "name": format!("projects/{project}/databases/(default)/documents/{path}"),
        "fields": fields,
        "createTime": "2024-01-01T00:00:00Z",
        "updateTime": "2024-01-01T00:00:00Z"
    })
}

fn firestore_collection_ids(project: &str, body: &[u8]) -> Response {
    let request: Value = serde_json::from_slice(body).unwrap_or_default();
    if project != "full" {
        return Json(json!({})).into_response();
    }
    match request["pageToken"].as_str() {
        None => Json(json!({"collectionIds": ["users"], "nextPageToken": "more"})).into_response(),
        Some("more") => Json(json!({"collectionIds": ["empty"]})).into_response(),
        Some(_) => google_error(StatusCode::BAD_REQUEST, "bad page token"),
    }
}

async fn firestore(
    Path((project, _db, rest)): Path<(String, String, String)>,
    method: Method,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&headers) {
        return google_error(StatusCode::UNAUTHORIZED, "missing credentials");
    }

    let rest = rest.trim_start_matches('/');
    if method == Method::POST {
        return match rest {
            "documents:listCollectionIds" => firestore_collection_ids(&project, &body),
            other => google_error(StatusCode::NOT_FOUND, &format!("no method {other}")),
        };
    }

    let ada = firestore_doc(
        &project,
        "users/ada",
        json!({
            "name": {"stringValue": "Ada"},
            "born": {"integerValue": "1815"},
            "home": {"geoPointValue": {"latitude": 51.5, "longitude": -0.12}},
            "langs": {"arrayValue": {"values": [{"stringValue": "en"}, {"nullValue": null}]}}
        }),
    );
    let bob = firestore_doc(&project, "users/bob", json!({"name": {"stringValue": "Bob"}}));

    match rest.strip_prefix("documents/").unwrap_or(rest) {
        "users/ada" => Json(ada).into_response(),
        "users" => match params.get("pageToken").map(String::as_str) {
            None => Json(json!({"documents": [ada], "nextPageToken": "next"})).into_response(),
            Some("next") => Json(json!({"documents": [bob]})).into_response(),
            Some(_) => google_error(StatusCode::BAD_REQUEST, "bad page token"),
        },
        "empty" => Json(json!({})).into_response(),
        other => google_error(StatusCode::NOT_FOUND, &format!("Document {other} not found")),
    }
}

async fn start_fake() -> (SocketAddr, Fake) {
    let fake = Fake::default();
    let router = Router::new()
        .route(
            "/computeMetadata/v1/instance/service-accounts/default/token",
            get(metadata_token),
        )
        .route("/bigquery/v2/projects/:project/queries", post(bigquery_query))
        .route("/bigquery/v2/projects/:project/queries/:job", get(bigquery_results))
        .route("/v1/projects/:project/databases/:db/*rest", any(firestore))
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("fake server should bind");
    let addr = listener.local_addr().expect("bound address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("fake server should run");
    });
    (addr, fake)
}

async fn service() -> (axum::Router, Fake) {
    let (addr, fake) = start_fake().await;
    let config = AppConfig::try_parse_from([
        "datadrive".to_string(),
        "--metadata-host".to_string(),
        addr.to_string(),
        "--bigquery-endpoint".to_string(),
        format!("http://{addr}/bigquery/v2"),
        "--firestore-endpoint".to_string(),
        format!("http://{addr}/v1"),
        "--page-size".to_string(),
        "1".to_string(),
    ])
    .expect("config should parse");

    let backends = Backends::from_config(&config).expect("backends should build");
    (build_router(AppState::from_config(backends, &config)), fake)
}

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let response = app.clone().oneshot(request).await.expect("response expected");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should be readable");

    match serde_json::from_slice::<Value>(&body) {
        Ok(json) => (status, json),
        Err(_) => (status, Value::String(String::from_utf8_lossy(&body).into_owned())),
    }
}

#[tokio::test]
async fn bigquery_job_is_polled_and_paged() {
    let (app, fake) = service().await;

    let (status, body) = get_json(&app, "/columnar/p1/d1/v1").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(
        body,
        json!([
            {"a": 1, "ts": "2020-09-13T12:26:40+00:00", "tags": ["x"]},
            {"a": 2, "ts": null, "tags": []}
        ])
    );
    assert_eq!(fake.polls.load(Ordering::SeqCst), 2);
    assert_eq!(fake.token_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bigquery_errors_surface_the_api_message() {
    let (app, _fake) = service().await;

    let (status, body) = get_json(&app, "/columnar/missing/d1/v1").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let text = body.as_str().unwrap_or_default();
    assert!(text.contains("Not found: Dataset missing:d1"), "{text}");
}

#[tokio::test]
async fn firestore_document_values_are_decoded() {
    let (app, _fake) = service().await;

    let (status, body) = get_json(&app, "/document/p1/users/ada").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(
        body,
        json!({
            "name": "Ada",
            "born": 1815,
            "home": {"latitude": 51.5, "longitude": -0.12},
            "langs": ["en", null]
        })
    );
}

#[tokio::test]
async fn firestore_collection_pages_are_drained() {
    let (app, _fake) = service().await;

    let (status, body) = get_json(&app, "/document/p1/users").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let ids: Vec<&str> = body
        .as_array()
        .expect("array body")
        .iter()
        .filter_map(|doc| doc["docid"].as_str())
        .collect();
    assert_eq!(ids, vec!["ada", "bob"]);
}

#[tokio::test]
async fn firestore_missing_document_is_not_found() {
    let (app, _fake) = service().await;

    let (status, _) = get_json(&app, "/document/p1/users/nobody").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_firestore_root_is_an_empty_array() {
    let (app, _fake) = service().await;

    let (status, body) = get_json(&app, "/document/p1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn firestore_root_lists_every_top_level_collection() {
    let (app, _fake) = service().await;

    let (status, body) = get_json(&app, "/document/full").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let ids: Vec<&str> = body
        .as_array()
        .expect("array body")
        .iter()
        .filter_map(|doc| doc["docid"].as_str())
        .collect();
    assert_eq!(ids, vec!["ada", "bob"]);
}
