//! API-mode scenarios against a local axum server
//!
//! Run with: cargo test --package sitecheck-e2e --test http_scenarios

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use sitecheck_e2e::{FailureKind, Outcome, RunnerConfig, Scenario, TestRunner};
use test_case::test_case;

#[derive(Clone, Default)]
struct AppState {
    hits: Arc<AtomicUsize>,
}

async fn home() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        "<html><head><title>Biome — Toolchain</title></head></html>",
    )
}

async fn version() -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "public, max-age=60")],
        Json(json!({"version": "1.9.0", "features": {"lint": true}})),
    )
}

async fn format_code(Json(body): Json<Value>) -> impl IntoResponse {
    if body["syntax"] == "invalid" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid syntax: unexpected token"})),
        );
    }
    let lines = body["code"].as_str().map(|code| code.lines().count()).unwrap_or(0);
    (StatusCode::OK, Json(json!({"formatted": body["code"], "lines": lines})))
}

async fn login() -> impl IntoResponse {
    ([(header::SET_COOKIE, "session=abc123; Path=/")], "welcome")
}

async fn me(headers: HeaderMap) -> impl IntoResponse {
    let signed_in = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("session=abc123"))
        .unwrap_or(false);
    if signed_in {
        (StatusCode::OK, Json(json!({"user": "biome"})))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"error": "not signed in"})))
    }
}

async fn hit(State(state): State<AppState>) -> impl IntoResponse {
    let n = state.hits.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "hits": n }))
}

async fn spawn_site() -> (String, AppState) {
    let state = AppState::default();
    let app = Router::new()
        .route("/", get(home))
        .route("/api/version", get(version))
        .route("/api/format", post(format_code))
        .route("/login", get(login))
        .route("/me", get(me))
        .route("/hit", get(hit))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

fn runner(base_url: &str) -> TestRunner {
    TestRunner::with_config(RunnerConfig {
        base_url: base_url.to_string(),
        step_timeout_ms: 5_000,
        ..Default::default()
    })
}

fn scenario(yaml: &str) -> Scenario {
    Scenario::from_yaml(yaml).unwrap()
}

#[test_case("/this-page-does-not-exist", None ; "missing page is a 404")]
#[test_case("/", Some("expected status 404, got 200") ; "home page is not a 404")]
#[tokio::test(flavor = "multi_thread")]
async fn bad_endpoint(target: &str, failure: Option<&str>) {
    let (base, _) = spawn_site().await;
    let yaml = format!(
        "name: bad-endpoint\ntarget: {target}\nmode: api\nsteps:\n  - action: http_request\n  - action: assert_status\n    code: 404\n"
    );

    let suite = runner(&base).run(vec![scenario(&yaml)]).await.unwrap();
    let outcome = &suite.results[0].outcome;

    match failure {
        None => assert_eq!(*outcome, Outcome::Passed),
        Some(expected) => assert_eq!(
            *outcome,
            Outcome::Failed {
                kind: FailureKind::Assertion,
                step: Some(1),
                reason: expected.to_string(),
            }
        ),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn json_fields_and_headers() {
    let (base, _) = spawn_site().await;
    let yaml = r#"
name: version-endpoint
target: /api/version
mode: api
steps:
  - action: http_request
  - action: assert_status_ok
  - action: assert_header
    name: Content-Type
    pattern: { contains: application/json }
  - action: assert_header
    name: cache-control
  - action: assert_json_field
    path: version
    matcher: { matches: { regex: '^\d+\.\d+\.\d+$' } }
  - action: assert_json_field
    path: features.lint
    matcher: { equals: true }
"#;
    let suite = runner(&base).run(vec![scenario(yaml)]).await.unwrap();
    assert_eq!(suite.results[0].outcome, Outcome::Passed);
    assert_eq!(suite.results[0].steps.len(), 6);
}

#[tokio::test(flavor = "multi_thread")]
async fn post_body_and_error_payload() {
    let (base, _) = spawn_site().await;
    let yaml = r#"
name: format-invalid
target: /
mode: api
steps:
  - action: http_request
    method: POST
    url: /api/format
    body: { code: "const = ;", syntax: invalid }
  - action: assert_status
    code: 400
  - action: assert_json_field
    path: error
    matcher: { matches: { regex: "(?i)invalid syntax" } }
  - action: assert_json_field
    path: formatted
    matcher: exists
"#;
    let suite = runner(&base).run(vec![scenario(yaml)]).await.unwrap();

    match &suite.results[0].outcome {
        Outcome::Failed { kind, step, reason } => {
            assert_eq!(*kind, FailureKind::Assertion);
            assert_eq!(*step, Some(3));
            assert_eq!(reason, "expected JSON field 'formatted' to exist");
        }
        other => panic!("expected failure on the missing field, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cookies_persist_within_a_scenario_only() {
    let (base, _) = spawn_site().await;
    let signed_in = r#"
name: signed-in
target: /me
mode: api
setup:
  - action: http_request
    url: /login
steps:
  - action: http_request
  - action: assert_status
    code: 200
"#;
    let anonymous = r#"
name: anonymous
target: /me
mode: api
steps:
  - action: http_request
  - action: assert_status
    code: 401
"#;
    let suite = runner(&base)
        .run(vec![scenario(signed_in), scenario(anonymous)])
        .await
        .unwrap();

    assert!(suite.success(), "{:?}", suite.results);
    assert_eq!(suite.passed, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_requests_all_reach_the_server() {
    let (base, state) = spawn_site().await;
    let yaml = r#"
name: burst
target: /hit
mode: api
steps:
  - action: http_request
    repeat: 5
  - action: assert_status_ok
"#;
    let suite = runner(&base).run(vec![scenario(yaml)]).await.unwrap();

    assert!(suite.success());
    assert_eq!(state.hits.load(Ordering::SeqCst), 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn connection_refused_is_a_transport_failure() {
    let (base, _) = spawn_site().await;
    let yaml = r#"
name: dead-service
target: /
mode: api
steps:
  - action: http_request
    url: http://127.0.0.1:1/health
"#;
    let suite = runner(&base).run(vec![scenario(yaml)]).await.unwrap();

    match &suite.results[0].outcome {
        Outcome::Failed { kind, step, .. } => {
            assert_eq!(*kind, FailureKind::Transport);
            assert_eq!(*step, Some(0));
        }
        other => panic!("expected transport failure, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_body_field_is_sent_in_full() {
    let (base, _) = spawn_site().await;
    let yaml = r#"
name: large-payload
target: /api/format
mode: api
steps:
  - action: http_request
    method: POST
    body:
      code: "console.log(\"hello\");\n"
      syntax: js
    body_repeat:
      field: code
      times: 1000
  - action: assert_status_ok
  - action: assert_json_field
    path: lines
    matcher: { equals: 1000 }
"#;
    let suite = runner(&base).run(vec![scenario(yaml)]).await.unwrap();

    assert_eq!(suite.results[0].outcome, Outcome::Passed);
}

#[tokio::test(flavor = "multi_thread")]
async fn results_file_is_written() {
    let (base, _) = spawn_site().await;
    let dir = tempfile::tempdir().unwrap();
    let runner = TestRunner::with_config(RunnerConfig {
        base_url: base.clone(),
        output_dir: dir.path().join("results"),
        ..Default::default()
    });
    let yaml = "name: home\ntarget: /\nmode: api\nsteps:\n  - action: http_request\n  - action: assert_status_ok\n";

    let suite = runner.run(vec![scenario(yaml)]).await.unwrap();
    let path = runner.write_results(&suite).unwrap();

    let written: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written["passed"], 1);
    assert_eq!(written["results"][0]["outcome"]["status"], "passed");
    assert_eq!(written["base_url"], format!("{}/", base));
}
