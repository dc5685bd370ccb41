//! HTTP admission API

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::{MockTransport, png, wait_until};
use http_body_util::BodyExt;
use print_server::api::build_app;
use print_server::queue::{JobPayload, JobStatus, JobStore};
use print_server::{Config, Server, ServerState};
use serde_json::{Value, json};
use tower::ServiceExt;

struct TestApp {
    _dir: tempfile::TempDir,
    state: ServerState,
}

impl TestApp {
    fn new(configure: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.queue_file = dir.path().join("queue.json");
        configure(&mut config);

        let store = Arc::new(JobStore::open(&config.queue_file, config.retry_count).unwrap());
        let transport = Arc::new(MockTransport::new(&["TG2480", "Kitchen"]));
        let state = ServerState::new(config, store, transport);
        Self { _dir: dir, state }
    }

    fn router(&self) -> Router {
        build_app(&self.state).with_state(self.state.clone())
    }

    async fn call(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn post_print(&self, body: Value) -> (StatusCode, Value) {
        let req = Request::post("/print")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.call(req).await
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn png_base64() -> String {
    STANDARD.encode(png(40, 20, 0))
}

#[tokio::test]
async fn test_health_reports_queue() {
    let app = TestApp::new(|_| {});
    let (status, body) = app.call(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "print-server");
    assert_eq!(body["queue"]["pending"], 0);
}

#[tokio::test]
async fn test_print_queues_job() {
    let app = TestApp::new(|_| {});
    let (status, body) = app
        .post_print(json!({ "image": png_base64(), "printer": "Kitchen", "copies": 2 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let id = body["job_id"].as_str().unwrap().to_string();
    let job = app.state.store.get(&id).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.printer, "Kitchen");
    assert_eq!(job.copies, 2);
    // Stored decoded, not as base64 text
    match job.payload {
        JobPayload::Bytes(bytes) => assert!(bytes.starts_with(b"\x89PNG")),
        other => panic!("unexpected payload {:?}", other),
    }
}

#[tokio::test]
async fn test_print_accepts_jpeg_alias_and_data_uri() {
    let app = TestApp::new(|_| {});
    let uri = format!("data:image/png;base64,{}", png_base64());
    let (status, body) = app.post_print(json!({ "jpeg": uri })).await;
    assert_eq!(status, StatusCode::OK);

    // No printer given: first transport printer is the default
    let id = body["job_id"].as_str().unwrap();
    let job = app.state.store.get(id).unwrap();
    assert_eq!(job.printer, "TG2480");
    assert_eq!(job.copies, 1);
}

#[tokio::test]
async fn test_print_uses_configured_default_printer() {
    let app = TestApp::new(|c| c.default_printer = Some("Kitchen".to_string()));
    let (status, body) = app.post_print(json!({ "image": png_base64() })).await;
    assert_eq!(status, StatusCode::OK);
    let job = app.state.store.get(body["job_id"].as_str().unwrap()).unwrap();
    assert_eq!(job.printer, "Kitchen");
}

#[tokio::test]
async fn test_print_rejections() {
    let app = TestApp::new(|_| {});

    let (status, body) = app
        .post_print(json!({ "image": png_base64(), "copies": 0 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "E0002");

    let (status, _) = app
        .post_print(json!({ "image": png_base64(), "copies": 101 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post_print(json!({ "image": "bm90IGFuIGltYWdl" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "E0006");

    let (status, _) = app
        .post_print(json!({ "image": png_base64(), "printer": "Nowhere" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.post_print(json!({ "printer": "TG2480" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A bad image wins over an unknown printer
    let (status, body) = app
        .post_print(json!({ "image": "bm90IGFuIGltYWdl", "printer": "Nowhere" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "E0006");

    assert!(app.state.store.list().is_empty());
}

#[tokio::test]
async fn test_job_lookup_and_cancel() {
    let app = TestApp::new(|_| {});
    let (_, body) = app.post_print(json!({ "image": png_base64() })).await;
    let id = body["job_id"].as_str().unwrap().to_string();

    let (status, body) = app.call(get(&format!("/jobs/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["retry_count"], 0);

    let (status, body) = app.call(get("/jobs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let delete = || {
        Request::delete(format!("/jobs/{}", id))
            .body(Body::empty())
            .unwrap()
    };
    let (status, body) = app.call(delete()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], true);

    let (_, body) = app.call(delete()).await;
    assert_eq!(body["cancelled"], false);

    let (status, _) = app.call(get("/jobs/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_printers_listed() {
    let app = TestApp::new(|_| {});
    let (status, body) = app.call(get("/printers")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "TG2480");
    assert_eq!(body[0]["is_default"], true);
    assert_eq!(body[1]["is_default"], false);
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let app = TestApp::new(|c| c.api_key = "s3cret".to_string());

    let (status, body) = app.call(get("/jobs")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "E3001");

    let wrong = Request::get("/jobs")
        .header("X-API-Key", "nope")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.call(wrong).await.0, StatusCode::UNAUTHORIZED);

    let header = Request::get("/jobs")
        .header("X-API-Key", "s3cret")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.call(header).await.0, StatusCode::OK);

    assert_eq!(app.call(get("/jobs?api_key=s3cret")).await.0, StatusCode::OK);

    // Health stays public
    assert_eq!(app.call(get("/health")).await.0, StatusCode::OK);
}

#[tokio::test]
async fn test_server_dispatches_until_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.queue_file = dir.path().join("queue.json");
    config.http_port = 0;
    config.poll_interval_ms = 20;

    let store = Arc::new(JobStore::open(&config.queue_file, config.retry_count).unwrap());
    let transport = Arc::new(MockTransport::new(&["TG2480"]));
    let state = ServerState::new(config.clone(), store.clone(), transport.clone());

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(Server::with_state(config, state).run_until(async {
        let _ = stopped.await;
    }));

    let id = store
        .add(JobPayload::from_bytes(png(16, 16, 0)), "TG2480", 1)
        .unwrap();
    let completed = || {
        store
            .get(&id)
            .map(|j| j.status == JobStatus::Completed)
            .unwrap_or(false)
    };
    assert!(wait_until(Duration::from_secs(5), completed).await);

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
    assert_eq!(transport.send_count(), 1);
}
