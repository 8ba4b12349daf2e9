//! HTTP surface tests driving the router in-process and over a real socket

mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use common::controller;
use iperf_watcher::web::create_router;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_healthz() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(controller(dir.path(), Path::new("iperf3")));

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_start_requests_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller(dir.path(), &dir.path().join("never-spawned"));
    let queue_before = controller.current_queue();

    let cases = [
        (json!({"target": ""}), "Target is required."),
        (json!({"protocol": "tcp"}), "Target is required."),
        (
            json!({"target": "10.0.0.5", "protocol": "sctp"}),
            "Invalid protocol. Must be \"tcp\" or \"udp\".",
        ),
        (
            json!({"target": "10.0.0.5", "streams": 0}),
            "Streams must be a positive integer.",
        ),
    ];

    for (body, message) in cases {
        let response = create_router(Arc::clone(&controller))
            .oneshot(post_json("/run_iperf", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!({ "error": message }));
    }

    // No run was installed and no queue replaced
    assert!(Arc::ptr_eq(&queue_before, &controller.current_queue()));
    assert_eq!(controller.run_status().run_id, 0);
    assert!(!dir.path().join("logs").exists());
}

#[tokio::test]
async fn test_interfaces_and_stats() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(controller(dir.path(), Path::new("iperf3")));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/interfaces").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(json_body(response).await, json!({ "interfaces": ["eth0"] }));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/stats?iface=eth0").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let stats = json_body(response).await;
    assert_eq!(stats["iface"], "eth0");
    assert_eq!(stats["running"], false);
    assert_eq!(stats["unit"], "Mbits");
    assert_eq!(stats["run_id"], 0);
    assert_eq!(stats["link"]["speed"], "1000Mb/s");
    assert_eq!(stats["counters"]["ok"], true);

    let response = app
        .oneshot(Request::builder().uri("/api/stats?iface=wlan9").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let stats = json_body(response).await;
    assert_eq!(stats["counters"]["ok"], false);
    assert_eq!(stats["delta"], json!({}));
}

#[tokio::test]
async fn test_stop_without_run() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(controller(dir.path(), Path::new("iperf3")));

    let response = app
        .oneshot(Request::builder().method("POST").uri("/stop_iperf").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(json_body(response).await, json!({ "stopped": false }));
}

#[cfg(unix)]
#[tokio::test]
async fn test_live_stream_over_http() {
    use common::{INTERVAL_125_MBITS, fake_iperf};
    use tokio::net::TcpListener;

    let dir = tempfile::tempdir().unwrap();
    let binary = fake_iperf(dir.path(), "iperf3", INTERVAL_125_MBITS);
    let app = create_router(controller(dir.path(), &binary));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let started: Value = client
        .post(format!("http://{addr}/run_iperf"))
        .json(&json!({"target": "10.0.0.5", "streams": 2, "units": "Mbits"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(started["status"], "iperf3 started");
    assert_eq!(started["run_id"], 1);

    let response = client
        .get(format!("http://{addr}/stream_iperf"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert_eq!(response.headers()["cache-control"], "no-cache");
    assert_eq!(response.headers()["x-accel-buffering"], "no");

    let body = tokio::time::timeout(std::time::Duration::from_secs(10), response.text())
        .await
        .expect("stream did not end")
        .unwrap();
    assert!(body.starts_with(": stream\n\nretry:"));
    assert!(body.contains("data: stream_connected\n\n"));
    assert!(body.contains("data: CMD: "));
    assert!(body.contains("data: 125.0\n\n"));
    assert!(body.ends_with("data: -1\n\n"));
}
