//! End-to-end daemon tests over real HTTP.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use gasoline_server::{ServerConfig, ServerHandle, bind, serve};

/// Boot a daemon on an ephemeral port; returns its address.
async fn boot() -> SocketAddr {
    let mut config = ServerConfig::default();
    config.port = 0;

    let handle = ServerHandle::new(config.clone()).unwrap();
    let (listener, addr) = bind(&config).await.unwrap();
    tokio::spawn(serve(listener, handle, std::future::pending()));
    addr
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_cold_start_health_within_slo() {
    let started = Instant::now();
    let addr = boot().await;

    let response = client()
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert!(
        started.elapsed() < Duration::from_millis(600),
        "cold start took {:?}",
        started.elapsed()
    );

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["extension_connected"], false);
}

#[tokio::test]
async fn test_ingest_then_observe_roundtrip() {
    let addr = boot().await;
    let client = client();

    let posted = client
        .post(format!("http://{addr}/logs"))
        .json(&json!([
            {
                "level": "error",
                "message": "TypeError: x is undefined",
                "source": "app.js",
                "ts": "2026-07-31T10:00:00Z"
            }
        ]))
        .send()
        .await
        .unwrap();
    assert!(posted.status().is_success());

    let response: Value = client
        .post(format!("http://{addr}/mcp"))
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": "observe", "arguments": { "what": "logs" } }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("TypeError"), "{text}");
    assert!(text.contains("\"is_stale\": true"), "{text}");
}

#[tokio::test]
async fn test_command_flow_over_long_poll() {
    let addr = boot().await;
    let client = client();

    // Heartbeat so interact treats the extension as connected.
    client
        .post(format!("http://{addr}/sync"))
        .json(&json!({ "tab": { "id": 7, "url": "https://app.test/", "title": "App" } }))
        .send()
        .await
        .unwrap();

    // The "extension": long-poll, execute, post the result back.
    let poller = {
        let client = client.clone();
        tokio::spawn(async move {
            let body: Value = client
                .get(format!("http://{addr}/next-command"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            let command = &body["command"];
            assert_eq!(command["type"], "click");

            client
                .post(format!("http://{addr}/command-result"))
                .json(&json!({
                    "correlationId": command["correlationId"],
                    "status": "complete",
                    "result": { "clicked": true }
                }))
                .send()
                .await
                .unwrap();
        })
    };

    // The MCP client: a click that blocks until the result lands.
    let response: Value = client
        .post(format!("http://{addr}/mcp"))
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {
                "name": "interact",
                "arguments": { "action": "click", "selector": "#login" }
            }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    poller.await.unwrap();

    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("Clicked #login"), "{text}");
    assert!(text.contains("\"clicked\": true"), "{text}");
}

#[tokio::test]
async fn test_clear_reports_prior_count() {
    let addr = boot().await;
    let client = client();

    client
        .post(format!("http://{addr}/logs"))
        .json(&json!([
            { "level": "warn", "message": "a", "ts": "2026-07-31T10:00:00Z" },
            { "level": "warn", "message": "b", "ts": "2026-07-31T10:00:01Z" }
        ]))
        .send()
        .await
        .unwrap();

    let cleared: Value = client
        .post(format!("http://{addr}/clear"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cleared["cleared"], 2);

    let again: Value = client
        .delete(format!("http://{addr}/clear"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["cleared"], 0);
}

#[tokio::test]
async fn test_snapshot_and_test_boundary() {
    let addr = boot().await;
    let client = client();

    client
        .post(format!("http://{addr}/test-boundary"))
        .json(&json!({ "testId": "login-flow", "action": "start" }))
        .send()
        .await
        .unwrap();

    let snapshot: Value = client
        .get(format!("http://{addr}/snapshot?test_id=login-flow"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot["testId"], "login-flow");
    assert!(snapshot["stats"].as_array().unwrap().len() >= 7);
}

#[tokio::test]
async fn test_invalid_json_gets_structured_error() {
    let addr = boot().await;

    let response = client()
        .post(format!("http://{addr}/logs"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 422);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "validation_error");
}
