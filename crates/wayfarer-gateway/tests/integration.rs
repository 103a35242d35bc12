//! Gateway integration tests: start a real gateway with a fake vision model
//! and drive it over HTTP.
//!
//! Run with: `cargo test -p wayfarer-gateway --test integration`

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use wayfarer_core::config::Config;
use wayfarer_core::error::{APOLOGY_MESSAGE, SERVER_ERROR_MESSAGE};
use wayfarer_providers::{Credentials, VisionModel, VisionRequest};

/// Answers with a fixed text, or fails when `fail` is set.
struct FakeVision {
    fail: bool,
    seen: Mutex<Vec<VisionRequest>>,
}

#[async_trait]
impl VisionModel for FakeVision {
    fn id(&self) -> &str {
        "fake"
    }

    async fn generate(
        &self,
        request: &VisionRequest,
        _credentials: &Credentials,
    ) -> anyhow::Result<String> {
        self.seen.lock().unwrap().push(request.clone());
        if self.fail {
            anyhow::bail!("quota exceeded");
        }
        Ok("這裡是台北101，旁邊就是信義商圈。".into())
    }
}

/// Find an available port.
fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a gateway in the background and return its base URL.
async fn start_test_gateway(model: Arc<FakeVision>, with_key: bool) -> String {
    let port = find_free_port();
    let config = Arc::new(Config::default());

    let credentials = with_key.then(|| Credentials::ApiKey {
        api_key: "test-key".into(),
    });
    let state = Arc::new(
        wayfarer_gateway::GatewayState::new(config, model).with_credentials(credentials),
    );

    tokio::spawn(async move {
        let _ = wayfarer_gateway::start_gateway(state, port).await;
    });

    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if reqwest::get(format!("http://127.0.0.1:{port}/health"))
            .await
            .is_ok()
        {
            break;
        }
    }

    format!("http://127.0.0.1:{port}")
}

fn fake(fail: bool) -> Arc<FakeVision> {
    Arc::new(FakeVision {
        fail,
        seen: Mutex::new(vec![]),
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let base = start_test_gateway(fake(false), true).await;

    let resp = reqwest::get(format!("{base}/health"))
        .await
        .expect("Health request failed");

    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
    assert_eq!(body["model"], "gemini-2.0-flash-lite");
}

#[tokio::test]
async fn test_analyze_forwards_single_turn_jpeg_request() {
    let model = fake(false);
    let base = start_test_gateway(model.clone(), true).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/analyze"))
        .json(&json!({"image": "/9j/4A==", "prompt": "這是哪裡？"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["text"], "這裡是台北101，旁邊就是信義商圈。");
    assert!(body.get("error").is_none());

    let seen = model.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].prompt, "這是哪裡？");
    assert_eq!(seen[0].image_base64, "/9j/4A==");
    assert_eq!(seen[0].mime_type, "image/jpeg");
    assert_eq!(seen[0].model, "gemini-2.0-flash-lite");
}

#[tokio::test]
async fn test_model_failure_is_500_with_apology() {
    let base = start_test_gateway(fake(true), true).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/analyze"))
        .json(&json!({"image": "/9j/4A==", "prompt": "這是哪裡？"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["text"], APOLOGY_MESSAGE);
    assert_eq!(body["error"], SERVER_ERROR_MESSAGE);
}

#[tokio::test]
async fn test_missing_key_is_500() {
    let model = fake(false);
    let base = start_test_gateway(model.clone(), false).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/analyze"))
        .json(&json!({"image": "/9j/4A==", "prompt": "這是哪裡？"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    assert!(model.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_input_is_400() {
    let model = fake(false);
    let base = start_test_gateway(model.clone(), true).await;
    let client = reqwest::Client::new();

    for body in [
        json!({"image": "%%%", "prompt": "q"}),
        json!({"image": "", "prompt": "q"}),
        json!({"prompt": "q"}),
    ] {
        let resp = client
            .post(format!("{base}/analyze"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "body: {body}");
        let reply: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(reply["text"], APOLOGY_MESSAGE);
        assert!(reply["error"].is_string());
    }

    assert!(model.seen.lock().unwrap().is_empty());
}
