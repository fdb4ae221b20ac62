//! Control plane API over real TCP, driven with reqwest.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use common::{loopback, player, player_recv, start_relay, Backend};
use peel::modules::control_plane::{ControlPlane, ControlPlaneConfig};
use peel::modules::relay::{Relay, ResolverConfig};
use reqwest::StatusCode;
use serde_json::{json, Value};

struct Api {
    relay: Arc<Relay>,
    base: String,
    client: reqwest::Client,
}

impl Api {
    async fn start() -> Self {
        Self::with_config(ControlPlaneConfig::new("127.0.0.1:0".parse().unwrap())).await
    }

    async fn with_config(config: ControlPlaneConfig) -> Self {
        let relay = start_relay(ResolverConfig::unconfigured()).await;
        let control_plane = ControlPlane::bind(&config, Arc::clone(&relay)).await.unwrap();
        let addr: SocketAddr = control_plane.local_addr();
        tokio::spawn(control_plane.serve(relay.shutdown_token()));

        Self {
            relay,
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> (StatusCode, Value) {
        let response = request.send().await.unwrap();
        let status = response.status();
        assert_eq!(
            response.headers()["content-type"],
            "application/json",
            "every response is JSON"
        );
        (status, response.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(self.client.get(format!("{}{path}", self.base))).await
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        self.send(self.client.delete(format!("{}{path}", self.base))).await
    }

    async fn post_raw(&self, path: &str, body: &str) -> (StatusCode, Value) {
        self.send(
            self.client
                .post(format!("{}{path}", self.base))
                .body(body.to_string()),
        )
        .await
    }

    async fn set_route(&self, player_ip: &str, backend: &str) -> (StatusCode, Value) {
        self.send(
            self.client
                .post(format!("{}/routes", self.base))
                .json(&json!({"player_ip": player_ip, "backend": backend})),
        )
        .await
    }
}

#[tokio::test]
async fn test_health() {
    let api = Api::start().await;
    assert_eq!(api.get("/health").await, (StatusCode::OK, json!({"status": "healthy"})));
    api.relay.stop().await;
}

#[tokio::test]
async fn test_route_lifecycle() {
    let api = Api::start().await;

    assert_eq!(api.get("/routes").await, (StatusCode::OK, json!({})));

    let (status, body) = api.set_route("203.0.113.50", "10.0.50.2:5521").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    assert_eq!(
        api.get("/routes").await,
        (StatusCode::OK, json!({"203.0.113.50": "10.0.50.2:5521"}))
    );

    let (status, _) = api.delete("/routes/203.0.113.50").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(api.get("/routes").await, (StatusCode::OK, json!({})));

    // Deleting a missing route still succeeds.
    let (status, _) = api.delete("/routes/203.0.113.50").await;
    assert_eq!(status, StatusCode::OK);

    api.relay.stop().await;
}

#[tokio::test]
async fn test_bad_requests() {
    let api = Api::start().await;

    let (status, body) = api.post_raw("/routes", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "invalid json"}));

    let (status, body) = api.post_raw("/routes", r#"{"player_ip": "1.2.3.4"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "player_ip and backend required"}));

    let (status, _) = api.set_route("not-an-ip", "10.0.0.1:5521").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api.delete("/sessions/nope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(api.relay.routes().is_empty());
    api.relay.stop().await;
}

#[tokio::test]
async fn test_unknown_path_and_wrong_method() {
    let api = Api::start().await;

    let (status, body) = api.get("/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = api.delete("/routes").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = api.post_raw("/health", "").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    api.relay.stop().await;
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let mut config = ControlPlaneConfig::new("127.0.0.1:0".parse().unwrap());
    config.max_body_size = 256;
    let api = Api::with_config(config).await;

    let huge = format!(
        r#"{{"player_ip": "1.2.3.4", "backend": "{}"}}"#,
        "x".repeat(1024)
    );
    let (status, _) = api.post_raw("/routes", &huge).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(api.relay.routes().is_empty());

    api.relay.stop().await;
}

#[tokio::test]
async fn test_post_route_retargets_active_session() {
    let api = Api::start().await;
    let mut first = Backend::start("first").await;
    let mut second = Backend::start("second").await;

    let (status, _) = api.set_route("127.0.0.1", &first.addr.to_string()).await;
    assert_eq!(status, StatusCode::OK);

    let player = player().await;
    player.send_to(b"a", api.relay.local_addr()).await.unwrap();
    let before = first.recv().await;
    assert_eq!(player_recv(&player).await, b"first:a");

    let (status, _) = api.set_route("127.0.0.1", &second.addr.to_string()).await;
    assert_eq!(status, StatusCode::OK);

    player.send_to(b"b", api.relay.local_addr()).await.unwrap();
    let after = second.recv().await;
    assert_eq!(after.payload, b"b");
    assert_eq!(after.from, before.from, "outbound socket is kept");
    assert_eq!(player_recv(&player).await, b"second:b");
    assert_eq!(api.relay.sessions().len(), 1);

    api.relay.stop().await;
}

#[tokio::test]
async fn test_post_route_with_unresolvable_backend_keeps_session() {
    let api = Api::start().await;
    let mut backend = Backend::start("b1").await;
    api.set_route("127.0.0.1", &backend.addr.to_string()).await;

    let player = player().await;
    player.send_to(b"a", api.relay.local_addr()).await.unwrap();
    backend.recv().await;

    let (status, body) = api.set_route("127.0.0.1", "game-7.invalid:5521").await;
    assert_eq!((status, body), (StatusCode::OK, json!({"status": "ok"})));
    assert_eq!(
        api.relay.routes().get(&loopback()),
        Some("game-7.invalid:5521".to_string())
    );

    // The live session stays on the backend it could still reach.
    let session = api.relay.sessions().get(&loopback()).unwrap();
    assert_eq!(session.backend_addr(), backend.addr);
    player.send_to(b"b", api.relay.local_addr()).await.unwrap();
    assert_eq!(backend.recv().await.payload, b"b");

    api.relay.stop().await;
}

#[tokio::test]
async fn test_delete_session_keeps_route() {
    let api = Api::start().await;
    let mut backend = Backend::start("b1").await;
    api.set_route("127.0.0.1", &backend.addr.to_string()).await;

    let player = player().await;
    player.send_to(b"a", api.relay.local_addr()).await.unwrap();
    backend.recv().await;
    assert_eq!(api.relay.sessions().len(), 1);

    let (status, body) = api.delete("/sessions/127.0.0.1").await;
    assert_eq!((status, body), (StatusCode::OK, json!({"status": "ok"})));
    assert!(api.relay.sessions().is_empty());
    assert_eq!(
        api.relay.routes().get(&loopback()),
        Some(backend.addr.to_string())
    );

    api.relay.stop().await;
}

#[tokio::test]
async fn test_delete_route_closes_session() {
    let api = Api::start().await;
    let mut backend = Backend::start("b1").await;
    api.set_route("127.0.0.1", &backend.addr.to_string()).await;

    let player = player().await;
    player.send_to(b"a", api.relay.local_addr()).await.unwrap();
    backend.recv().await;
    let session = api.relay.sessions().get(&loopback()).unwrap();

    let (status, _) = api.delete("/routes/127.0.0.1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(api.relay.sessions().is_empty());
    assert!(api.relay.routes().is_empty());
    assert!(!session.is_active());

    api.relay.stop().await;
}
