//! End-to-end tests against the HTTP router.
//!
//! Each test builds the router over in-memory stores and drives it with
//! `oneshot` requests the way a device or a deployer would.

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use base64::Engine;
use http_body_util::BodyExt;
use iota::http::{build_router, AppState};
use iota_auth::{IssuedToken, TokenHasher};
use iota_vault::in_memory_backend::{InMemoryArtifactStore, InMemoryTokenStore};
use iota_vault::ConfigKey;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct Harness {
    app: Router,
    state: Arc<AppState>,
    artifacts: Arc<InMemoryArtifactStore>,
}

impl Harness {
    fn new() -> Self {
        let artifacts = Arc::new(InMemoryArtifactStore::new());
        let state = Arc::new(AppState {
            tokens: Arc::new(InMemoryTokenStore::new()),
            artifacts: artifacts.clone(),
            hasher: TokenHasher::with_params(256, 1, 1).unwrap(),
            max_upload_bytes: 1024 * 1024,
        });
        Self {
            app: build_router(state.clone()),
            state,
            artifacts,
        }
    }

    fn issue(&self, name: &str, permissions: &str) -> IssuedToken {
        self.state.authorizer().create(name, permissions).unwrap()
    }

    async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(req).await.unwrap()
    }
}

fn request(method: &str, uri: &str, headers: &[(&str, &str)], body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::from_bytes(method.as_bytes()).unwrap())
        .uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(body.into()).unwrap()
}

async fn body_bytes(resp: Response<Body>) -> Vec<u8> {
    resp.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(resp: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

fn b64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

// ============================================================================
// Landing and health
// ============================================================================

#[tokio::test]
async fn test_landing_and_health() {
    let h = Harness::new();

    let resp = h.send(request("GET", "/api/v1", &[], Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = h.send(request("GET", "/api/v1/health", &[], Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "ok");
}

// ============================================================================
// Firmware
// ============================================================================

#[tokio::test]
async fn test_firmware_deploy_then_devices_update() {
    let h = Harness::new();
    let writer = h.issue("ci", "w");
    let image = b"\x7fELF firmware image v1.1".to_vec();

    // Nothing deployed yet.
    let resp = h
        .send(request("GET", "/api/v1/firmware", &[("X-esp8266-version", "0.1")], Body::empty()))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = h
        .send(request(
            "PUT",
            "/api/v1/deploy/firmware",
            &[("X-auth-token", &writer.token), ("X-firmware-version", "1.1")],
            b64(&image),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp).await;
    assert_eq!(body["version"], "1.1");
    assert_eq!(body["size"], image.len());

    // Device on an older version gets the image.
    let resp = h
        .send(request("GET", "/api/v1/firmware", &[("X-esp8266-version", "1.0")], Body::empty()))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-firmware-version"], "1.1");
    assert_eq!(resp.headers()["content-type"], "application/octet-stream");
    assert_eq!(body_bytes(resp).await, image);

    // A device without a version header counts as "0".
    let resp = h.send(request("GET", "/api/v1/firmware", &[], Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Current or newer devices get 304.
    for v in ["1.1", "1.2", "2"] {
        let resp = h
            .send(request("GET", "/api/v1/firmware", &[("X-esp8266-version", v)], Body::empty()))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED, "device version {}", v);
    }
}

#[tokio::test]
async fn test_firmware_stale_deploy_not_modified() {
    let h = Harness::new();
    let writer = h.issue("ci", "w");
    let deploys = [
        ("1.2", StatusCode::CREATED),
        ("1.2", StatusCode::NOT_MODIFIED),
        ("1.10", StatusCode::CREATED),
        ("1.9", StatusCode::NOT_MODIFIED),
    ];
    for (version, expected) in deploys {
        let resp = h
            .send(request(
                "PUT",
                "/api/v1/deploy/firmware",
                &[("X-auth-token", &writer.token), ("X-firmware-version", version)],
                b64(version.as_bytes()),
            ))
            .await;
        assert_eq!(resp.status(), expected, "deploy {}", version);
    }

    let resp = h
        .send(request("GET", "/api/v1/firmware", &[("X-esp8266-version", "1.9")], Body::empty()))
        .await;
    assert_eq!(resp.headers()["x-firmware-version"], "1.10");
    assert_eq!(body_bytes(resp).await, b"1.10");
}

#[tokio::test]
async fn test_firmware_bad_body_and_missing_version() {
    let h = Harness::new();
    let writer = h.issue("ci", "w");

    let resp = h
        .send(request(
            "PUT",
            "/api/v1/deploy/firmware",
            &[("X-auth-token", &writer.token), ("X-firmware-version", "1.0")],
            "not base64 !!",
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "bad_request");

    let resp = h
        .send(request(
            "PUT",
            "/api/v1/deploy/firmware",
            &[("X-auth-token", &writer.token)],
            b64(b"image"),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(h.artifacts.keys().is_empty());
}

// ============================================================================
// Local config
// ============================================================================

#[tokio::test]
async fn test_local_config_lifecycle() {
    let h = Harness::new();
    let writer = h.issue("ci", "w");
    let chip = "0x00ab12cd";

    let resp = h
        .send(request(
            "PUT",
            "/api/v1/deploy/local_config",
            &[("X-auth-token", &writer.token), ("X-chip-id", chip)],
            json!({"name": "greenhouse", "interval": 30}).to_string(),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp).await;
    assert_eq!(body["config_version"], 1);
    assert_eq!(body["local_config"]["name"], "greenhouse");
    assert_eq!(body["local_config"]["config_version"], 1);

    let resp = h
        .send(request(
            "GET",
            "/api/v1/local_config",
            &[("X-chip-id", chip), ("X-config-version", "0")],
            Body::empty(),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let doc = body_json(resp).await;
    assert_eq!(doc["interval"], 30);
    assert_eq!(doc["config_version"], 1);

    let resp = h
        .send(request(
            "GET",
            "/api/v1/local_config",
            &[("X-chip-id", chip), ("X-config-version", "1")],
            Body::empty(),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"], "no_new_version");

    // Declared version at or below the stored one is refused.
    let resp = h
        .send(request(
            "PUT",
            "/api/v1/deploy/local_config",
            &[("X-auth-token", &writer.token), ("X-chip-id", chip)],
            json!({"config_version": 1, "name": "overwrite"}).to_string(),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Other devices have nothing.
    let resp = h
        .send(request("GET", "/api/v1/local_config", &[("X-chip-id", "0x00000002")], Body::empty()))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_local_config_rejects_bad_requests() {
    let h = Harness::new();
    let writer = h.issue("ci", "w");

    let resp = h
        .send(request(
            "PUT",
            "/api/v1/deploy/local_config",
            &[("X-auth-token", &writer.token)],
            "{}",
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = h
        .send(request(
            "PUT",
            "/api/v1/deploy/local_config",
            &[("X-auth-token", &writer.token), ("X-chip-id", "0x1")],
            "{not json",
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = h
        .send(request(
            "PUT",
            "/api/v1/deploy/local_config",
            &[("X-auth-token", &writer.token), ("X-chip-id", "../../etc")],
            "{}",
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = h.send(request("GET", "/api/v1/local_config", &[], Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    assert!(h.artifacts.keys().is_empty());
}

// ============================================================================
// Global config
// ============================================================================

#[tokio::test]
async fn test_global_config_vault() {
    let h = Harness::new();
    let writer = h.issue("ci", "w");
    let key = ConfigKey::generate();
    let key_b64 = key.to_base64();
    let wrong_b64 = ConfigKey::generate().to_base64();

    // Nothing stored yet.
    let resp = h
        .send(request("GET", "/api/v1/global_config", &[("X-global-config-key", &key_b64)], Body::empty()))
        .await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let resp = h
        .send(request(
            "PUT",
            "/api/v1/deploy/global_config",
            &[("X-auth-token", &writer.token), ("X-global-config-key", &key_b64)],
            json!({"wifi_ssid": "barn", "wifi_psk": "hunter2"}).to_string(),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(body_json(resp).await["global_config_version"], 1);

    // Only ciphertext reaches storage.
    for (_, stored) in h.artifacts.entries() {
        assert!(!stored.windows(7).any(|w| w == b"hunter2"));
    }

    let resp = h
        .send(request(
            "GET",
            "/api/v1/global_config",
            &[("X-global-config-key", &key_b64), ("X-global-config-version", "0")],
            Body::empty(),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let doc = body_json(resp).await;
    assert_eq!(doc["wifi_psk"], "hunter2");
    assert_eq!(doc["global_config_version"], 1);

    let resp = h
        .send(request(
            "GET",
            "/api/v1/global_config",
            &[("X-global-config-key", &key_b64), ("X-global-config-version", "1")],
            Body::empty(),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = h
        .send(request("GET", "/api/v1/global_config", &[("X-global-config-key", &wrong_b64)], Body::empty()))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = h.send(request("GET", "/api/v1/global_config", &[], Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = h
        .send(request("GET", "/api/v1/global_config", &[("X-global-config-key", "c2hvcnQ=")], Body::empty()))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Stale write.
    let resp = h
        .send(request(
            "PUT",
            "/api/v1/deploy/global_config",
            &[("X-auth-token", &writer.token), ("X-global-config-key", &key_b64)],
            json!({"global_config_version": 1, "wifi_ssid": "old"}).to_string(),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);

    // Writing with the wrong key must not replace the stored document.
    let resp = h
        .send(request(
            "PUT",
            "/api/v1/deploy/global_config",
            &[("X-auth-token", &writer.token), ("X-global-config-key", &wrong_b64)],
            json!({"wifi_ssid": "hijack"}).to_string(),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = h
        .send(request("GET", "/api/v1/global_config", &[("X-global-config-key", &key_b64)], Body::empty()))
        .await;
    assert_eq!(body_json(resp).await["wifi_ssid"], "barn");
}

// ============================================================================
// Capabilities
// ============================================================================

#[tokio::test]
async fn test_deploy_requires_write() {
    let h = Harness::new();
    let reader = h.issue("viewer", "r");
    let admin = h.issue("root", "a");

    let forged = "x".repeat(64);
    for token in [None, Some("short"), Some(reader.token.as_str()), Some(forged.as_str())] {
        let headers: Vec<(&str, &str)> = token
            .map(|t| vec![("X-auth-token", t), ("X-firmware-version", "1.0")])
            .unwrap_or_else(|| vec![("X-firmware-version", "1.0")]);
        let resp = h
            .send(request("PUT", "/api/v1/deploy/firmware", &headers, b64(b"image")))
            .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
    assert!(h.artifacts.keys().is_empty());

    // Admin implies write.
    let resp = h
        .send(request(
            "PUT",
            "/api/v1/deploy/firmware",
            &[("X-auth-token", &admin.token), ("X-firmware-version", "1.0")],
            b64(b"image"),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_write_token_cannot_manage_tokens() {
    let h = Harness::new();
    let writer = h.issue("ci", "w");

    let resp = h
        .send(request(
            "PUT",
            "/api/v1/token",
            &[("X-auth-token", &writer.token)],
            json!({"name": "sneaky", "permissions": "a"}).to_string(),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(h.state.authorizer().list(Some("sneaky")).is_err());
}

// ============================================================================
// Token management
// ============================================================================

#[tokio::test]
async fn test_token_lifecycle() {
    let h = Harness::new();
    let admin = h.issue("root", "arw");
    let auth = [("X-auth-token", admin.token.as_str())];

    let resp = h
        .send(request(
            "PUT",
            "/api/v1/token",
            &auth,
            json!({"name": "sensor-fleet", "permissions": "rxq"}).to_string(),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await;
    assert_eq!(created["name"], "sensor-fleet");
    assert_eq!(created["permissions"], "r");
    let fleet_token = created["token"].as_str().unwrap().to_string();

    let resp = h
        .send(request(
            "PUT",
            "/api/v1/token",
            &auth,
            json!({"name": "sensor-fleet", "permissions": "r"}).to_string(),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = h.send(request("GET", "/api/v1/token", &auth, Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let listed = body_json(resp).await;
    assert_eq!(listed["tokens"].as_array().unwrap().len(), 2);
    assert!(!listed.to_string().contains(&fleet_token));

    // A non-admin may look up its own record only.
    let own = [("X-auth-token", fleet_token.as_str())];
    let resp = h
        .send(request("GET", "/api/v1/token", &own, json!({"name": "sensor-fleet"}).to_string()))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["tokens"][0]["permissions"], "r");

    let resp = h
        .send(request("GET", "/api/v1/token", &own, json!({"name": "root"}).to_string()))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // UPDATE: widen permissions and rotate the secret.
    let resp = h
        .send(request(
            "UPDATE",
            "/api/v1/token",
            &auth,
            json!({"name": "sensor-fleet", "permissions": "rw", "token": null}).to_string(),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated = body_json(resp).await;
    assert_eq!(updated["permissions"], "rw");
    let rotated = updated["token"].as_str().unwrap().to_string();
    assert_ne!(rotated, fleet_token);

    let resp = h
        .send(request("GET", "/api/v1/token", &own, json!({"name": "sensor-fleet"}).to_string()))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN, "old secret is dead");

    let resp = h
        .send(request(
            "PUT",
            "/api/v1/deploy/firmware",
            &[("X-auth-token", &rotated), ("X-firmware-version", "2.0")],
            b64(b"image"),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // UPDATE with nothing to change.
    let resp = h
        .send(request("UPDATE", "/api/v1/token", &auth, json!({"name": "sensor-fleet"}).to_string()))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = h
        .send(request("DELETE", "/api/v1/token", &auth, json!({"name": "sensor-fleet"}).to_string()))
        .await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = h
        .send(request("DELETE", "/api/v1/token", &auth, json!({"name": "sensor-fleet"}).to_string()))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = h
        .send(request("POST", "/api/v1/token", &auth, json!({"name": "x"}).to_string()))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_token_endpoint_requires_read() {
    let h = Harness::new();
    let writer = h.issue("ci", "w");

    for headers in [vec![], vec![("X-auth-token", writer.token.as_str())]] {
        let resp = h.send(request("GET", "/api/v1/token", &headers, Body::empty())).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}

#[tokio::test]
async fn test_rejected_requests_leave_no_trace() {
    let h = Harness::new();
    let writer = h.issue("ci", "w");
    let key_b64 = ConfigKey::generate().to_base64();

    let rejected = [
        request("PUT", "/api/v1/deploy/firmware", &[("X-firmware-version", "1.0")], b64(b"x")),
        request(
            "PUT",
            "/api/v1/deploy/global_config",
            &[("X-auth-token", &writer.token), ("X-global-config-key", &key_b64)],
            "[1, 2, 3]",
        ),
        request(
            "PUT",
            "/api/v1/deploy/global_config",
            &[("X-auth-token", &writer.token)],
            "{}",
        ),
        request(
            "PUT",
            "/api/v1/deploy/local_config",
            &[("X-auth-token", &writer.token), ("X-chip-id", "0x1")],
            "\"just a string\"",
        ),
    ];

    for req in rejected {
        let resp = h.send(req).await;
        assert!(resp.status().is_client_error(), "got {}", resp.status());
        let body = body_json(resp).await;
        assert!(body["error"].is_string());
        assert!(body["message"].is_string());
    }
    assert!(h.artifacts.keys().is_empty());
}

#[tokio::test]
async fn test_firmware_prefixed_versions() {
    let h = Harness::new();
    let writer = h.issue("ci", "w");

    let resp = h
        .send(request(
            "PUT",
            "/api/v1/deploy/firmware",
            &[("X-auth-token", &writer.token), ("X-firmware-version", "v1.0")],
            b64(b"release image"),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = h
        .send(request("GET", "/api/v1/firmware", &[("X-ESP8266-version", "v0.1")], Body::empty()))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-firmware-version"], "v1.0");
    assert_eq!(body_bytes(resp).await, b"release image");

    let resp = h
        .send(request("GET", "/api/v1/firmware", &[("X-ESP8266-version", "v1.0")], Body::empty()))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn test_local_config_second_write_reaches_device() {
    let h = Harness::new();
    let writer = h.issue("ci", "w");
    let put = [("X-auth-token", writer.token.as_str()), ("X-chip-id", "dev-1")];

    for payload in [json!({"led": "off"}), json!({"led": "on"})] {
        let resp = h
            .send(request("PUT", "/api/v1/deploy/local_config", &put, payload.to_string()))
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let resp = h
        .send(request(
            "GET",
            "/api/v1/local_config",
            &[("X-chip-id", "dev-1"), ("X-config-version", "1")],
            Body::empty(),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let doc = body_json(resp).await;
    assert_eq!(doc["config_version"], 2);
    assert_eq!(doc["led"], "on");
}

#[tokio::test]
async fn test_global_config_replayed_write_rejected() {
    let h = Harness::new();
    let writer = h.issue("ci", "w");
    let key_b64 = ConfigKey::generate().to_base64();
    let headers = [("X-auth-token", writer.token.as_str()), ("X-global-config-key", key_b64.as_str())];
    let body = json!({"global_config_version": 5, "ntp": "pool.ntp.org"}).to_string();

    let resp = h
        .send(request("PUT", "/api/v1/deploy/global_config", &headers, body.clone()))
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(body_json(resp).await["global_config_version"], 5);

    let resp = h
        .send(request("PUT", "/api/v1/deploy/global_config", &headers, body))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn test_token_request_with_broken_json() {
    let h = Harness::new();
    let admin = h.issue("root", "arw");
    h.issue("ci", "w");

    let resp = h
        .send(request(
            "GET",
            "/api/v1/token",
            &[("X-auth-token", &admin.token)],
            r#"{"name": "ci""#,
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "bad_request");
    assert!(body.get("tokens").is_none());
}
