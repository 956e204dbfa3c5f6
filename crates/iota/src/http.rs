//! Axum HTTP surface of the iota server.
//!
//! Every route lives under `/api/v1`. Reads are unauthenticated and gated
//! by the version the device reports; the `/deploy/*` routes sit behind
//! [`require_write`]; `/token` does its own checks because its rules depend
//! on the method.

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get, put},
    Json, Router,
};
use iota_auth::{AuthError, Authorizer, TokenHasher};
use iota_core::{ArtifactStore, Capability, TokenStore};
use iota_deploy::{DeployError, FirmwareRead, FirmwareWrite, LocalConfigRead, LocalConfigWrite};
use iota_vault::{ConfigKey, GlobalConfigRead, GlobalConfigWrite, VaultError};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";
pub const FIRMWARE_VERSION_HEADER: &str = "x-firmware-version";
pub const DEVICE_VERSION_HEADER: &str = "x-esp8266-version";
pub const CHIP_ID_HEADER: &str = "x-chip-id";
pub const CONFIG_VERSION_HEADER: &str = "x-config-version";
pub const GLOBAL_KEY_HEADER: &str = "x-global-config-key";
pub const GLOBAL_VERSION_HEADER: &str = "x-global-config-version";

/// Shared application state for Axum handlers.
pub struct AppState {
    pub tokens: Arc<dyn TokenStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub hasher: TokenHasher,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn authorizer(&self) -> Authorizer<'_> {
        Authorizer::new(self.tokens.as_ref(), &self.hasher)
    }
}

/// Build the Axum router with all endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    let deploy = Router::new()
        .route("/api/v1/deploy/firmware", put(handle_deploy_firmware))
        .route("/api/v1/deploy/local_config", put(handle_deploy_local_config))
        .route("/api/v1/deploy/global_config", put(handle_deploy_global_config))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_write));

    Router::new()
        .route("/api/v1", get(handle_landing))
        .route("/api/v1/health", get(handle_health))
        .route("/api/v1/token", any(handle_token))
        .route("/api/v1/firmware", get(handle_firmware))
        .route("/api/v1/local_config", get(handle_local_config))
        .route("/api/v1/global_config", get(handle_global_config))
        .merge(deploy)
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// JSON error reply: `{"error": <kind>, "message": <text>}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", "not authorized")
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    /// Logs `detail`; the client only sees a generic message.
    fn internal(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        tracing::error!(error = %detail, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", "internal error")
    }

    /// Version gate said no; reported as 404 the way devices expect.
    fn no_new_version(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "no_new_version", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({"error": self.kind, "message": self.message})),
        )
            .into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Conflict(_) => ApiError::new(StatusCode::CONFLICT, "conflict", e.to_string()),
            AuthError::BadRequest(_) => ApiError::bad_request(e.to_string()),
            AuthError::NotFound => ApiError::not_found(e.to_string()),
            AuthError::Storage(_) | AuthError::Hashing(_) | AuthError::Config(_) => {
                ApiError::internal(e.to_string())
            }
        }
    }
}

impl From<DeployError> for ApiError {
    fn from(e: DeployError) -> Self {
        match e {
            DeployError::NotFound(_) => ApiError::not_found(e.to_string()),
            DeployError::MalformedInput(_) => ApiError::bad_request(e.to_string()),
            DeployError::Storage(_) => ApiError::internal(e.to_string()),
        }
    }
}

impl From<VaultError> for ApiError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::InvalidKey(_) | VaultError::Decryption | VaultError::MalformedDocument => {
                tracing::warn!(error = %e, "global config access refused");
                ApiError::forbidden(e.to_string())
            }
            VaultError::Unavailable => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                e.to_string(),
            ),
            VaultError::MalformedInput(_) => ApiError::bad_request(e.to_string()),
            VaultError::Encryption(_) | VaultError::Storage(_) | VaultError::Serialization(_) => {
                ApiError::internal(e.to_string())
            }
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_json(body: &Bytes) -> Result<serde_json::Value, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON body: {}", e)))
}

fn config_key(headers: &HeaderMap) -> Result<ConfigKey, ApiError> {
    let encoded = header_str(headers, GLOBAL_KEY_HEADER)
        .ok_or_else(|| ApiError::forbidden("no key supplied"))?;
    Ok(ConfigKey::from_base64(encoded)?)
}

fn json_bytes(status: StatusCode, bytes: Vec<u8>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        bytes,
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

/// Rejects the request with 401 unless `X-auth-token` grants write.
pub async fn require_write(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let token = header_str(req.headers(), AUTH_TOKEN_HEADER).map(str::to_owned);
    if verify_blocking(state, token, Capability::Write).await {
        next.run(req).await
    } else {
        tracing::warn!(path = %req.uri().path(), "deploy rejected: token lacks write");
        ApiError::unauthorized().into_response()
    }
}

/// Runs Argon2 verification on the blocking pool.
async fn verify_blocking(state: Arc<AppState>, token: Option<String>, required: Capability) -> bool {
    tokio::task::spawn_blocking(move || state.authorizer().verify(token.as_deref(), required))
        .await
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Landing and health
// ---------------------------------------------------------------------------

/// GET /api/v1
async fn handle_landing() -> &'static str {
    "iota OTA server\n"
}

/// GET /api/v1/health
async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct TokenBody {
    name: Option<String>,
    permissions: Option<String>,
    /// Presence of the key asks for a new secret; the value is ignored.
    #[serde(default, deserialize_with = "present")]
    token: bool,
}

fn present<'de, D: serde::Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    serde::de::IgnoredAny::deserialize(d).map(|_| true)
}

/// GET | PUT | UPDATE | PATCH | DELETE /api/v1/token
async fn handle_token(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = header_str(&headers, AUTH_TOKEN_HEADER).map(str::to_owned);
    let result = tokio::task::spawn_blocking(move || {
        dispatch_token(&state, &method, token.as_deref(), &body)
    })
    .await;

    match result {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => e.into_response(),
        Err(e) => ApiError::internal(format!("token worker failed: {}", e)).into_response(),
    }
}

fn dispatch_token(
    state: &AppState,
    method: &Method,
    token: Option<&str>,
    body: &Bytes,
) -> Result<Response, ApiError> {
    let auth = state.authorizer();
    if !auth.verify(token, Capability::Read) {
        return Err(ApiError::forbidden("not authorized"));
    }
    let token = token.unwrap_or_default();

    let req: TokenBody = if body.is_empty() {
        TokenBody::default()
    } else {
        serde_json::from_slice(body)
            .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {}", e)))?
    };
    let name = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let permissions = req.permissions.as_deref().filter(|p| !p.is_empty());
    let is_admin = || auth.verify(Some(token), Capability::Admin);

    match method.as_str() {
        "GET" => {
            if is_admin() {
                let tokens = auth.list(name)?;
                return Ok((StatusCode::OK, Json(json!({ "tokens": tokens }))).into_response());
            }
            if let Some(name) = name {
                if auth.verify_named(name, token) {
                    let tokens = auth.list(Some(name))?;
                    return Ok((StatusCode::OK, Json(json!({ "tokens": tokens }))).into_response());
                }
            }
        }
        "PUT" => {
            if let (Some(name), Some(permissions)) = (name, permissions) {
                if is_admin() {
                    let issued = auth.create(name, permissions)?;
                    return Ok((StatusCode::CREATED, Json(issued)).into_response());
                }
            }
        }
        "UPDATE" | "PATCH" => {
            if let Some(name) = name {
                if (permissions.is_some() || req.token) && is_admin() {
                    let issued = auth.rotate_or_update(name, permissions, req.token)?;
                    return Ok((StatusCode::OK, Json(issued)).into_response());
                }
            }
        }
        "DELETE" => {
            if let Some(name) = name {
                if is_admin() {
                    auth.delete(name)?;
                    return Ok((StatusCode::ACCEPTED, Json(json!({}))).into_response());
                }
            }
        }
        _ => {}
    }
    Err(ApiError::not_found("no such token operation"))
}

// ---------------------------------------------------------------------------
// Firmware
// ---------------------------------------------------------------------------

/// GET /api/v1/firmware
async fn handle_firmware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let caller = header_str(&headers, DEVICE_VERSION_HEADER);
    match iota_deploy::fetch_firmware(state.artifacts.as_ref(), caller)? {
        FirmwareRead::NotModified { .. } => Ok(StatusCode::NOT_MODIFIED.into_response()),
        FirmwareRead::Current { record, image } => {
            tracing::info!(caller = caller.unwrap_or("-"), version = %record.version, "serving firmware");
            let version = HeaderValue::from_str(&record.version)
                .map_err(|e| ApiError::internal(format!("bad stored version: {}", e)))?;
            let mut response = Response::new(Body::from(image));
            let h = response.headers_mut();
            h.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            h.insert(FIRMWARE_VERSION_HEADER, version);
            Ok(response)
        }
    }
}

/// PUT /api/v1/deploy/firmware
async fn handle_deploy_firmware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let version = header_str(&headers, FIRMWARE_VERSION_HEADER);
    match iota_deploy::deploy_firmware(state.artifacts.as_ref(), version, &body)? {
        FirmwareWrite::Stale { .. } => Ok(StatusCode::NOT_MODIFIED.into_response()),
        FirmwareWrite::Accepted(record) => Ok((
            StatusCode::CREATED,
            Json(json!({
                "firmware": "successfully deployed",
                "version": record.version,
                "sha256": record.sha256,
                "size": record.size,
            })),
        )
            .into_response()),
    }
}

// ---------------------------------------------------------------------------
// Local config
// ---------------------------------------------------------------------------

/// GET /api/v1/local_config
async fn handle_local_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let chip_id = header_str(&headers, CHIP_ID_HEADER);
    let caller = header_str(&headers, CONFIG_VERSION_HEADER);
    match iota_deploy::fetch_local_config(state.artifacts.as_ref(), chip_id, caller)? {
        LocalConfigRead::Stale { .. } => Err(ApiError::no_new_version("no new version")),
        LocalConfigRead::Current { document, .. } => Ok(json_bytes(StatusCode::OK, document)),
    }
}

/// PUT /api/v1/deploy/local_config
async fn handle_deploy_local_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let chip_id = header_str(&headers, CHIP_ID_HEADER);
    if chip_id.is_none() {
        return Err(ApiError::not_found("no chip id given"));
    }
    let payload = parse_json(&body)?;
    match iota_deploy::deploy_local_config(state.artifacts.as_ref(), chip_id, payload)? {
        LocalConfigWrite::Stale { .. } => Err(ApiError::no_new_version(
            "new version <= current version",
        )),
        LocalConfigWrite::Accepted { version, document } => Ok((
            StatusCode::CREATED,
            Json(json!({ "local_config": document, "config_version": version })),
        )
            .into_response()),
    }
}

// ---------------------------------------------------------------------------
// Global config
// ---------------------------------------------------------------------------

/// GET /api/v1/global_config
async fn handle_global_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let key = config_key(&headers)?;
    let caller = header_str(&headers, GLOBAL_VERSION_HEADER).unwrap_or("0");
    match iota_vault::read_global_config(state.artifacts.as_ref(), caller, &key)? {
        GlobalConfigRead::Stale { .. } => Err(ApiError::no_new_version("no new version")),
        GlobalConfigRead::Current { plaintext, .. } => {
            Ok(json_bytes(StatusCode::OK, plaintext.to_vec()))
        }
    }
}

/// PUT /api/v1/deploy/global_config
async fn handle_deploy_global_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let key = config_key(&headers)?;
    let document = parse_json(&body)?;
    match iota_vault::write_global_config(state.artifacts.as_ref(), &key, document)? {
        GlobalConfigWrite::Stale { .. } => Ok(StatusCode::NOT_MODIFIED.into_response()),
        GlobalConfigWrite::Accepted { version, document } => Ok((
            StatusCode::CREATED,
            Json(json!({ "global_config": document, "global_config_version": version })),
        )
            .into_response()),
    }
}
