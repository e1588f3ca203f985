//! HTTP gateway.
//!
//! All memory traffic enters here. The auth middleware guards every
//! path except health, debug, and login; handlers resolve a session
//! identity, then fan out to the episodic backend, the profile store,
//! or both. Internal error detail is logged and never echoed to
//! callers.

mod stream;

pub use stream::TapStream;

use crate::config::GatewayConfig;
use crate::episodic::EpisodicClient;
use crate::llm::{LlmProvider, OpenAiCompatClient};
use crate::services::{ConsolidationEngine, ProfileUpdater, SessionResolver, TokenAuthority};
use crate::storage::ProfileStore;
use crate::{Error, Result, current_timestamp};
use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Paths reachable without a credential.
const EXEMPT_PATHS: &[&str] = &["/health", "/debug", "/auth/login"];

/// How often expired tokens are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default result limit for searches and profile listings.
const DEFAULT_LIMIT: usize = 20;

/// Shared state behind every handler.
pub struct GatewayState {
    config: GatewayConfig,
    tokens: TokenAuthority,
    resolver: SessionResolver,
    store: Arc<ProfileStore>,
    updater: Arc<ProfileUpdater>,
    episodic: EpisodicClient,
    started_at: u64,
}

/// The assembled gateway.
pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    /// Builds the gateway from configuration.
    ///
    /// A decision model is attached only when an API key is configured;
    /// without one the gateway still serves episodic traffic, it just
    /// never learns profile entries.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        let store = Arc::new(ProfileStore::new());

        let llm: Option<Arc<dyn LlmProvider>> = config.llm.api_key.as_ref().map(|api_key| {
            let http = crate::llm::LlmHttpConfig::from_config(&config.llm);
            let mut client =
                OpenAiCompatClient::with_http_config(http).with_api_key(api_key.as_str());
            if let Some(model) = &config.llm.model {
                client = client.with_model(model.as_str());
            }
            if let Some(base_url) = &config.llm.base_url {
                client = client.with_endpoint(base_url.as_str());
            }
            Arc::new(client) as Arc<dyn LlmProvider>
        });

        let mut engine =
            ConsolidationEngine::new(Arc::clone(&store), config.consolidation.clone());
        if let Some(llm) = &llm {
            engine = engine.with_llm(Arc::clone(llm));
        }
        let mut updater = ProfileUpdater::new(Arc::clone(&store), Arc::new(engine));
        if let Some(llm) = &llm {
            updater = updater.with_llm(Arc::clone(llm));
        }

        let state = GatewayState {
            tokens: TokenAuthority::new(&config.auth),
            resolver: SessionResolver::new(config.identity.clone()),
            store,
            updater: Arc::new(updater),
            episodic: EpisodicClient::new(&config.episodic),
            started_at: current_timestamp(),
            config,
        };

        Self {
            state: Arc::new(state),
        }
    }

    /// Builds the router with all routes and middleware attached.
    #[must_use]
    pub fn router(&self) -> Router {
        use tower_http::set_header::SetResponseHeaderLayer;
        use tower_http::trace::TraceLayer;

        Router::new()
            .route("/auth/login", post(login))
            .route("/auth/logout", post(logout))
            .route("/memories", post(add_memory).delete(delete_memories))
            .route("/memories/search", post(search_memories))
            .route("/profile", get(get_profile))
            .route("/episodic", get(stream_episodic))
            .route("/health", get(health))
            .route("/debug", get(debug_info))
            .layer(middleware::from_fn_with_state(
                Arc::clone(&self.state),
                require_auth,
            ))
            // Security headers (OWASP recommendations)
            .layer(SetResponseHeaderLayer::overriding(
                header::X_CONTENT_TYPE_OPTIONS,
                header::HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::X_FRAME_OPTIONS,
                header::HeaderValue::from_static("DENY"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                header::HeaderValue::from_static("no-store"),
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// Binds the listener and serves until shutdown.
    pub async fn serve(self) -> Result<()> {
        let addr = format!(
            "{}:{}",
            self.state.config.bind_addr, self.state.config.port
        );
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Internal(format!("bind {addr}: {e}")))?;
        tracing::info!(addr = %addr, auth = self.state.tokens.auth_required(), "gateway listening");

        let sweeper_state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                sweeper_state.tokens.sweep();
            }
        });

        let router = self.router();
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(format!("serve: {e}")))
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {err}");
        return;
    }
    tracing::info!("shutdown signal received");
}

/// Wraps domain errors for the HTTP boundary.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Unauthorized(_) | Error::InvalidCredentials | Error::MissingToken => {
                StatusCode::UNAUTHORIZED
            }
            Error::AuthNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Error::TokenNotFound => StatusCode::NOT_FOUND,
            Error::UnrevokableToken => StatusCode::CONFLICT,
            Error::MissingIdentity
            | Error::InvalidTag(_)
            | Error::MalformedCommand(_)
            | Error::SessionRequired => StatusCode::BAD_REQUEST,
            Error::BackendUnavailable { .. } | Error::OracleMalformedResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Internal detail stays in the logs.
        let message = if matches!(self.0, Error::Internal(_)) {
            tracing::error!(error = %self.0, "internal error");
            "internal error".to_string()
        } else {
            self.0.to_string()
        };

        metrics::counter!("memgate_errors_total", "code" => self.0.code()).increment(1);

        let body = Json(serde_json::json!({
            "error": { "code": self.0.code(), "message": message }
        }));

        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

/// Pulls the credential from a request.
///
/// Precedence: `Authorization: Bearer` first, then `x-api-key`, then
/// `x-gateway-token`.
fn extract_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }
    for name in ["x-api-key", "x-gateway-token"] {
        if let Some(value) = headers.get(name) {
            if let Ok(value) = value.to_str() {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Auth middleware over every non-exempt path.
async fn require_auth(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if EXEMPT_PATHS.contains(&path) || !state.tokens.auth_required() {
        return next.run(request).await;
    }

    let Some(credential) = extract_credential(request.headers()) else {
        metrics::counter!("memgate_auth_rejected_total").increment(1);
        return ApiError(Error::Unauthorized("no credential supplied".to_string()))
            .into_response();
    };

    match state.tokens.validate(&credential) {
        Ok(subject) => {
            tracing::debug!(subject = %subject, path, "authenticated");
            next.run(request).await
        }
        Err(err) => {
            metrics::counter!("memgate_auth_rejected_total").increment(1);
            ApiError(err).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<LoginRequest>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let token = state.tokens.login(&request.username, &request.password)?;
    Ok(Json(serde_json::json!({
        "token": token.value,
        "expires_at": token.expires_at,
    })))
}

async fn logout(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let credential = extract_credential(&headers).ok_or(Error::MissingToken)?;
    state.tokens.revoke(&credential)?;
    Ok(Json(serde_json::json!({ "revoked": true })))
}

#[derive(Debug, Deserialize)]
struct AddMemoryRequest {
    content: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

async fn add_memory(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(request): Json<AddMemoryRequest>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let resolved = state.resolver.resolve(
        &headers,
        request.user_id.as_deref(),
        request.session_id.as_deref(),
    )?;
    let session = resolved.session;

    state.episodic.add_episode(&session, &request.content).await?;

    // Profile learning is best-effort: the episode is already stored,
    // so a failing decision model must not fail the request.
    let updater = Arc::clone(&state.updater);
    let user_id = session.user_id.clone();
    let content = request.content;
    let joined = tokio::task::spawn_blocking(move || updater.ingest(&user_id, &content)).await;
    let profile = profile_summary(joined);

    Ok(Json(serde_json::json!({
        "status": "ok",
        "user_id": session.user_id,
        "session_id": session.session_id,
        "profile": profile,
    })))
}

/// Folds the profile pass result into the response fragment.
///
/// Every failure shape, an ingest error or a panicked worker thread,
/// degrades to a null summary. The episode is already stored by the
/// time this runs.
fn profile_summary(
    joined: std::result::Result<Result<crate::services::IngestOutcome>, tokio::task::JoinError>,
) -> serde_json::Value {
    match joined {
        Ok(Ok(outcome)) => serde_json::json!({
            "added": outcome.added,
            "removed": outcome.removed,
            "anomalies": outcome.anomalies,
        }),
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "profile update failed, episode kept");
            serde_json::Value::Null
        }
        Err(err) => {
            tracing::warn!(error = %err, "profile update task aborted, episode kept");
            serde_json::Value::Null
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

async fn search_memories(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let resolved = state.resolver.resolve(
        &headers,
        request.user_id.as_deref(),
        request.session_id.as_deref(),
    )?;
    let session = resolved.session;
    let limit = request.limit.unwrap_or(DEFAULT_LIMIT);

    let episodic = state.episodic.search(&session, &request.query, limit).await?;
    let profile: Vec<_> = state
        .store
        .search(&session.user_id, &request.query, limit)
        .into_iter()
        .map(|scored| scored.entry)
        .collect();

    Ok(Json(serde_json::json!({
        "episodic": episodic,
        "profile": profile,
    })))
}

#[derive(Debug, Default, Deserialize)]
struct DeleteRequest {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

async fn delete_memories(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    request: Option<Json<DeleteRequest>>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let resolved = state.resolver.resolve(
        &headers,
        request.user_id.as_deref(),
        request.session_id.as_deref(),
    )?;
    // Deleting against the substituted default session would silently
    // target shared data, so the session must be explicit.
    let session = resolved.require_supplied_session()?;

    state.episodic.delete_session(session).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
struct ProfileQuery {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    user_id: Option<String>,
}

async fn get_profile(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Query(params): Query<ProfileQuery>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let resolved = state
        .resolver
        .resolve(&headers, params.user_id.as_deref(), None)?;
    let user_id = &resolved.session.user_id;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);

    let entries: Vec<_> = match params.query.as_deref().map(str::trim) {
        Some(query) if !query.is_empty() => state
            .store
            .search(user_id, query, limit)
            .into_iter()
            .map(|scored| scored.entry)
            .collect(),
        _ => state.store.entries_for(user_id, limit),
    };

    Ok(Json(serde_json::json!({
        "user_id": user_id,
        "entries": entries,
    })))
}

#[derive(Debug, Deserialize)]
struct EpisodicQuery {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

/// Streams the backend's search response through unmodified.
async fn stream_episodic(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Query(params): Query<EpisodicQuery>,
) -> std::result::Result<Response, ApiError> {
    let resolved = state.resolver.resolve(
        &headers,
        params.user_id.as_deref(),
        params.session_id.as_deref(),
    )?;
    let query = params.query.unwrap_or_default();
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);

    let upstream = state
        .episodic
        .search_raw(&resolved.session, &query, limit)
        .await?;

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| header::HeaderValue::from_static("application/json"));

    let tap = TapStream::new("episodic", upstream.bytes_stream());
    let mut response = Response::new(Body::from_stream(tap));
    response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    Ok(response)
}

async fn health(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let backend = state.episodic.healthy().await;
    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": current_timestamp().saturating_sub(state.started_at),
        "backend_reachable": backend,
    }))
}

async fn debug_info(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "now": chrono::Utc::now().to_rfc3339(),
        "uptime_secs": current_timestamp().saturating_sub(state.started_at),
        "auth_required": state.tokens.auth_required(),
        "live_tokens": state.tokens.token_count(),
        "episodic_url": state.config.episodic.base_url,
        "identity_policy": format!("{:?}", state.config.identity.policy),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_credential_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-gateway-token", "low".parse().unwrap());
        headers.insert("x-api-key", "mid".parse().unwrap());
        assert_eq!(extract_credential(&headers).as_deref(), Some("mid"));

        headers.insert(header::AUTHORIZATION, "Bearer high".parse().unwrap());
        assert_eq!(extract_credential(&headers).as_deref(), Some("high"));
    }

    #[test]
    fn test_extract_credential_ignores_blank_and_non_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic dXNlcg==".parse().unwrap());
        assert_eq!(extract_credential(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer   ".parse().unwrap());
        assert_eq!(extract_credential(&headers), None);
    }

    #[tokio::test]
    async fn test_profile_summary_absorbs_worker_failures() {
        let joined = tokio::task::spawn_blocking(|| {
            Ok(crate::services::IngestOutcome {
                added: 2,
                removed: 1,
                anomalies: 0,
                failed_consolidations: 0,
            })
        })
        .await;
        let summary = profile_summary(joined);
        assert_eq!(summary["added"], 2);
        assert_eq!(summary["removed"], 1);

        let joined = tokio::task::spawn_blocking(
            || -> Result<crate::services::IngestOutcome> {
                Err(Error::Internal("model exploded".into()))
            },
        )
        .await;
        assert_eq!(profile_summary(joined), serde_json::Value::Null);

        // A panicked worker degrades the same way instead of failing
        // the surrounding request.
        let joined = tokio::task::spawn_blocking(
            || -> Result<crate::services::IngestOutcome> { panic!("worker died") },
        )
        .await;
        assert_eq!(profile_summary(joined), serde_json::Value::Null);
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (Error::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (Error::AuthNotConfigured, StatusCode::SERVICE_UNAVAILABLE),
            (Error::TokenNotFound, StatusCode::NOT_FOUND),
            (Error::UnrevokableToken, StatusCode::CONFLICT),
            (Error::SessionRequired, StatusCode::BAD_REQUEST),
            (
                Error::BackendUnavailable {
                    service: "episodic".into(),
                    cause: "down".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                Error::Timeout {
                    operation: "x".into(),
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (Error::Internal("secret detail".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
