use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{FromRequestParts, State};
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderName};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::session::{self, Session, SessionError};
use crate::state::AppState;

mod admin;
mod auth;
mod chat;
mod faucet;
mod messages;
mod metadata;
mod signature;

/// Header carrying the opaque session id on privileged calls.
pub const SESSION_HEADER: &str = "x-session";
/// Header carrying the operator token on admin calls.
pub const ADMIN_HEADER: &str = "x-admin-token";
/// Header carrying the queue webhook signature.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-queue-signature";

pub fn router(state: AppState) -> Router {
    assert!(
        state.start_time.elapsed() < Duration::from_secs(86_400),
        "Application uptime exceeds 24 hours before router creation"
    );

    // Configure CORS for the migration frontend.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            ACCEPT,
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(SESSION_HEADER),
            HeaderName::from_static(ADMIN_HEADER),
        ])
        .max_age(Duration::from_secs(3600));

    let api = Router::new()
        .nest("/auth", auth::router())
        .nest("/signature", signature::router())
        .nest("/faucet", faucet::router())
        .nest("/chat", chat::router())
        .nest("/messages", messages::router())
        .nest("/metadata", metadata::router())
        .nest("/admin", admin::router());

    Router::new()
        .route("/health", get(health_live))
        .route("/health/ready", get(health_ready))
        .nest("/api/v1", api)
        .layer(cors)
        .with_state(state)
}

async fn health_live(State(state): State<AppState>) -> Result<Json<HealthResponse>, HttpError> {
    let uptime = state.start_time.elapsed().as_secs();
    assert!(
        uptime <= 31_536_000,
        "Uptime exceeds one year without restart"
    );
    let response = HealthResponse {
        status: "live",
        uptime_seconds: uptime,
    };
    Ok(Json(response))
}

async fn health_ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>, HttpError> {
    state
        .database
        .ping()
        .await
        .map_err(|err| HttpError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()))?;

    let rpc_timeout_ms = u64::try_from(state.primary_rpc.timeout().as_millis())
        .expect("RPC timeout exceeds u64 bounds");

    let response = ReadyResponse {
        status: "ready",
        primary_chain_id: state.primary_rpc.chain_id(),
        legacy_chain_id: state.legacy_rpc.chain_id(),
        rpc_timeout_ms,
        cache_entries: CacheSummary {
            metadata: state.cache.metadata.entry_count(),
            chat_balances: state.cache.chat_balances.entry_count(),
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    primary_chain_id: u64,
    legacy_chain_id: u64,
    rpc_timeout_ms: u64,
    cache_entries: CacheSummary,
}

#[derive(Debug, Serialize)]
struct CacheSummary {
    metadata: u64,
    chat_balances: u64,
}

/// Authenticated session, extracted from the `x-session` header on every
/// privileged route. Missing or unknown ids answer 401; a session that
/// exists but has lapsed answers 403 so the client knows to
/// re-authenticate rather than treat the wallet as never seen.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session_id = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(HttpError::unauthorized)?;

        let now = Utc::now().timestamp();
        match session::validate(&state.database, session_id, now).await {
            Ok(session) => Ok(Self(session)),
            Err(SessionError::Unknown) => Err(HttpError::unauthorized()),
            Err(SessionError::Expired) => Err(HttpError::new(
                StatusCode::FORBIDDEN,
                "Session expired".to_string(),
            )),
            Err(SessionError::Store(err)) => Err(HttpError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
            )),
        }
    }
}

/// Operator authentication for allowlist management.
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth;

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(ADMIN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(HttpError::unauthorized)?;
        if provided != state.config.admin.token {
            return Err(HttpError::unauthorized());
        }
        Ok(Self)
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    next_claim_in: Option<i64>,
    remaining_cooldown: Option<i64>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: String) -> Self {
        assert!(status != StatusCode::OK, "Error status cannot be 200");
        assert!(!message.is_empty(), "Error message cannot be empty");
        Self {
            status,
            message,
            next_claim_in: None,
            remaining_cooldown: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
    }

    /// Attach the seconds-until-next-claim hint so clients can render a
    /// countdown next to the error code.
    pub fn with_next_claim_in(mut self, seconds: i64) -> Self {
        assert!(seconds >= 0, "Countdown hint cannot be negative");
        self.next_claim_in = Some(seconds);
        self
    }

    pub fn with_remaining_cooldown(mut self, seconds: i64) -> Self {
        assert!(seconds >= 0, "Countdown hint cannot be negative");
        self.remaining_cooldown = Some(seconds);
        self
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        info!("HTTP error: {}", self.message);
        let body = Json(ErrorBody {
            error: self.message,
            next_claim_in: self.next_claim_in,
            remaining_cooldown: self.remaining_cooldown,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(rename = "nextClaimIn", skip_serializing_if = "Option::is_none")]
    next_claim_in: Option<i64>,
    #[serde(rename = "remainingCooldown", skip_serializing_if = "Option::is_none")]
    remaining_cooldown: Option<i64>,
}
