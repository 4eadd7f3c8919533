//! Authentication handshake: challenge message issuance and session
//! creation from a signed SIWE message.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::crypto::normalize_address;
use crate::session;
use crate::signature::{
    create_auth_message, generate_nonce, parse_auth_message, verify_auth_signature,
};
use crate::state::AppState;
use crate::store;

use super::HttpError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/message/{wallet}", get(auth_message))
        .route("/session/{wallet}", post(create_session))
}

#[derive(Debug, Deserialize)]
struct AuthMessageParams {
    uri: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthMessageResponse {
    #[serde(rename = "authMessage")]
    auth_message: String,
}

/// Issue a SIWE challenge bound to a fresh single-use nonce.
async fn auth_message(
    Path(wallet): Path<String>,
    Query(params): Query<AuthMessageParams>,
    State(state): State<AppState>,
) -> Result<Json<AuthMessageResponse>, HttpError> {
    let normalized = normalize_address(&wallet)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;

    let domain = &state.config.auth.domain;
    let uri = params.uri.unwrap_or_else(|| format!("https://{domain}"));
    assert!(uri.len() <= 2_048, "URI exceeds defensive length bound");

    let nonce = generate_nonce();
    let now = Utc::now().timestamp();
    store::create_nonce(
        &state.database,
        &nonce,
        &normalized,
        state.config.auth.nonce_ttl_seconds,
        now,
    )
    .await
    .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let auth_message =
        create_auth_message(&wallet, state.primary_rpc.chain_id(), domain, &uri, &nonce);

    Ok(Json(AuthMessageResponse { auth_message }))
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    message: String,
    signature: String,
}

#[derive(Debug, Serialize)]
struct CreateSessionResponse {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// Verify the signed challenge and issue a session. Issuing never
/// invalidates other sessions the wallet already holds.
async fn create_session(
    Path(wallet): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, HttpError> {
    let normalized = normalize_address(&wallet)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;

    let fields = parse_auth_message(&payload.message).map_err(|err| {
        HttpError::new(
            StatusCode::BAD_REQUEST,
            format!("Invalid authentication message: {err}"),
        )
    })?;

    // The signed message must target this wallet, this service and the
    // primary chain; anything else is a replay or a cross-site splice.
    let message_wallet = normalize_address(&fields.address)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
    if message_wallet != normalized
        || fields.domain != state.config.auth.domain
        || fields.chain_id != state.primary_rpc.chain_id()
    {
        return Err(HttpError::unauthorized());
    }

    let now = Utc::now().timestamp();
    let nonce_ok = store::consume_nonce(&state.database, &fields.nonce, &normalized, now)
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    if !nonce_ok {
        return Err(HttpError::unauthorized());
    }

    let verified = verify_auth_signature(
        &state.primary_rpc,
        &normalized,
        &payload.message,
        &payload.signature,
    )
    .await;
    if !verified {
        return Err(HttpError::unauthorized());
    }

    // First successful authentication creates the wallet record lazily.
    store::ensure_wallet(&state.database, &normalized, now)
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let session = session::issue(
        &state.database,
        &normalized,
        state.config.auth.session_lifetime_seconds,
    )
    .await
    .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    info!("Session issued for {normalized}");

    Ok(Json(CreateSessionResponse {
        session_id: session.session_id,
    }))
}
