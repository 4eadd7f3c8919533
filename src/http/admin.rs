//! Operator allowlist management. The faucet flag is entirely
//! operator-controlled and independent of cooldown state.

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::crypto::normalize_address;
use crate::state::AppState;
use crate::store;

use super::{AdminAuth, HttpError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/wallets", get(list_wallets).post(add_wallets))
        .route("/wallets/{address}", delete(remove_wallet))
}

#[derive(Debug, Serialize)]
struct WalletView {
    address: String,
    #[serde(rename = "faucetEnabled")]
    faucet_enabled: bool,
    #[serde(rename = "messageCount")]
    message_count: i32,
    #[serde(rename = "lastClaimed")]
    last_claimed: Option<i64>,
}

#[derive(Debug, Serialize)]
struct WalletListResponse {
    wallets: Vec<WalletView>,
}

async fn list_wallets(
    _auth: AdminAuth,
    State(state): State<AppState>,
) -> Result<Json<WalletListResponse>, HttpError> {
    let records = store::list_wallets(&state.database)
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let wallets = records
        .into_iter()
        .map(|record| WalletView {
            address: record.address,
            faucet_enabled: record.faucet_enabled,
            message_count: record.message_count,
            last_claimed: record.last_claimed,
        })
        .collect();

    Ok(Json(WalletListResponse { wallets }))
}

#[derive(Debug, Deserialize)]
struct AddWalletsRequest {
    addresses: Vec<String>,
    #[serde(rename = "faucetEnabled", default = "default_faucet_enabled")]
    faucet_enabled: bool,
}

fn default_faucet_enabled() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct AddWalletsResponse {
    added: usize,
}

async fn add_wallets(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Json(payload): Json<AddWalletsRequest>,
) -> Result<Json<AddWalletsResponse>, HttpError> {
    if payload.addresses.is_empty() {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "No addresses provided".to_string(),
        ));
    }
    if payload.addresses.len() > 1_000 {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "At most 1000 addresses per batch".to_string(),
        ));
    }

    let mut normalized = Vec::with_capacity(payload.addresses.len());
    for address in &payload.addresses {
        normalized.push(
            normalize_address(address)
                .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?,
        );
    }

    let now = Utc::now().timestamp();
    store::add_wallets(&state.database, &normalized, payload.faucet_enabled, now)
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    info!(
        "Allowlist updated: {} wallets, faucet_enabled={}",
        normalized.len(),
        payload.faucet_enabled
    );

    Ok(Json(AddWalletsResponse {
        added: normalized.len(),
    }))
}

#[derive(Debug, Serialize)]
struct RemoveWalletResponse {
    removed: bool,
}

async fn remove_wallet(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<RemoveWalletResponse>, HttpError> {
    let normalized = normalize_address(&address)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;

    let removed = store::remove_wallet(&state.database, &normalized)
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    if !removed {
        return Err(HttpError::new(
            StatusCode::NOT_FOUND,
            format!("Wallet {normalized} not found"),
        ));
    }

    Ok(Json(RemoveWalletResponse { removed }))
}
