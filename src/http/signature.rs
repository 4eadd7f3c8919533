//! Mint-authorization endpoints.
//!
//! `GET /take` authorizes migrating a legacy badge: the backend checks
//! eligibility live on both chains and, when satisfied, returns an
//! EIP-712 signature the user submits with their own `take` transaction.
//! `POST /message` is the legacy message-minting flow: it encrypts and
//! stores a chat message, then signs the binding of its hash to the
//! caller's badge.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use sea_orm::ActiveValue;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::crypto::{
    encrypt_message, format_address, hash_chat_message, parse_address, signer_address,
};
use crate::entities::message_record;
use crate::gate::{MigrationEligibility, evaluate_migration};
use crate::rpc::abi;
use crate::signature::{Eip712Domain, sign_mint_message, sign_take_authorization};
use crate::state::AppState;
use crate::store;

use super::{CurrentSession, HttpError};

const MAX_MESSAGE_LEN: usize = 2_000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/take", get(take_signature))
        .route("/message", post(message_signature))
}

#[derive(Debug, Serialize)]
struct TakeSignatureResponse {
    from: String,
    signature: String,
    contract: String,
    #[serde(rename = "chainId")]
    chain_id: u64,
}

/// Authorize a migration mint. Both balance checks are live reads,
/// sequential, and never cached; the first failure short-circuits with
/// its own error code so the client can tell "already minted" from
/// "nothing to migrate".
async fn take_signature(
    CurrentSession(session): CurrentSession,
    State(state): State<AppState>,
) -> Result<Json<TakeSignatureResponse>, HttpError> {
    let wallet = &session.wallet_address;
    let primary = &state.config.chains.primary;
    let legacy = &state.config.chains.legacy;

    let primary_balance = state
        .primary_rpc
        .badge_balance(&primary.badge_contract, wallet)
        .await
        .map_err(|err| HttpError::new(StatusCode::BAD_GATEWAY, err.to_string()))?;
    let legacy_balance = state
        .legacy_rpc
        .badge_balance(&legacy.badge_contract, wallet)
        .await
        .map_err(|err| HttpError::new(StatusCode::BAD_GATEWAY, err.to_string()))?;

    match evaluate_migration(primary_balance, legacy_balance) {
        MigrationEligibility::AlreadyMigrated => {
            return Err(HttpError::new(
                StatusCode::BAD_REQUEST,
                "ALREADY_MIGRATED".to_string(),
            ));
        }
        MigrationEligibility::NotEligible => {
            return Err(HttpError::new(
                StatusCode::BAD_REQUEST,
                "NOT_ELIGIBLE".to_string(),
            ));
        }
        MigrationEligibility::Eligible => {}
    }

    let recipient = parse_address(wallet)
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    let domain = Eip712Domain {
        name: state.config.signer.contract_name.clone(),
        version: state.config.signer.contract_version.clone(),
        chain_id: primary.chain_id,
        verifying_contract: parse_address(&primary.badge_contract)
            .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?,
    };

    let signature = sign_take_authorization(&state.signers.take, &domain, &recipient)
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    info!("Take authorization issued for {wallet}");

    Ok(Json(TakeSignatureResponse {
        from: format_address(&signer_address(&state.signers.take)),
        signature: abi::to_hex(&signature),
        contract: primary.badge_contract.clone(),
        chain_id: primary.chain_id,
    }))
}

#[derive(Debug, Deserialize)]
struct MessageSignatureRequest {
    message: String,
    #[serde(rename = "tokenId")]
    token_id: u64,
}

#[derive(Debug, Serialize)]
struct MessageSignatureResponse {
    signature: String,
    #[serde(rename = "messageHash")]
    message_hash: String,
    from: String,
    contract: String,
    #[serde(rename = "chainId")]
    chain_id: u64,
}

/// Encrypt and store a chat message, then authorize minting its hash
/// into the caller's badge.
async fn message_signature(
    CurrentSession(session): CurrentSession,
    State(state): State<AppState>,
    Json(payload): Json<MessageSignatureRequest>,
) -> Result<Json<MessageSignatureResponse>, HttpError> {
    let trimmed = payload.message.trim();
    if trimmed.is_empty() {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "Message must not be empty".to_string(),
        ));
    }
    if trimmed.len() > MAX_MESSAGE_LEN {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            format!("Message exceeds {MAX_MESSAGE_LEN} character limit"),
        ));
    }

    let primary = &state.config.chains.primary;
    let wallet = &session.wallet_address;

    // The message may only be bound to a badge the caller owns.
    let owner = state
        .primary_rpc
        .token_owner(&primary.badge_contract, payload.token_id)
        .await
        .map_err(|err| HttpError::new(StatusCode::BAD_GATEWAY, err.to_string()))?;
    if owner != *wallet {
        return Err(HttpError::new(
            StatusCode::FORBIDDEN,
            "Badge not owned by session wallet".to_string(),
        ));
    }

    let owner_bytes = parse_address(wallet)
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    let message_hash = hash_chat_message(&owner_bytes, trimmed);
    let envelope = encrypt_message(&state.signers.message_encryption, trimmed)
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let hash_hex = abi::to_hex(&message_hash);
    let record = message_record::ActiveModel {
        message_hash: ActiveValue::Set(hash_hex.clone()),
        owner: ActiveValue::Set(wallet.clone()),
        ciphertext: ActiveValue::Set(envelope.ciphertext),
        iv: ActiveValue::Set(envelope.iv),
        minted: ActiveValue::Set(false),
        minted_at: ActiveValue::Set(None),
        created_at: ActiveValue::Set(Utc::now().timestamp()),
    };
    store::put_message(&state.database, record)
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let domain = Eip712Domain {
        name: state.config.signer.contract_name.clone(),
        version: state.config.signer.contract_version.clone(),
        chain_id: primary.chain_id,
        verifying_contract: parse_address(&primary.badge_contract)
            .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?,
    };
    let signature = sign_mint_message(
        &state.signers.message,
        &domain,
        &owner_bytes,
        payload.token_id,
        &message_hash,
    )
    .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    Ok(Json(MessageSignatureResponse {
        signature: abi::to_hex(&signature),
        message_hash: hash_hex,
        from: format_address(&signer_address(&state.signers.message)),
        contract: primary.badge_contract.clone(),
        chain_id: primary.chain_id,
    }))
}
