//! Gas faucet: cooldown inspection, claim intake, and the queue-driven
//! mint worker.
//!
//! A claim is accepted optimistically: the cooldown stamp is written
//! before the mint runs, then the job is handed to the queue. If the
//! downstream mint fails, the stamp is rolled back a full window so the
//! wallet can retry immediately instead of waiting out a claim that
//! never happened.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::crypto::{normalize_address, parse_address, signer_address};
use crate::gate::{FaucetDecision, evaluate_faucet, remaining_cooldown, rolled_back_claim};
use crate::rpc::abi;
use crate::rpc::tx::LegacyTransaction;
use crate::state::AppState;
use crate::store::{self, WalletUpdate};

use super::{CurrentSession, HttpError, WEBHOOK_SIGNATURE_HEADER};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cooldown", get(cooldown))
        .route("/claim", post(claim))
        .route("/claim/process", post(process_claim))
}

#[derive(Debug, Serialize)]
struct CooldownResponse {
    #[serde(rename = "nextClaimIn")]
    next_claim_in: i64,
}

/// Read-only cooldown probe; repeated calls never mutate state.
async fn cooldown(
    CurrentSession(session): CurrentSession,
    State(state): State<AppState>,
) -> Result<Json<CooldownResponse>, HttpError> {
    let record = store::load_wallet(&state.database, &session.wallet_address)
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let now = Utc::now().timestamp();
    let next_claim_in = record
        .map(|record| {
            remaining_cooldown(
                record.last_claimed,
                state.config.faucet.cooldown_seconds,
                now,
            )
        })
        .unwrap_or(0);

    Ok(Json(CooldownResponse { next_claim_in }))
}

/// Accept a claim, stamp the cooldown, and enqueue the mint.
async fn claim(
    CurrentSession(session): CurrentSession,
    State(state): State<AppState>,
) -> Result<Json<CooldownResponse>, HttpError> {
    let wallet = &session.wallet_address;
    let cooldown_seconds = state.config.faucet.cooldown_seconds;

    let record = store::load_wallet(&state.database, wallet)
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
        .ok_or_else(|| {
            HttpError::new(StatusCode::BAD_REQUEST, "NOT_ALLOWLISTED".to_string())
        })?;

    // Proof of prior participation: the wallet must still hold its badge
    // on the legacy chain.
    let legacy_balance = state
        .legacy_rpc
        .badge_balance(&state.config.chains.legacy.badge_contract, wallet)
        .await
        .map_err(|err| HttpError::new(StatusCode::BAD_GATEWAY, err.to_string()))?;

    let now = Utc::now().timestamp();
    match evaluate_faucet(
        record.faucet_enabled,
        legacy_balance,
        record.last_claimed,
        cooldown_seconds,
        now,
    ) {
        FaucetDecision::NotAllowlisted => {
            return Err(HttpError::new(
                StatusCode::BAD_REQUEST,
                "NOT_ALLOWLISTED".to_string(),
            ));
        }
        FaucetDecision::CooldownActive { next_claim_in } => {
            return Err(
                HttpError::new(StatusCode::BAD_REQUEST, "Cannot claim".to_string())
                    .with_next_claim_in(next_claim_in),
            );
        }
        FaucetDecision::Allow => {}
    }

    // Optimistic stamp before the asynchronous mint.
    store::update_wallet(&state.database, wallet, |current| WalletUpdate {
        last_claimed: Some(now),
        ..WalletUpdate::from_record(current)
    })
    .await
    .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let payload = json!({ "walletAddress": wallet });
    if let Err(err) = state
        .queue
        .enqueue(&payload, &state.config.queue.webhook_url)
        .await
    {
        error!("Failed to enqueue faucet claim for {wallet}: {err}");
        rollback_cooldown(&state, wallet).await;
        return Err(HttpError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to schedule claim".to_string(),
        ));
    }

    info!("Faucet claim accepted for {wallet}");

    Ok(Json(CooldownResponse {
        next_claim_in: cooldown_seconds,
    }))
}

#[derive(Debug, Deserialize)]
struct ProcessClaimPayload {
    #[serde(rename = "walletAddress")]
    wallet_address: String,
}

#[derive(Debug, Serialize)]
struct ProcessClaimResponse {
    success: bool,
}

/// Queue webhook: submit the `mintNativeCoin` transaction and wait for
/// its receipt. Authenticated by the queue signature, not a session.
async fn process_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<ProcessClaimResponse>, HttpError> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(HttpError::unauthorized)?;
    if !state
        .queue
        .verify_webhook_signature(signature, body.as_bytes())
    {
        return Err(HttpError::unauthorized());
    }

    let payload: ProcessClaimPayload = serde_json::from_str(&body)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
    let wallet = normalize_address(&payload.wallet_address)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;

    match mint_native_coin(&state, &wallet).await {
        Ok(tx_hash) => {
            info!("Faucet mint for {wallet} confirmed in {tx_hash}");
            Ok(Json(ProcessClaimResponse { success: true }))
        }
        Err(err) => {
            error!("Faucet mint for {wallet} failed: {err}");
            rollback_cooldown(&state, &wallet).await;
            Err(HttpError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Faucet mint failed".to_string(),
            ))
        }
    }
}

async fn mint_native_coin(state: &AppState, wallet: &str) -> anyhow::Result<String> {
    let faucet = &state.config.faucet;
    let primary = &state.config.chains.primary;
    let faucet_account = signer_address(&state.signers.faucet);

    let nonce = state.primary_rpc.transaction_count(&faucet_account).await?;
    let gas_price = state.primary_rpc.gas_price().await?;

    let recipient = parse_address(wallet)?;
    let data = abi::call_data(
        "mintNativeCoin(address,uint256)",
        &[
            abi::word_from_address(&recipient),
            abi::word_from_u256(faucet.claim_amount()),
        ],
    );

    let transaction = LegacyTransaction {
        nonce,
        gas_price,
        gas_limit: faucet.gas_limit,
        to: parse_address(&faucet.faucet_contract)?,
        value: 0,
        data,
    };
    let raw = transaction.sign(primary.chain_id, &state.signers.faucet)?;

    let tx_hash = state.primary_rpc.send_raw_transaction(&raw).await?;
    let receipt = state.primary_rpc.wait_for_receipt(&tx_hash).await?;
    if !receipt.succeeded() {
        anyhow::bail!("mintNativeCoin reverted in {tx_hash}");
    }
    Ok(tx_hash)
}

/// Compensating write after a failed mint: stamp the claim a full window
/// in the past so the wallet is immediately eligible again.
async fn rollback_cooldown(state: &AppState, wallet: &str) {
    let now = Utc::now().timestamp();
    let cooldown_seconds = state.config.faucet.cooldown_seconds;
    let result = store::update_wallet(&state.database, wallet, |current| WalletUpdate {
        last_claimed: Some(rolled_back_claim(now, cooldown_seconds)),
        ..WalletUpdate::from_record(current)
    })
    .await;
    if let Err(err) = result {
        error!("Cooldown rollback for {wallet} failed: {err}");
    }
}
