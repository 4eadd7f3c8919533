//! Decrypted-message reads for a badge the session wallet owns.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::crypto::decrypt_message;
use crate::rpc::abi;
use crate::state::AppState;
use crate::store;

use super::{CurrentSession, HttpError};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_messages))
}

#[derive(Debug, Deserialize)]
struct MessagesParams {
    #[serde(rename = "tokenId")]
    token_id: u64,
}

#[derive(Debug, Serialize)]
struct MessageView {
    message: String,
    #[serde(rename = "mintedAt")]
    minted_at: Option<i64>,
}

#[derive(Debug, Serialize)]
struct MessagesResponse {
    messages: Vec<MessageView>,
}

/// Resolve the badge's on-chain message hashes, then decrypt each stored
/// record. A record that fails to decrypt is returned as its raw
/// ciphertext rather than dropped, so the client can at least show that
/// something exists.
async fn list_messages(
    CurrentSession(session): CurrentSession,
    Query(params): Query<MessagesParams>,
    State(state): State<AppState>,
) -> Result<Json<MessagesResponse>, HttpError> {
    let primary = &state.config.chains.primary;
    let wallet = &session.wallet_address;

    let owner = state
        .primary_rpc
        .token_owner(&primary.badge_contract, params.token_id)
        .await
        .map_err(|err| HttpError::new(StatusCode::BAD_GATEWAY, err.to_string()))?;
    if owner != *wallet {
        return Err(HttpError::new(
            StatusCode::FORBIDDEN,
            "Badge not owned by session wallet".to_string(),
        ));
    }

    let hashes = state
        .primary_rpc
        .token_messages(&primary.badge_contract, params.token_id)
        .await
        .map_err(|err| HttpError::new(StatusCode::BAD_GATEWAY, err.to_string()))?;

    let mut messages = Vec::with_capacity(hashes.len());
    for hash in &hashes {
        let key = abi::to_hex(hash);
        let record = store::get_message(&state.database, &key)
            .await
            .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
        let Some(record) = record else {
            continue;
        };

        let message = match decrypt_message(
            &state.signers.message_encryption,
            &record.iv,
            &record.ciphertext,
        ) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                error!("Failed to decrypt message {key}: {err}");
                record.ciphertext.clone()
            }
        };
        messages.push(MessageView {
            message,
            minted_at: record.minted_at,
        });
    }

    Ok(Json(MessagesResponse { messages }))
}
