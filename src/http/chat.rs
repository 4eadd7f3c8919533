//! Rate-limited chat endpoint and its read-only cooldown probe.
//!
//! Holding a badge on the primary chain is a hard requirement: a zero
//! balance rejects regardless of cooldown state. Completion-provider
//! failures soft-fail to a 200 with a placeholder reply so a transient
//! outage does not surface as a broken chat; the message counter is only
//! charged for real replies.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::chat::{ChatTurn, FALLBACK_REPLY};
use crate::gate::{ChatDecision, evaluate_chat, remaining_cooldown};
use crate::state::AppState;
use crate::store::{self, WalletUpdate};

use super::{CurrentSession, HttpError};

const MAX_PROMPT_LEN: usize = 4_000;
const MAX_HISTORY_TURNS: usize = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(send_chat))
        .route("/cooldown", get(chat_cooldown))
}

#[derive(Debug, Deserialize)]
struct ChatRequestBody {
    prompt: String,
    #[serde(rename = "conversationHistory", default)]
    conversation_history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    reply: String,
    #[serde(rename = "remainingCooldown")]
    remaining_cooldown: i64,
    #[serde(rename = "remainingInputs")]
    remaining_inputs: i64,
}

async fn send_chat(
    CurrentSession(session): CurrentSession,
    State(state): State<AppState>,
    Json(payload): Json<ChatRequestBody>,
) -> Result<Json<ChatResponse>, HttpError> {
    let prompt = payload.prompt.trim();
    if prompt.is_empty() {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "Prompt must not be empty".to_string(),
        ));
    }
    if prompt.len() > MAX_PROMPT_LEN {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            format!("Prompt exceeds {MAX_PROMPT_LEN} character limit"),
        ));
    }
    if payload.conversation_history.len() > MAX_HISTORY_TURNS {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            format!("Conversation history exceeds {MAX_HISTORY_TURNS} turns"),
        ));
    }

    let wallet = &session.wallet_address;
    let chat = &state.config.chat;

    let balance = badge_balance_cached(&state, wallet)
        .await
        .map_err(|err| HttpError::new(StatusCode::BAD_GATEWAY, err.to_string()))?;
    if balance == 0 {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "Cannot message".to_string(),
        ));
    }

    let now = Utc::now().timestamp();
    let record = store::ensure_wallet(&state.database, wallet, now)
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let reset = match evaluate_chat(
        record.message_count,
        chat.message_limit,
        record.last_message_reset,
        chat.cooldown_seconds,
        now,
    ) {
        ChatDecision::Allow { reset } => reset,
        ChatDecision::Blocked { remaining } => {
            return Err(
                HttpError::new(StatusCode::BAD_REQUEST, "Cannot message".to_string())
                    .with_remaining_cooldown(remaining),
            );
        }
    };

    let completion = state
        .completions
        .complete(
            chat.system_prompt.as_deref(),
            &payload.conversation_history,
            prompt,
        )
        .await;

    let (reply, charged) = match completion {
        Ok(reply) => (reply, true),
        Err(err) => {
            // Soft-fail: keep the chat UI alive through provider
            // outages, and do not charge the counter for it.
            warn!("Completion provider failure for {wallet}: {err}");
            (FALLBACK_REPLY.to_string(), false)
        }
    };

    let updated = if charged {
        store::update_wallet(&state.database, wallet, |current| {
            if reset {
                WalletUpdate {
                    message_count: 1,
                    last_message_reset: now,
                    last_claimed: current.last_claimed,
                }
            } else {
                WalletUpdate {
                    message_count: current.message_count + 1,
                    ..WalletUpdate::from_record(current)
                }
            }
        })
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
    } else {
        record
    };

    let remaining = remaining_cooldown(
        Some(updated.last_message_reset),
        chat.cooldown_seconds,
        now,
    );
    let remaining_inputs = i64::from(chat.message_limit - updated.message_count).max(0);

    Ok(Json(ChatResponse {
        reply,
        remaining_cooldown: remaining,
        remaining_inputs,
    }))
}

#[derive(Debug, Serialize)]
struct ChatCooldownResponse {
    #[serde(rename = "remainingCooldown")]
    remaining_cooldown: i64,
    #[serde(rename = "remainingMessages")]
    remaining_messages: i64,
}

/// Read-only: reports what a send would be allowed to do, without
/// touching the stored counters.
async fn chat_cooldown(
    CurrentSession(session): CurrentSession,
    State(state): State<AppState>,
) -> Result<Json<ChatCooldownResponse>, HttpError> {
    let chat = &state.config.chat;
    let record = store::load_wallet(&state.database, &session.wallet_address)
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let Some(record) = record else {
        return Ok(Json(ChatCooldownResponse {
            remaining_cooldown: 0,
            remaining_messages: i64::from(chat.message_limit),
        }));
    };

    let now = Utc::now().timestamp();
    let remaining = remaining_cooldown(
        Some(record.last_message_reset),
        chat.cooldown_seconds,
        now,
    );
    // An elapsed window means a send would reset the counter first.
    let remaining_messages = if record.message_count >= chat.message_limit && remaining <= 0 {
        i64::from(chat.message_limit)
    } else {
        i64::from(chat.message_limit - record.message_count).max(0)
    };

    Ok(Json(ChatCooldownResponse {
        remaining_cooldown: remaining,
        remaining_messages,
    }))
}

async fn badge_balance_cached(state: &AppState, wallet: &str) -> anyhow::Result<u64> {
    if let Some(balance) = state.cache.chat_balances.get(wallet).await {
        return Ok(balance);
    }
    let balance = state
        .primary_rpc
        .badge_balance(&state.config.chains.primary.badge_contract, wallet)
        .await?;
    state
        .cache
        .chat_balances
        .insert(wallet.to_string(), balance)
        .await;
    Ok(balance)
}
