//! Public ERC-721 metadata for minted badges.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use serde_json::{Value, json};

use crate::crypto::ZERO_ADDRESS;
use crate::state::AppState;

use super::HttpError;

pub fn router() -> Router<AppState> {
    Router::new().route("/{token_id}", get(token_metadata))
}

async fn token_metadata(
    Path(token_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<Value>, HttpError> {
    if let Some(cached) = state.cache.metadata.get(&token_id).await {
        return Ok(Json((*cached).clone()));
    }

    let primary = &state.config.chains.primary;
    let owner = state
        .primary_rpc
        .token_owner(&primary.badge_contract, token_id)
        .await
        .map_err(|err| HttpError::new(StatusCode::BAD_GATEWAY, err.to_string()))?;
    if owner == ZERO_ADDRESS {
        return Err(HttpError::new(
            StatusCode::NOT_FOUND,
            format!("Badge {token_id} not minted"),
        ));
    }

    let metadata = &state.config.metadata;
    let document = json!({
        "name": format!("{} #{token_id}", metadata.name_prefix),
        "description": metadata.description,
        "image": format!(
            "{}/{token_id}.png",
            metadata.image_base_url.trim_end_matches('/')
        ),
        "attributes": [
            {
                "trait_type": "Chain ID",
                "value": primary.chain_id,
            }
        ],
    });

    state
        .cache
        .metadata
        .insert(token_id, Arc::new(document.clone()))
        .await;

    Ok(Json(document))
}
