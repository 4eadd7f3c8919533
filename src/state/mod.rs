use std::sync::Arc;
use std::time::{Duration, Instant};

use k256::ecdsa::SigningKey;
use moka::future::Cache;
use sea_orm::DatabaseConnection;
use serde_json::Value;

use crate::chat::CompletionClient;
use crate::config::{ApiConfig, CacheConfig};
use crate::crypto;
use crate::queue::QueueClient;
use crate::rpc::EvmRpcClient;

#[derive(Clone)]
pub struct AppState {
    pub database: DatabaseConnection,
    pub cache: Arc<ApiCache>,
    pub primary_rpc: EvmRpcClient,
    pub legacy_rpc: EvmRpcClient,
    pub queue: QueueClient,
    pub completions: CompletionClient,
    pub signers: Arc<Signers>,
    pub config: Arc<ApiConfig>,
    pub start_time: Instant,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        database: DatabaseConnection,
        cache: Arc<ApiCache>,
        primary_rpc: EvmRpcClient,
        legacy_rpc: EvmRpcClient,
        queue: QueueClient,
        completions: CompletionClient,
        signers: Arc<Signers>,
        config: Arc<ApiConfig>,
    ) -> Self {
        assert!(
            cache.metadata_capacity >= 100,
            "Metadata cache capacity must be configured"
        );
        assert!(
            primary_rpc.chain_id() != legacy_rpc.chain_id(),
            "Primary and legacy RPC clients must target different networks"
        );
        Self {
            database,
            cache,
            primary_rpc,
            legacy_rpc,
            queue,
            completions,
            signers,
            config,
            start_time: Instant::now(),
        }
    }
}

/// Backend signing keys, parsed once at startup. The take and message
/// keys only ever produce EIP-712 authorizations; the faucet key signs
/// actual transactions.
pub struct Signers {
    pub take: SigningKey,
    pub message: SigningKey,
    pub faucet: SigningKey,
    /// AES-256-GCM key for stored chat messages.
    pub message_encryption: [u8; 32],
}

impl Signers {
    pub fn from_config(config: &ApiConfig) -> anyhow::Result<Self> {
        Ok(Self {
            take: crypto::parse_private_key(&config.signer.take_key)?,
            message: crypto::parse_private_key(&config.signer.message_key)?,
            faucet: crypto::parse_private_key(&config.faucet.signer_key)?,
            message_encryption: crypto::decode_encryption_key(&config.chat.encryption_key)?,
        })
    }
}

pub struct ApiCache {
    /// ERC-721 metadata documents keyed by token id.
    pub metadata: Cache<u64, Arc<Value>>,
    /// Short-TTL badge balances for the chat gate only; eligibility
    /// checks for minting always read the chain directly.
    pub chat_balances: Cache<String, u64>,
    pub metadata_capacity: u64,
}

impl ApiCache {
    pub fn new(config: &CacheConfig) -> Self {
        assert!(
            config.metadata_max_capacity >= 100,
            "Metadata cache capacity threshold"
        );
        assert!(
            config.balance_ttl_seconds <= 60,
            "Balance cache TTL must stay short"
        );

        let metadata = Cache::builder()
            .max_capacity(config.metadata_max_capacity)
            .time_to_live(Duration::from_secs(config.metadata_ttl_seconds))
            .time_to_idle(Duration::from_secs(config.metadata_ttl_seconds / 2 + 1))
            .build();

        let chat_balances = Cache::builder()
            .max_capacity(config.balance_max_capacity)
            .time_to_live(Duration::from_secs(config.balance_ttl_seconds))
            .build();

        Self {
            metadata,
            chat_balances,
            metadata_capacity: config.metadata_max_capacity,
        }
    }
}
