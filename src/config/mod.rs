use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub chains: ChainsConfig,
    pub signer: SignerConfig,
    pub faucet: FaucetConfig,
    pub chat: ChatConfig,
    pub queue: QueueConfig,
    pub metadata: MetadataConfig,
    pub admin: AdminConfig,
    pub cache: CacheConfig,
}

impl ApiConfig {
    pub fn load() -> Result<Self> {
        let configured_path =
            std::env::var("SIGIL_API_CONFIG").unwrap_or_else(|_| "config/api.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("SIGIL_API_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/api.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize API configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        assert!(
            !self.database.url.is_empty(),
            "Database URL must be specified"
        );
        assert!(
            self.server.port > 0,
            "Server port must be greater than zero"
        );
        assert!(
            !self.auth.domain.is_empty(),
            "SIWE domain must be specified"
        );
        assert!(
            self.auth.session_lifetime_seconds >= 60,
            "Session lifetime below one minute is unusable"
        );
        assert!(
            self.auth.session_lifetime_seconds <= 86_400,
            "Session lifetime cannot exceed one day"
        );
        assert!(
            self.auth.nonce_ttl_seconds >= 30,
            "Nonce TTL must allow time to sign"
        );
        assert!(
            self.auth.nonce_ttl_seconds <= 3_600,
            "Nonce TTL exceeds defensive bound"
        );
        self.chains.primary.ensure_bounds()?;
        self.chains.legacy.ensure_bounds()?;
        assert!(
            self.chains.primary.chain_id != self.chains.legacy.chain_id,
            "Primary and legacy networks must differ"
        );
        self.faucet.ensure_bounds()?;
        self.chat.ensure_bounds()?;
        self.metadata.ensure_bounds()?;
        self.cache.ensure_bounds()?;
        assert!(!self.admin.token.is_empty(), "Admin token must be set");
        assert!(
            self.admin.token.len() >= 16,
            "Admin token shorter than 16 characters"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        assert!(self.port < 65535, "HTTP port must be below 65535");
        SocketAddr::new(host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Domain presented in SIWE challenge messages.
    pub domain: String,
    #[serde(default = "AuthConfig::default_session_lifetime")]
    pub session_lifetime_seconds: i64,
    #[serde(default = "AuthConfig::default_nonce_ttl")]
    pub nonce_ttl_seconds: i64,
}

impl AuthConfig {
    const fn default_session_lifetime() -> i64 {
        3_600
    }

    const fn default_nonce_ttl() -> i64 {
        300
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainsConfig {
    /// Network the replacement badge is minted on.
    pub primary: NetworkConfig,
    /// Network holding the original badge (proof of prior participation).
    pub legacy: NetworkConfig,
}

/// One value object per network; every handler takes these instead of
/// hard-coding a chain.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    pub badge_contract: String,
    pub request_timeout_ms: Option<u64>,
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        let millis = self.request_timeout_ms.unwrap_or(3_000);
        assert!(millis >= 100, "RPC timeout must be at least 100ms");
        assert!(millis <= 60_000, "RPC timeout cannot exceed 60 seconds");
        Duration::from_millis(millis)
    }

    fn ensure_bounds(&self) -> Result<()> {
        assert!(self.chain_id > 0, "Chain id must be positive");
        assert!(!self.rpc_url.is_empty(), "RPC URL must be specified");
        ensure_address(&self.badge_contract, "badge contract")?;
        let _ = self.request_timeout();
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignerConfig {
    /// EIP-712 domain name/version of the badge contract.
    pub contract_name: String,
    pub contract_version: String,
    /// Backend key authorizing `take` mints (hex, no custody of funds).
    pub take_key: String,
    /// Backend key authorizing message mints.
    pub message_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaucetConfig {
    #[serde(default = "FaucetConfig::default_cooldown")]
    pub cooldown_seconds: i64,
    /// Amount of native coin minted per claim, in wei (decimal string).
    pub claim_amount_wei: String,
    pub faucet_contract: String,
    /// Key of the account submitting `mintNativeCoin` transactions.
    pub signer_key: String,
    #[serde(default = "FaucetConfig::default_gas_limit")]
    pub gas_limit: u64,
}

impl FaucetConfig {
    pub fn claim_amount(&self) -> u128 {
        self.claim_amount_wei
            .parse::<u128>()
            .expect("Claim amount validated at startup")
    }

    fn ensure_bounds(&self) -> Result<()> {
        assert!(self.cooldown_seconds > 0, "Faucet cooldown must be positive");
        assert!(
            self.cooldown_seconds <= 604_800,
            "Faucet cooldown exceeds one week"
        );
        let amount: u128 = self
            .claim_amount_wei
            .parse()
            .context("Faucet claim amount must be a decimal wei string")?;
        assert!(amount > 0, "Faucet claim amount must be positive");
        ensure_address(&self.faucet_contract, "faucet contract")?;
        assert!(self.gas_limit >= 21_000, "Gas limit below intrinsic cost");
        assert!(self.gas_limit <= 1_000_000, "Gas limit exceeds sane bound");
        Ok(())
    }

    const fn default_cooldown() -> i64 {
        86_400
    }

    const fn default_gas_limit() -> u64 {
        120_000
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "ChatConfig::default_message_limit")]
    pub message_limit: i32,
    #[serde(default = "ChatConfig::default_cooldown")]
    pub cooldown_seconds: i64,
    pub completion_url: String,
    pub api_key: String,
    pub model: String,
    #[serde(default = "ChatConfig::default_max_tokens")]
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
    /// 32-byte AES-256-GCM key, base64.
    pub encryption_key: String,
}

impl ChatConfig {
    fn ensure_bounds(&self) -> Result<()> {
        assert!(self.message_limit > 0, "Chat message limit must be positive");
        assert!(
            self.message_limit <= 1_000,
            "Chat message limit exceeds defensive bound"
        );
        assert!(self.cooldown_seconds > 0, "Chat cooldown must be positive");
        assert!(
            self.cooldown_seconds <= 604_800,
            "Chat cooldown exceeds one week"
        );
        assert!(
            !self.completion_url.is_empty(),
            "Completion URL must be specified"
        );
        assert!(self.max_tokens >= 16, "Completion token budget too small");
        assert!(
            self.max_tokens <= 8_192,
            "Completion token budget exceeds bound"
        );
        Ok(())
    }

    const fn default_message_limit() -> i32 {
        10
    }

    const fn default_cooldown() -> i64 {
        86_400
    }

    const fn default_max_tokens() -> u32 {
        512
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub url: String,
    pub token: String,
    pub queue_name: String,
    /// Public URL the queue calls back into (`/api/v1/faucet/claim/process`).
    pub webhook_url: String,
    pub current_signing_key: String,
    pub next_signing_key: String,
}

/// Static pieces of the ERC-721 metadata served for minted badges.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    pub name_prefix: String,
    pub description: String,
    pub image_base_url: String,
}

impl MetadataConfig {
    fn ensure_bounds(&self) -> Result<()> {
        assert!(
            !self.name_prefix.is_empty(),
            "Metadata name prefix must be specified"
        );
        assert!(
            !self.image_base_url.is_empty(),
            "Metadata image base URL must be specified"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub metadata_max_capacity: u64,
    pub metadata_ttl_seconds: u64,
    pub balance_max_capacity: u64,
    pub balance_ttl_seconds: u64,
}

impl CacheConfig {
    fn ensure_bounds(&self) -> Result<()> {
        assert!(
            self.metadata_max_capacity >= 100,
            "Metadata cache capacity must be at least 100"
        );
        assert!(
            self.metadata_ttl_seconds <= 86_400,
            "Metadata cache TTL cannot exceed one day"
        );
        assert!(
            self.balance_max_capacity >= 100,
            "Balance cache capacity must be at least 100"
        );
        assert!(
            self.balance_ttl_seconds <= 60,
            "Balance cache TTL must stay short; stale balances gate chat"
        );
        Ok(())
    }
}

fn ensure_address(value: &str, label: &str) -> Result<()> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    assert!(
        trimmed.len() == 40 && trimmed.chars().all(|c| c.is_ascii_hexdigit()),
        "{label} must be a 20-byte hex address"
    );
    Ok(())
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}
