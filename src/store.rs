//! Persistence helpers for wallet records, auth nonces, and encrypted
//! messages.
//!
//! Wallet counters are the one piece of state mutated from concurrent
//! requests. Every read-modify-write goes through [`update_wallet`],
//! which re-reads the row and retries on a version mismatch instead of
//! blindly overwriting what another handler just committed.

use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
};
use thiserror::Error;

use crate::entities::prelude::{AuthNonce, MessageRecord, WalletRecord};
use crate::entities::{auth_nonce, message_record, wallet_record};

const MAX_CAS_ATTEMPTS: u32 = 4;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("wallet store failure: {0}")]
    Db(#[from] DbErr),
    #[error("wallet record for {0} not found")]
    MissingWallet(String),
    #[error("gave up after {MAX_CAS_ATTEMPTS} contended update attempts")]
    Contention,
}

/// Fields a wallet mutation may change; everything else is immutable
/// from request handlers.
#[derive(Debug, Clone, Copy)]
pub struct WalletUpdate {
    pub message_count: i32,
    pub last_message_reset: i64,
    pub last_claimed: Option<i64>,
}

impl WalletUpdate {
    pub fn from_record(record: &wallet_record::Model) -> Self {
        Self {
            message_count: record.message_count,
            last_message_reset: record.last_message_reset,
            last_claimed: record.last_claimed,
        }
    }
}

pub async fn load_wallet(
    database: &DatabaseConnection,
    address: &str,
) -> Result<Option<wallet_record::Model>, DbErr> {
    assert!(
        address == address.to_ascii_lowercase(),
        "Wallet keys are lower-cased"
    );
    WalletRecord::find_by_id(address.to_string()).one(database).await
}

/// Fetch a wallet record, creating it lazily with defaults on first
/// authentication. The default record is not allowlisted.
pub async fn ensure_wallet(
    database: &DatabaseConnection,
    address: &str,
    now: i64,
) -> Result<wallet_record::Model, StoreError> {
    if let Some(existing) = load_wallet(database, address).await? {
        return Ok(existing);
    }

    let record = wallet_record::ActiveModel {
        address: ActiveValue::Set(address.to_string()),
        last_message_reset: ActiveValue::Set(now),
        message_count: ActiveValue::Set(0),
        faucet_enabled: ActiveValue::Set(false),
        last_claimed: ActiveValue::Set(None),
        version: ActiveValue::Set(0),
    };
    let insert = WalletRecord::insert(record)
        .on_conflict(
            OnConflict::column(wallet_record::Column::Address)
                .do_nothing()
                .to_owned(),
        )
        .exec(database)
        .await;
    match insert {
        Ok(_) | Err(DbErr::RecordNotInserted) => {}
        Err(err) => return Err(err.into()),
    }

    load_wallet(database, address)
        .await?
        .ok_or_else(|| StoreError::MissingWallet(address.to_string()))
}

/// Compare-and-swap update: `mutate` maps the current row to its new
/// counter values; the write only lands if the version is unchanged.
pub async fn update_wallet<F>(
    database: &DatabaseConnection,
    address: &str,
    mutate: F,
) -> Result<wallet_record::Model, StoreError>
where
    F: Fn(&wallet_record::Model) -> WalletUpdate,
{
    for _ in 0..MAX_CAS_ATTEMPTS {
        let current = load_wallet(database, address)
            .await?
            .ok_or_else(|| StoreError::MissingWallet(address.to_string()))?;
        let update = mutate(&current);

        let result = WalletRecord::update_many()
            .col_expr(
                wallet_record::Column::MessageCount,
                Expr::value(update.message_count),
            )
            .col_expr(
                wallet_record::Column::LastMessageReset,
                Expr::value(update.last_message_reset),
            )
            .col_expr(
                wallet_record::Column::LastClaimed,
                Expr::value(update.last_claimed),
            )
            .col_expr(
                wallet_record::Column::Version,
                Expr::value(current.version + 1),
            )
            .filter(wallet_record::Column::Address.eq(address))
            .filter(wallet_record::Column::Version.eq(current.version))
            .exec(database)
            .await?;

        if result.rows_affected == 1 {
            return Ok(wallet_record::Model {
                message_count: update.message_count,
                last_message_reset: update.last_message_reset,
                last_claimed: update.last_claimed,
                version: current.version + 1,
                ..current
            });
        }
        // Lost the race; re-read and try again.
    }
    Err(StoreError::Contention)
}

/// Operator allowlist management: upsert wallets with the faucet flag.
pub async fn add_wallets(
    database: &DatabaseConnection,
    addresses: &[String],
    faucet_enabled: bool,
    now: i64,
) -> Result<(), DbErr> {
    assert!(
        addresses.len() <= 1_000,
        "Allowlist batch exceeds defensive limit"
    );
    for address in addresses {
        let record = wallet_record::ActiveModel {
            address: ActiveValue::Set(address.clone()),
            last_message_reset: ActiveValue::Set(now),
            message_count: ActiveValue::Set(0),
            faucet_enabled: ActiveValue::Set(faucet_enabled),
            last_claimed: ActiveValue::Set(None),
            version: ActiveValue::Set(0),
        };
        WalletRecord::insert(record)
            .on_conflict(
                OnConflict::column(wallet_record::Column::Address)
                    .update_column(wallet_record::Column::FaucetEnabled)
                    .to_owned(),
            )
            .exec(database)
            .await?;
    }
    Ok(())
}

pub async fn remove_wallet(database: &DatabaseConnection, address: &str) -> Result<bool, DbErr> {
    let result = WalletRecord::delete_by_id(address.to_string())
        .exec(database)
        .await?;
    Ok(result.rows_affected == 1)
}

pub async fn list_wallets(
    database: &DatabaseConnection,
) -> Result<Vec<wallet_record::Model>, DbErr> {
    WalletRecord::find()
        .order_by_asc(wallet_record::Column::Address)
        .all(database)
        .await
}

pub async fn create_nonce(
    database: &DatabaseConnection,
    nonce: &str,
    wallet_address: &str,
    ttl_seconds: i64,
    now: i64,
) -> Result<(), DbErr> {
    assert!(ttl_seconds > 0, "Nonce TTL must be positive");
    let record = auth_nonce::ActiveModel {
        nonce: ActiveValue::Set(nonce.to_string()),
        wallet_address: ActiveValue::Set(wallet_address.to_string()),
        issued_at: ActiveValue::Set(now),
        expires_at: ActiveValue::Set(now + ttl_seconds),
        used: ActiveValue::Set(false),
    };
    AuthNonce::insert(record).exec(database).await?;
    Ok(())
}

/// Atomically mark a nonce used. Returns false when the nonce is
/// unknown, already spent, expired, or issued to a different wallet.
pub async fn consume_nonce(
    database: &DatabaseConnection,
    nonce: &str,
    wallet_address: &str,
    now: i64,
) -> Result<bool, DbErr> {
    let result = AuthNonce::update_many()
        .col_expr(auth_nonce::Column::Used, Expr::value(true))
        .filter(auth_nonce::Column::Nonce.eq(nonce))
        .filter(auth_nonce::Column::WalletAddress.eq(wallet_address))
        .filter(auth_nonce::Column::Used.eq(false))
        .filter(auth_nonce::Column::ExpiresAt.gte(now))
        .exec(database)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Store an encrypted message under its content hash. Re-requesting the
/// same (owner, message) pair refreshes the envelope in place.
pub async fn put_message(
    database: &DatabaseConnection,
    record: message_record::ActiveModel,
) -> Result<(), DbErr> {
    MessageRecord::insert(record)
        .on_conflict(
            OnConflict::column(message_record::Column::MessageHash)
                .update_columns([
                    message_record::Column::Ciphertext,
                    message_record::Column::Iv,
                    message_record::Column::CreatedAt,
                ])
                .to_owned(),
        )
        .exec(database)
        .await?;
    Ok(())
}

pub async fn get_message(
    database: &DatabaseConnection,
    message_hash: &str,
) -> Result<Option<message_record::Model>, DbErr> {
    MessageRecord::find_by_id(message_hash.to_string())
        .one(database)
        .await
}
