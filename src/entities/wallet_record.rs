use sea_orm::entity::prelude::*;

/// Per-wallet allowlist and rate-limit state, keyed by lower-cased
/// address. `version` is bumped on every write; updates filter on the
/// value they read so concurrent writers cannot clobber each other.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "wallet_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub address: String,
    pub last_message_reset: i64,
    pub message_count: i32,
    pub faucet_enabled: bool,
    pub last_claimed: Option<i64>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
