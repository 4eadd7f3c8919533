use sea_orm::entity::prelude::*;

/// Encrypted chat message awaiting (or past) on-chain minting, keyed by
/// the keccak256 hash of (owner, message).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "message_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub message_hash: String,
    pub owner: String,
    pub ciphertext: String,
    pub iv: String,
    pub minted: bool,
    pub minted_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
