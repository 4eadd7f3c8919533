use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Wallet records: one row per allowlisted wallet, keyed by the
        // lower-cased address. The version column guards every
        // read-modify-write with a compare-and-swap.
        manager
            .create_table(
                Table::create()
                    .table(WalletRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WalletRecords::Address)
                            .string_len(42)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WalletRecords::LastMessageReset)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WalletRecords::MessageCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(WalletRecords::FaucetEnabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(WalletRecords::LastClaimed).big_integer())
                    .col(
                        ColumnDef::new(WalletRecords::Version)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        // Session records, keyed by opaque session id. Expiry is soft:
        // rows are checked on read, never actively purged.
        manager
            .create_table(
                Table::create()
                    .table(SessionRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SessionRecords::SessionId)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SessionRecords::WalletAddress)
                            .string_len(42)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SessionRecords::IssuedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SessionRecords::ExpiresAt)
                            .big_integer()
                            .not_null(),
                    )
                    .index(
                        Index::create()
                            .name("idx_session_wallet")
                            .col(SessionRecords::WalletAddress),
                    )
                    .to_owned(),
            )
            .await?;

        // Encrypted chat messages bound for on-chain minting, keyed by
        // the keccak hash of (owner, message).
        manager
            .create_table(
                Table::create()
                    .table(MessageRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MessageRecords::MessageHash)
                            .string_len(66)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MessageRecords::Owner)
                            .string_len(42)
                            .not_null(),
                    )
                    .col(ColumnDef::new(MessageRecords::Ciphertext).text().not_null())
                    .col(ColumnDef::new(MessageRecords::Iv).string_len(24).not_null())
                    .col(
                        ColumnDef::new(MessageRecords::Minted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(MessageRecords::MintedAt).big_integer())
                    .col(
                        ColumnDef::new(MessageRecords::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .index(
                        Index::create()
                            .name("idx_message_owner")
                            .col(MessageRecords::Owner),
                    )
                    .to_owned(),
            )
            .await?;

        // Single-use SIWE nonces with a short TTL.
        manager
            .create_table(
                Table::create()
                    .table(AuthNonces::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthNonces::Nonce)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AuthNonces::WalletAddress)
                            .string_len(42)
                            .not_null(),
                    )
                    .col(ColumnDef::new(AuthNonces::IssuedAt).big_integer().not_null())
                    .col(
                        ColumnDef::new(AuthNonces::ExpiresAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AuthNonces::Used)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuthNonces::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MessageRecords::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SessionRecords::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WalletRecords::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum WalletRecords {
    Table,
    Address,
    LastMessageReset,
    MessageCount,
    FaucetEnabled,
    LastClaimed,
    Version,
}

#[derive(DeriveIden)]
enum SessionRecords {
    Table,
    SessionId,
    WalletAddress,
    IssuedAt,
    ExpiresAt,
}

#[derive(DeriveIden)]
enum MessageRecords {
    Table,
    MessageHash,
    Owner,
    Ciphertext,
    Iv,
    Minted,
    MintedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AuthNonces {
    Table,
    Nonce,
    WalletAddress,
    IssuedAt,
    ExpiresAt,
    Used,
}
