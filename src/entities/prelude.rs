#![allow(unused_imports)]

pub use super::auth_nonce::Entity as AuthNonce;
pub use super::message_record::Entity as MessageRecord;
pub use super::session_record::Entity as SessionRecord;
pub use super::wallet_record::Entity as WalletRecord;
