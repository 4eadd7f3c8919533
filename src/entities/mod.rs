pub mod auth_nonce;
pub mod message_record;
pub mod prelude;
pub mod session_record;
pub mod wallet_record;
