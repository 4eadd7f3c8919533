//! Session manager: opaque short-lived tokens proving a prior wallet
//! signature verification.
//!
//! Expiry is soft. Rows are never purged on a timer; every privileged
//! request re-checks `expires_at`, and an expired row answers 403 where
//! an unknown id answers 401 so clients can tell "never authenticated"
//! from "needs re-authentication". Issuing a session does not touch any
//! other session the same wallet may hold.

use chrono::Utc;
use sea_orm::{ActiveValue, DatabaseConnection, DbErr, EntityTrait};
use thiserror::Error;
use uuid::Uuid;

use crate::entities::prelude::SessionRecord;
use crate::entities::session_record;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found")]
    Unknown,
    #[error("session expired")]
    Expired,
    #[error("session store failure: {0}")]
    Store(#[from] DbErr),
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub wallet_address: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

pub fn is_expired(expires_at: i64, now: i64) -> bool {
    expires_at < now
}

/// Issue a fresh session for a wallet that just proved control.
pub async fn issue(
    database: &DatabaseConnection,
    wallet_address: &str,
    lifetime_seconds: i64,
) -> Result<Session, DbErr> {
    assert!(lifetime_seconds > 0, "Session lifetime must be positive");
    assert!(
        wallet_address == wallet_address.to_ascii_lowercase(),
        "Session wallet key must be normalized"
    );

    let session_id = Uuid::new_v4().to_string();
    let issued_at = Utc::now().timestamp();
    let expires_at = issued_at + lifetime_seconds;

    let record = session_record::ActiveModel {
        session_id: ActiveValue::Set(session_id.clone()),
        wallet_address: ActiveValue::Set(wallet_address.to_string()),
        issued_at: ActiveValue::Set(issued_at),
        expires_at: ActiveValue::Set(expires_at),
    };
    SessionRecord::insert(record).exec(database).await?;

    Ok(Session {
        session_id,
        wallet_address: wallet_address.to_string(),
        issued_at,
        expires_at,
    })
}

/// Resolve a session id to its wallet, distinguishing unknown from
/// expired.
pub async fn validate(
    database: &DatabaseConnection,
    session_id: &str,
    now: i64,
) -> Result<Session, SessionError> {
    let record = SessionRecord::find_by_id(session_id.to_string())
        .one(database)
        .await?
        .ok_or(SessionError::Unknown)?;

    if is_expired(record.expires_at, now) {
        return Err(SessionError::Expired);
    }

    Ok(Session {
        session_id: record.session_id,
        wallet_address: record.wallet_address,
        issued_at: record.issued_at,
        expires_at: record.expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_boundary_is_inclusive() {
        // Valid iff expires_at >= now.
        assert!(!is_expired(100, 100));
        assert!(!is_expired(101, 100));
        assert!(is_expired(99, 100));
    }
}
