//! Eligibility and cooldown decisions.
//!
//! Pure functions over a wallet-record snapshot plus the chain reads the
//! caller already performed; `now` is always an explicit argument. Three
//! call sites share the arithmetic but apply different policies: chat
//! rate limiting, faucet claims, and migration mint authorization.
//!
//! Everywhere, "cooldown expired" means remaining <= 0, and an absent
//! timestamp means no cooldown at all.

/// Seconds until the window opened by `since` elapses; 0 when already
/// open or when no prior event exists.
pub fn remaining_cooldown(since: Option<i64>, cooldown_seconds: i64, now: i64) -> i64 {
    assert!(cooldown_seconds > 0, "Cooldown duration must be positive");
    match since {
        Some(since) => (since + cooldown_seconds - now).max(0),
        None => 0,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatDecision {
    /// Permitted. `reset` means the window elapsed and the counter must
    /// be zeroed (and `last_message_reset` stamped) before incrementing.
    Allow { reset: bool },
    /// Limit reached inside an open window.
    Blocked { remaining: i64 },
}

pub fn evaluate_chat(
    message_count: i32,
    message_limit: i32,
    last_message_reset: i64,
    cooldown_seconds: i64,
    now: i64,
) -> ChatDecision {
    assert!(message_limit > 0, "Chat limit must be positive");
    assert!(message_count >= 0, "Message count cannot be negative");

    if message_count < message_limit {
        return ChatDecision::Allow { reset: false };
    }

    let remaining = remaining_cooldown(Some(last_message_reset), cooldown_seconds, now);
    if remaining <= 0 {
        ChatDecision::Allow { reset: true }
    } else {
        ChatDecision::Blocked { remaining }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaucetDecision {
    Allow,
    /// Operator flag off, or no proof-of-participation badge on the
    /// legacy chain.
    NotAllowlisted,
    CooldownActive { next_claim_in: i64 },
}

pub fn evaluate_faucet(
    faucet_enabled: bool,
    legacy_badge_balance: u64,
    last_claimed: Option<i64>,
    cooldown_seconds: i64,
    now: i64,
) -> FaucetDecision {
    if !faucet_enabled || legacy_badge_balance == 0 {
        return FaucetDecision::NotAllowlisted;
    }

    let remaining = remaining_cooldown(last_claimed, cooldown_seconds, now);
    if remaining <= 0 {
        FaucetDecision::Allow
    } else {
        FaucetDecision::CooldownActive {
            next_claim_in: remaining,
        }
    }
}

/// Compensation after a failed downstream mint: stamp the claim as if it
/// happened a full window ago, so the very next attempt is permitted.
pub fn rolled_back_claim(now: i64, cooldown_seconds: i64) -> i64 {
    assert!(cooldown_seconds > 0, "Cooldown duration must be positive");
    now - cooldown_seconds
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationEligibility {
    Eligible,
    /// Already holds the replacement badge on the primary chain.
    AlreadyMigrated,
    /// Holds nothing on the legacy chain to migrate.
    NotEligible,
}

pub fn evaluate_migration(
    primary_badge_balance: u64,
    legacy_badge_balance: u64,
) -> MigrationEligibility {
    if primary_badge_balance > 0 {
        MigrationEligibility::AlreadyMigrated
    } else if legacy_badge_balance == 0 {
        MigrationEligibility::NotEligible
    } else {
        MigrationEligibility::Eligible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 86_400;

    #[test]
    fn remaining_formula() {
        let now = 1_700_000_000;
        assert_eq!(remaining_cooldown(Some(now - 90_000), DAY, now), 0);
        assert_eq!(remaining_cooldown(Some(now - DAY), DAY, now), 0);
        assert_eq!(remaining_cooldown(Some(now - DAY + 1), DAY, now), 1);
        assert_eq!(remaining_cooldown(Some(now), DAY, now), DAY);
        assert_eq!(remaining_cooldown(None, DAY, now), 0);
    }

    #[test]
    fn chat_under_limit_allows_without_reset() {
        assert_eq!(
            evaluate_chat(3, 10, 0, DAY, 100),
            ChatDecision::Allow { reset: false }
        );
    }

    #[test]
    fn chat_at_limit_with_elapsed_window_resets() {
        let now = 1_700_000_000;
        // Counter at the limit, window exactly elapsed: permitted, and
        // the caller zeroes the counter before its single increment.
        assert_eq!(
            evaluate_chat(10, 10, now - DAY, DAY, now),
            ChatDecision::Allow { reset: true }
        );
    }

    #[test]
    fn chat_at_limit_inside_window_blocks() {
        let now = 1_700_000_000;
        assert_eq!(
            evaluate_chat(10, 10, now - DAY + 60, DAY, now),
            ChatDecision::Blocked { remaining: 60 }
        );
    }

    #[test]
    fn faucet_claim_past_window_allowed() {
        let now = 1_700_000_000;
        assert_eq!(
            evaluate_faucet(true, 1, Some(now - 90_000), DAY, now),
            FaucetDecision::Allow
        );
    }

    #[test]
    fn faucet_never_claimed_allowed() {
        assert_eq!(evaluate_faucet(true, 1, None, DAY, 100), FaucetDecision::Allow);
    }

    #[test]
    fn faucet_disabled_or_badgeless_is_not_allowlisted() {
        let now = 1_700_000_000;
        assert_eq!(
            evaluate_faucet(false, 5, None, DAY, now),
            FaucetDecision::NotAllowlisted
        );
        assert_eq!(
            evaluate_faucet(true, 0, None, DAY, now),
            FaucetDecision::NotAllowlisted
        );
    }

    #[test]
    fn faucet_inside_window_reports_wait() {
        let now = 1_700_000_000;
        assert_eq!(
            evaluate_faucet(true, 1, Some(now - DAY / 2), DAY, now),
            FaucetDecision::CooldownActive {
                next_claim_in: DAY / 2
            }
        );
    }

    #[test]
    fn rollback_reopens_window_immediately() {
        let now = 1_700_000_000;
        let stamped = rolled_back_claim(now, DAY);
        assert_eq!(remaining_cooldown(Some(stamped), DAY, now), 0);
        // Still open a moment later.
        assert_eq!(remaining_cooldown(Some(stamped), DAY, now + 1), 0);
    }

    #[test]
    fn migration_split_verdicts() {
        assert_eq!(evaluate_migration(0, 1), MigrationEligibility::Eligible);
        assert_eq!(evaluate_migration(1, 1), MigrationEligibility::AlreadyMigrated);
        assert_eq!(evaluate_migration(1, 0), MigrationEligibility::AlreadyMigrated);
        assert_eq!(evaluate_migration(0, 0), MigrationEligibility::NotEligible);
    }
}
