/// Accrual Engine — elapsed-time earnings for an open mining session
///
/// A session is the interval between `start_session` and `stop_session`.
/// Earnings accrue as wall-clock hours elapsed × the rate frozen at session
/// start; `stop_session` is the only path that converts accrued time into
/// spendable balance (the "claim").
///
/// Numeric rule: hours are an f64 duration (milliseconds / 3 600 000) and
/// amounts carry full double precision with **no rounding**. The live
/// status display and the final settled amount go through the same
/// `elapsed_earnings` expression, so a stop immediately after a status read
/// settles exactly the displayed figure.

use chrono::{DateTime, Utc};

use crate::account::Account;
use crate::error::PlatformError;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Open a mining session at `rate` (NBX/hour), timestamped `now`.
///
/// The caller supplies the rate after consulting the referral modifier; it
/// is snapshotted onto the account both as the stored rate and as the
/// frozen `session_rate`.
pub fn start_session(
    account: &mut Account,
    rate: f64,
    now: DateTime<Utc>,
) -> Result<(), PlatformError> {
    if account.is_mining {
        return Err(PlatformError::AlreadyMining);
    }
    account.is_mining = true;
    account.mining_started_at = Some(now);
    account.session_rate = Some(rate);
    account.accrual_rate = rate;
    Ok(())
}

/// Earnings accrued by the open session as of `as_of`.
///
/// Pure — safe to call repeatedly for status polling. Returns 0 when no
/// session is open, and clamps a non-positive elapsed interval to 0.
pub fn elapsed_earnings(account: &Account, as_of: DateTime<Utc>) -> f64 {
    let (started_at, rate) = match (account.mining_started_at, account.session_rate) {
        (Some(started_at), Some(rate)) if account.is_mining => (started_at, rate),
        _ => return 0.0,
    };
    let elapsed_ms = as_of.signed_duration_since(started_at).num_milliseconds();
    if elapsed_ms <= 0 {
        return 0.0;
    }
    (elapsed_ms as f64 / MILLIS_PER_HOUR) * rate
}

/// Close the open session as of `as_of`, crediting its earnings.
///
/// Adds the earned amount to both `balance` and `total_mined`, clears the
/// session fields, and records the claim time. Returns the earned amount.
/// Stopping with zero elapsed time is legal and earns 0.
pub fn stop_session(account: &mut Account, as_of: DateTime<Utc>) -> Result<f64, PlatformError> {
    if !account.is_mining {
        return Err(PlatformError::NotMining);
    }
    let earned = elapsed_earnings(account, as_of);
    account.balance += earned;
    account.total_mined += earned;
    account.is_mining = false;
    account.mining_started_at = None;
    account.session_rate = None;
    account.last_claim_at = Some(as_of);
    Ok(earned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::new_referral_code;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn test_account() -> Account {
        Account::new("miner", "miner@example.com", new_referral_code(), None, t0())
    }

    /// Session-state triple must hold after every operation.
    fn assert_session_invariant(account: &Account) {
        assert_eq!(account.is_mining, account.mining_started_at.is_some());
        assert_eq!(account.is_mining, account.session_rate.is_some());
    }

    #[test]
    fn test_start_sets_session_state() {
        let mut account = test_account();
        start_session(&mut account, 0.1, t0()).unwrap();
        assert!(account.is_mining);
        assert_eq!(account.mining_started_at, Some(t0()));
        assert_eq!(account.session_rate, Some(0.1));
        assert_eq!(account.accrual_rate, 0.1);
        assert_session_invariant(&account);
    }

    #[test]
    fn test_start_twice_fails() {
        let mut account = test_account();
        start_session(&mut account, 0.1, t0()).unwrap();
        let result = start_session(&mut account, 0.1, t0() + Duration::hours(1));
        assert_eq!(result, Err(PlatformError::AlreadyMining));
        // Original session untouched
        assert_eq!(account.mining_started_at, Some(t0()));
        assert_session_invariant(&account);
    }

    #[test]
    fn test_stop_without_session_fails() {
        let mut account = test_account();
        assert_eq!(stop_session(&mut account, t0()), Err(PlatformError::NotMining));
        assert_session_invariant(&account);
    }

    #[test]
    fn test_earnings_zero_when_not_mining() {
        let account = test_account();
        assert_eq!(elapsed_earnings(&account, t0() + Duration::hours(5)), 0.0);
    }

    #[test]
    fn test_earnings_after_two_hours() {
        let mut account = test_account();
        start_session(&mut account, 0.1, t0()).unwrap();
        let earnings = elapsed_earnings(&account, t0() + Duration::hours(2));
        assert!((earnings - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_earnings_monotonic_in_as_of() {
        let mut account = test_account();
        start_session(&mut account, 0.105, t0()).unwrap();
        let mut previous = 0.0;
        for minutes in [0, 1, 30, 60, 90, 240, 1440] {
            let earnings = elapsed_earnings(&account, t0() + Duration::minutes(minutes));
            assert!(earnings >= previous, "earnings decreased at {} minutes", minutes);
            previous = earnings;
        }
    }

    #[test]
    fn test_earnings_clamped_before_start() {
        let mut account = test_account();
        start_session(&mut account, 0.1, t0()).unwrap();
        assert_eq!(elapsed_earnings(&account, t0() - Duration::hours(1)), 0.0);
    }

    #[test]
    fn test_polling_does_not_mutate() {
        let mut account = test_account();
        start_session(&mut account, 0.1, t0()).unwrap();
        let first = elapsed_earnings(&account, t0() + Duration::hours(3));
        let second = elapsed_earnings(&account, t0() + Duration::hours(3));
        assert_eq!(first, second);
        assert_eq!(account.balance, 0.0);
        assert_session_invariant(&account);
    }

    #[test]
    fn test_stop_credits_balance_and_total() {
        let mut account = test_account();
        account.credit(100.0);
        start_session(&mut account, 0.1, t0()).unwrap();
        let earned = stop_session(&mut account, t0() + Duration::hours(2)).unwrap();
        assert!((earned - 0.2).abs() < 1e-12);
        assert!((account.balance - 100.2).abs() < 1e-12);
        assert!((account.total_mined - 0.2).abs() < 1e-12);
        assert_eq!(account.last_claim_at, Some(t0() + Duration::hours(2)));
        assert_session_invariant(&account);
    }

    #[test]
    fn test_stop_agrees_with_preceding_status_read() {
        let mut account = test_account();
        start_session(&mut account, 0.105, t0()).unwrap();
        let as_of = t0() + Duration::minutes(137);
        let displayed = elapsed_earnings(&account, as_of);
        let settled = stop_session(&mut account, as_of).unwrap();
        assert_eq!(displayed, settled);
    }

    #[test]
    fn test_stop_with_zero_elapsed() {
        let mut account = test_account();
        start_session(&mut account, 0.1, t0()).unwrap();
        let earned = stop_session(&mut account, t0()).unwrap();
        assert_eq!(earned, 0.0);
        assert_eq!(account.balance, 0.0);
        assert_eq!(account.total_mined, 0.0);
        assert_session_invariant(&account);
    }

    #[test]
    fn test_restart_after_stop() {
        let mut account = test_account();
        start_session(&mut account, 0.1, t0()).unwrap();
        stop_session(&mut account, t0() + Duration::hours(1)).unwrap();
        start_session(&mut account, 0.105, t0() + Duration::hours(2)).unwrap();
        assert_eq!(account.session_rate, Some(0.105));
        assert_session_invariant(&account);
    }

    #[test]
    fn test_total_mined_accumulates() {
        let mut account = test_account();
        start_session(&mut account, 0.1, t0()).unwrap();
        stop_session(&mut account, t0() + Duration::hours(1)).unwrap();
        start_session(&mut account, 0.1, t0() + Duration::hours(2)).unwrap();
        stop_session(&mut account, t0() + Duration::hours(3)).unwrap();
        assert!((account.total_mined - 0.2).abs() < 1e-12);
        assert!((account.balance - 0.2).abs() < 1e-12);
    }
}
