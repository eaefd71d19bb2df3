/// Referral Rate Modifier
///
/// An account's accrual rate is a pure function of its referral count:
/// `BASE_RATE + count * BONUS_PER_REFERRAL`. The stored rate is refreshed
/// lazily — at session start, and opportunistically when a status query
/// notices a mismatch — never on a tick. A session that is already running
/// keeps the rate frozen at its start (`Account::session_rate`); only future
/// sessions see a rate change.

use crate::account::Account;

/// Accrual rate every account starts at, in NBX per hour.
pub const BASE_RATE: f64 = 0.1;

/// Additive rate bonus per successfully referred registration, NBX per hour.
pub const BONUS_PER_REFERRAL: f64 = 0.005;

/// Rate an account is entitled to given its current referral count.
pub fn current_rate(referral_count: u64) -> f64 {
    BASE_RATE + referral_count as f64 * BONUS_PER_REFERRAL
}

/// Registration side effect: bump the referrer's stored rate by one bonus.
///
/// Applied additively, exactly once per referred registration — independent
/// of the lazy recompute path. The referrer's open session (if any) keeps
/// its frozen `session_rate`.
pub fn apply_referral_bonus(referrer: &mut Account) {
    referrer.accrual_rate += BONUS_PER_REFERRAL;
}
