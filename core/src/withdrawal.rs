/// Withdrawal Lifecycle — request, lock, resolve
///
/// State machine: `pending → approved` (terminal) or `pending → rejected`
/// (terminal, releases the locked funds). Funds are debited at request
/// creation, so a second request cannot spend the same balance while the
/// first is pending. Resolution is guarded by a check-then-set on the
/// stored status, never by caller discipline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::{Account, WithdrawalRequest, WithdrawalStatus};
use crate::error::PlatformError;
use crate::settings::PlatformSettings;

/// Destination address length bounds (opaque string, no checksum).
pub const MIN_ADDRESS_LEN: usize = 26;
pub const MAX_ADDRESS_LEN: usize = 62;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalDecision {
    Approved,
    Rejected,
}

/// Validate a destination address for non-emptiness and length bounds only.
pub fn validate_address(address: &str) -> Result<&str, PlatformError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(PlatformError::InvalidAddress("address is required".to_string()));
    }
    if trimmed.len() < MIN_ADDRESS_LEN || trimmed.len() > MAX_ADDRESS_LEN {
        return Err(PlatformError::InvalidAddress(format!(
            "address must be {}-{} characters",
            MIN_ADDRESS_LEN, MAX_ADDRESS_LEN
        )));
    }
    Ok(trimmed)
}

/// Create a pending withdrawal request, locking `amount` from the balance.
pub fn request_withdrawal(
    account: &mut Account,
    amount: f64,
    address: &str,
    settings: &PlatformSettings,
    now: DateTime<Utc>,
) -> Result<WithdrawalRequest, PlatformError> {
    if !settings.withdrawals_enabled {
        return Err(PlatformError::FeatureDisabled("Withdrawals"));
    }
    let address = validate_address(address)?;
    if !amount.is_finite() || amount <= 0.0 || amount < settings.min_withdrawal_amount {
        return Err(PlatformError::BelowMinimum {
            minimum: settings.min_withdrawal_amount,
        });
    }

    account.lock_for_withdrawal(amount)?;

    let request = WithdrawalRequest {
        id: uuid::Uuid::new_v4().to_string(),
        amount,
        address: address.to_string(),
        status: WithdrawalStatus::Pending,
        requested_at: now,
        resolved_at: None,
    };
    account.withdrawals.push(request.clone());
    Ok(request)
}

/// Resolve a pending request. Approval keeps the debit; rejection releases
/// the locked amount back to the balance. A request that already left the
/// pending state cannot be resolved again.
pub fn resolve_withdrawal(
    account: &mut Account,
    request_id: &str,
    decision: WithdrawalDecision,
    now: DateTime<Utc>,
) -> Result<WithdrawalRequest, PlatformError> {
    let request = account
        .withdrawal_mut(request_id)
        .ok_or_else(|| PlatformError::NotFound("Withdrawal request".to_string()))?;

    if request.status != WithdrawalStatus::Pending {
        return Err(PlatformError::AlreadyResolved);
    }

    request.status = match decision {
        WithdrawalDecision::Approved => WithdrawalStatus::Approved,
        WithdrawalDecision::Rejected => WithdrawalStatus::Rejected,
    };
    request.resolved_at = Some(now);
    let amount = request.amount;
    let resolved = request.clone();

    if decision == WithdrawalDecision::Rejected {
        account.release_lock(amount);
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::new_referral_code;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn funded_account(balance: f64) -> Account {
        let mut account =
            Account::new("bob", "bob@example.com", new_referral_code(), None, t0());
        account.credit(balance);
        account
    }

    fn test_address() -> String {
        "NBX1qf8a0c3d4e5f6a7b8c9d0e1f2a3b".to_string()
    }

    #[test]
    fn test_request_locks_funds_immediately() {
        let mut account = funded_account(100.0);
        let settings = PlatformSettings::default();
        let request =
            request_withdrawal(&mut account, 25.0, &test_address(), &settings, t0()).unwrap();
        assert_eq!(account.balance, 75.0);
        assert_eq!(request.status, WithdrawalStatus::Pending);
        assert!(request.resolved_at.is_none());
        assert_eq!(account.withdrawals.len(), 1);
    }

    #[test]
    fn test_request_below_minimum() {
        let mut account = funded_account(100.0);
        let settings = PlatformSettings::default();
        let result = request_withdrawal(&mut account, 5.0, &test_address(), &settings, t0());
        assert_eq!(result, Err(PlatformError::BelowMinimum { minimum: 10.0 }));
        assert_eq!(account.balance, 100.0);
        assert!(account.withdrawals.is_empty());
    }

    #[test]
    fn test_request_insufficient_balance() {
        let mut account = funded_account(20.0);
        let settings = PlatformSettings::default();
        let result = request_withdrawal(&mut account, 50.0, &test_address(), &settings, t0());
        assert!(matches!(result, Err(PlatformError::InsufficientBalance { .. })));
        assert_eq!(account.balance, 20.0);
    }

    #[test]
    fn test_request_feature_disabled() {
        let mut account = funded_account(100.0);
        let settings = PlatformSettings {
            withdrawals_enabled: false,
            ..PlatformSettings::default()
        };
        let result = request_withdrawal(&mut account, 25.0, &test_address(), &settings, t0());
        assert_eq!(result, Err(PlatformError::FeatureDisabled("Withdrawals")));
        assert_eq!(account.balance, 100.0);
    }

    #[test]
    fn test_address_bounds() {
        assert!(validate_address("").is_err());
        assert!(validate_address("   ").is_err());
        assert!(validate_address("tooshort").is_err());
        assert!(validate_address(&"x".repeat(63)).is_err());
        assert!(validate_address(&"x".repeat(26)).is_ok());
        assert!(validate_address(&"x".repeat(62)).is_ok());
    }

    #[test]
    fn test_second_request_cannot_reuse_locked_funds() {
        let mut account = funded_account(40.0);
        let settings = PlatformSettings::default();
        request_withdrawal(&mut account, 30.0, &test_address(), &settings, t0()).unwrap();
        let result = request_withdrawal(&mut account, 30.0, &test_address(), &settings, t0());
        assert!(matches!(
            result,
            Err(PlatformError::InsufficientBalance { available, .. }) if available == 10.0
        ));
    }

    #[test]
    fn test_approve_keeps_debit() {
        let mut account = funded_account(100.0);
        let settings = PlatformSettings::default();
        let request =
            request_withdrawal(&mut account, 25.0, &test_address(), &settings, t0()).unwrap();
        let resolved = resolve_withdrawal(
            &mut account,
            &request.id,
            WithdrawalDecision::Approved,
            t0() + Duration::hours(1),
        )
        .unwrap();
        assert_eq!(resolved.status, WithdrawalStatus::Approved);
        assert_eq!(resolved.resolved_at, Some(t0() + Duration::hours(1)));
        assert_eq!(account.balance, 75.0);
    }

    #[test]
    fn test_reject_restores_exact_amount() {
        let mut account = funded_account(100.0);
        let settings = PlatformSettings::default();
        let request =
            request_withdrawal(&mut account, 25.0, &test_address(), &settings, t0()).unwrap();
        let resolved = resolve_withdrawal(
            &mut account,
            &request.id,
            WithdrawalDecision::Rejected,
            t0() + Duration::hours(1),
        )
        .unwrap();
        assert_eq!(resolved.status, WithdrawalStatus::Rejected);
        assert_eq!(account.balance, 100.0);
    }

    #[test]
    fn test_double_resolution_refused() {
        let mut account = funded_account(100.0);
        let settings = PlatformSettings::default();
        let request =
            request_withdrawal(&mut account, 25.0, &test_address(), &settings, t0()).unwrap();
        resolve_withdrawal(&mut account, &request.id, WithdrawalDecision::Rejected, t0())
            .unwrap();
        let balance_after_first = account.balance;

        // Second resolution of either kind must fail and change nothing
        let again =
            resolve_withdrawal(&mut account, &request.id, WithdrawalDecision::Approved, t0());
        assert_eq!(again, Err(PlatformError::AlreadyResolved));
        assert_eq!(account.balance, balance_after_first);

        let again =
            resolve_withdrawal(&mut account, &request.id, WithdrawalDecision::Rejected, t0());
        assert_eq!(again, Err(PlatformError::AlreadyResolved));
        assert_eq!(account.balance, balance_after_first);
    }

    #[test]
    fn test_resolve_unknown_request() {
        let mut account = funded_account(100.0);
        let result = resolve_withdrawal(
            &mut account,
            "no-such-request",
            WithdrawalDecision::Approved,
            t0(),
        );
        assert!(matches!(result, Err(PlatformError::NotFound(_))));
    }
}
