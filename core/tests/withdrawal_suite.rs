/// Withdrawal Lifecycle Integration Tests
///
/// Validates:
/// 1. Funds lock immediately at request time, before any admin action
/// 2. Resolution semantics: approve keeps the debit, reject restores it
/// 3. Exactly-once resolution (status guard, no re-resolution)
/// 4. Gating: minimum amount, disabled feature, address bounds
/// 5. Per-account serialization under concurrent requests

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use nimbus_core::account::{Account, WithdrawalStatus};
use nimbus_core::error::PlatformError;
use nimbus_core::platform::{MiningPlatform, RegisterRequest};
use nimbus_core::store::{MemoryStore, PlatformStore};
use nimbus_core::withdrawal::WithdrawalDecision;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn test_address() -> String {
    "NBX1qf8a0c3d4e5f6a7b8c9d0e1f2a3b".to_string()
}

fn platform() -> Arc<MiningPlatform> {
    Arc::new(MiningPlatform::new(Arc::new(MemoryStore::new())))
}

async fn funded_account(platform: &MiningPlatform, username: &str, balance: f64) -> Account {
    let account = platform
        .register_at(
            RegisterRequest {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                referral_code: None,
            },
            t0(),
        )
        .await
        .unwrap();
    let mut stored = platform.store().get_account(&account.id).await.unwrap().unwrap();
    stored.credit(balance);
    platform.store().update_account(&stored).await.unwrap();
    stored
}

async fn balance_of(platform: &MiningPlatform, account_id: &str) -> f64 {
    platform
        .store()
        .get_account(account_id)
        .await
        .unwrap()
        .unwrap()
        .balance
}

// =========================================================================
// 1. Locking at request time
// =========================================================================

#[tokio::test]
async fn test_request_debits_before_admin_action() {
    let platform = platform();
    let account = funded_account(&platform, "alice", 100.0).await;

    let request = platform
        .request_withdrawal_at(&account.id, 40.0, &test_address(), t0())
        .await
        .unwrap();
    assert_eq!(request.status, WithdrawalStatus::Pending);
    assert_eq!(balance_of(&platform, &account.id).await, 60.0);
}

#[tokio::test]
async fn test_locked_funds_unavailable_to_second_request() {
    let platform = platform();
    let account = funded_account(&platform, "alice", 50.0).await;

    platform
        .request_withdrawal_at(&account.id, 40.0, &test_address(), t0())
        .await
        .unwrap();
    let result = platform
        .request_withdrawal_at(&account.id, 40.0, &test_address(), t0())
        .await;
    assert!(matches!(
        result,
        Err(PlatformError::InsufficientBalance { available, .. }) if available == 10.0
    ));
}

// =========================================================================
// 2. Resolution semantics
// =========================================================================

#[tokio::test]
async fn test_approve_keeps_debit() {
    let platform = platform();
    let account = funded_account(&platform, "alice", 100.0).await;
    let request = platform
        .request_withdrawal_at(&account.id, 40.0, &test_address(), t0())
        .await
        .unwrap();

    let resolution = platform
        .resolve_withdrawal_at(
            &account.id,
            &request.id,
            WithdrawalDecision::Approved,
            t0() + Duration::hours(1),
        )
        .await
        .unwrap();

    assert_eq!(resolution.request.status, WithdrawalStatus::Approved);
    assert_eq!(resolution.request.resolved_at, Some(t0() + Duration::hours(1)));
    assert_eq!(resolution.balance, 60.0);
    assert_eq!(balance_of(&platform, &account.id).await, 60.0);
}

#[tokio::test]
async fn test_reject_restores_exact_amount() {
    let platform = platform();
    let account = funded_account(&platform, "alice", 100.0).await;
    let request = platform
        .request_withdrawal_at(&account.id, 40.0, &test_address(), t0())
        .await
        .unwrap();

    let resolution = platform
        .resolve_withdrawal_at(
            &account.id,
            &request.id,
            WithdrawalDecision::Rejected,
            t0() + Duration::hours(1),
        )
        .await
        .unwrap();

    assert_eq!(resolution.request.status, WithdrawalStatus::Rejected);
    assert_eq!(resolution.balance, 100.0);
    assert_eq!(balance_of(&platform, &account.id).await, 100.0);
}

// =========================================================================
// 3. Exactly-once resolution
// =========================================================================

#[tokio::test]
async fn test_no_re_resolution_and_no_balance_drift() {
    let platform = platform();
    let account = funded_account(&platform, "alice", 100.0).await;
    let request = platform
        .request_withdrawal_at(&account.id, 40.0, &test_address(), t0())
        .await
        .unwrap();

    platform
        .resolve_withdrawal_at(&account.id, &request.id, WithdrawalDecision::Rejected, t0())
        .await
        .unwrap();
    assert_eq!(balance_of(&platform, &account.id).await, 100.0);

    // A second rejection must not credit the amount again
    let result = platform
        .resolve_withdrawal_at(&account.id, &request.id, WithdrawalDecision::Rejected, t0())
        .await;
    assert!(matches!(result, Err(PlatformError::AlreadyResolved)));
    assert_eq!(balance_of(&platform, &account.id).await, 100.0);

    // Nor can it be flipped to approved afterwards
    let result = platform
        .resolve_withdrawal_at(&account.id, &request.id, WithdrawalDecision::Approved, t0())
        .await;
    assert!(matches!(result, Err(PlatformError::AlreadyResolved)));
}

#[tokio::test]
async fn test_resolution_requires_owning_account() {
    let platform = platform();
    let alice = funded_account(&platform, "alice", 100.0).await;
    let mallory = funded_account(&platform, "mallory", 100.0).await;

    let request = platform
        .request_withdrawal_at(&alice.id, 40.0, &test_address(), t0())
        .await
        .unwrap();

    // Resolving against the wrong owner is NotFound, and nothing changes
    let result = platform
        .resolve_withdrawal_at(&mallory.id, &request.id, WithdrawalDecision::Approved, t0())
        .await;
    assert!(matches!(result, Err(PlatformError::NotFound(_))));
    assert_eq!(balance_of(&platform, &alice.id).await, 60.0);
    assert_eq!(balance_of(&platform, &mallory.id).await, 100.0);
}

// =========================================================================
// 4. Gating
// =========================================================================

#[tokio::test]
async fn test_below_minimum_rejected_without_balance_change() {
    let platform = platform();
    let account = funded_account(&platform, "alice", 100.0).await;

    let result = platform
        .request_withdrawal_at(&account.id, 5.0, &test_address(), t0())
        .await;
    assert!(matches!(result, Err(PlatformError::BelowMinimum { minimum }) if minimum == 10.0));
    assert_eq!(balance_of(&platform, &account.id).await, 100.0);
}

#[tokio::test]
async fn test_withdrawals_disabled_by_settings() {
    let platform = platform();
    let account = funded_account(&platform, "alice", 100.0).await;

    let mut settings = platform.get_settings().await.unwrap();
    settings.withdrawals_enabled = false;
    platform.update_settings(settings).await.unwrap();

    let result = platform
        .request_withdrawal_at(&account.id, 40.0, &test_address(), t0())
        .await;
    assert!(matches!(result, Err(PlatformError::FeatureDisabled(_))));
    assert_eq!(balance_of(&platform, &account.id).await, 100.0);
}

#[tokio::test]
async fn test_address_bounds_enforced() {
    let platform = platform();
    let account = funded_account(&platform, "alice", 100.0).await;

    for bad in ["", "   ", "short", &"x".repeat(63)] {
        let result = platform
            .request_withdrawal_at(&account.id, 40.0, bad, t0())
            .await;
        assert!(matches!(result, Err(PlatformError::InvalidAddress(_))), "accepted {:?}", bad);
    }
    assert_eq!(balance_of(&platform, &account.id).await, 100.0);
}

#[tokio::test]
async fn test_raised_minimum_applies_to_new_requests() {
    let platform = platform();
    let account = funded_account(&platform, "alice", 100.0).await;

    let mut settings = platform.get_settings().await.unwrap();
    settings.min_withdrawal_amount = 50.0;
    platform.update_settings(settings).await.unwrap();

    let result = platform
        .request_withdrawal_at(&account.id, 40.0, &test_address(), t0())
        .await;
    assert!(matches!(result, Err(PlatformError::BelowMinimum { minimum }) if minimum == 50.0));

    platform
        .request_withdrawal_at(&account.id, 60.0, &test_address(), t0())
        .await
        .unwrap();
}

// =========================================================================
// 5. History, admin listing, concurrency
// =========================================================================

#[tokio::test]
async fn test_history_newest_first() {
    let platform = platform();
    let account = funded_account(&platform, "alice", 100.0).await;

    platform
        .request_withdrawal_at(&account.id, 10.0, &test_address(), t0())
        .await
        .unwrap();
    platform
        .request_withdrawal_at(&account.id, 20.0, &test_address(), t0() + Duration::hours(1))
        .await
        .unwrap();

    let history = platform.withdrawal_history(&account.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].amount, 20.0);
    assert_eq!(history[1].amount, 10.0);
}

#[tokio::test]
async fn test_admin_listing_filters_by_status() {
    let platform = platform();
    let alice = funded_account(&platform, "alice", 100.0).await;
    let bob = funded_account(&platform, "bob", 100.0).await;

    let a1 = platform
        .request_withdrawal_at(&alice.id, 10.0, &test_address(), t0())
        .await
        .unwrap();
    platform
        .request_withdrawal_at(&bob.id, 20.0, &test_address(), t0() + Duration::minutes(1))
        .await
        .unwrap();
    platform
        .resolve_withdrawal_at(&alice.id, &a1.id, WithdrawalDecision::Approved, t0())
        .await
        .unwrap();

    let pending = platform
        .list_withdrawals(Some(WithdrawalStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].username, "bob");

    let all = platform.list_withdrawals(None).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_concurrent_requests_serialize_per_account() {
    // Balance covers only one of the two racing requests; the per-account
    // lock must let exactly one through
    let platform = platform();
    let account = funded_account(&platform, "alice", 15.0).await;

    let p1 = platform.clone();
    let p2 = platform.clone();
    let id1 = account.id.clone();
    let id2 = account.id.clone();
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { p1.request_withdrawal_at(&id1, 10.0, &test_address(), t0()).await }),
        tokio::spawn(async move { p2.request_withdrawal_at(&id2, 10.0, &test_address(), t0()).await }),
    );

    let outcomes = [r1.unwrap(), r2.unwrap()];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert_eq!(balance_of(&platform, &account.id).await, 5.0);
}
