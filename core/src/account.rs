/// Nimbus Account Ledger — balances, mining-session state, embedded withdrawals
///
/// The account document is the unit of persistence: balance, accrual rate,
/// the open mining session (if any), KYC flags, referral linkage, and the
/// embedded withdrawal-request sub-collection all live on one document so a
/// single store round trip applies each mutation atomically.
///
/// Ledger invariants:
///
/// 1. `balance >= 0` at all times — `debit` refuses to overdraw
/// 2. `is_mining` ⟺ `mining_started_at.is_some()` ⟺ `session_rate.is_some()`
/// 3. `total_mined` never decreases

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;
use crate::referral;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KycStatus {
    None,
    Pending,
    Approved,
    Rejected,
}

/// Identity-verification state carried on the account. The platform treats
/// KYC as an external flag: submission records a payment transaction id, an
/// administrator flips the status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycState {
    pub status: KycStatus,
    /// Proof-of-payment transaction id supplied on submission
    pub tid: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl Default for KycState {
    fn default() -> Self {
        Self {
            status: KycStatus::None,
            tid: None,
            submitted_at: None,
            rejection_reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

/// A withdrawal request embedded in its owning account. The amount is
/// debited ("locked") at creation time; rejection is the only path that
/// credits it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: String,
    pub amount: f64,
    pub address: String,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
    /// Set exactly once, on the transition out of `Pending`
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Opaque identifier, immutable
    pub id: String,
    pub username: String,
    pub email: String,

    /// Claimable NBX balance
    pub balance: f64,
    /// NBX per hour; lazily refreshed from the referral count
    pub accrual_rate: f64,
    pub is_mining: bool,
    /// Present only while a session is open
    pub mining_started_at: Option<DateTime<Utc>>,
    /// Rate frozen at session start; a referral gained mid-session does not
    /// change it
    pub session_rate: Option<f64>,
    /// Lifetime total, monotonically non-decreasing
    pub total_mined: f64,
    pub last_claim_at: Option<DateTime<Utc>>,

    /// 8-char uppercase hex, unique across accounts
    pub referral_code: String,
    /// Referring account id; set once at creation, never mutated
    pub referred_by: Option<String>,
    pub referral_earnings: f64,

    pub kyc: KycState,
    pub is_active: bool,

    /// Embedded sub-collection, newest appended last
    pub withdrawals: Vec<WithdrawalRequest>,

    /// Opaque bearer credential resolved by the auth layer
    pub access_token: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a fresh account at the base accrual rate.
    pub fn new(
        username: &str,
        email: &str,
        referral_code: String,
        referred_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            balance: 0.0,
            accrual_rate: referral::BASE_RATE,
            is_mining: false,
            mining_started_at: None,
            session_rate: None,
            total_mined: 0.0,
            last_claim_at: None,
            referral_code,
            referred_by,
            referral_earnings: 0.0,
            kyc: KycState::default(),
            is_active: true,
            withdrawals: Vec::new(),
            access_token: new_access_token(),
            created_at: now,
        }
    }

    // -- Ledger operations --------------------------------------------------

    /// Add to the claimable balance.
    pub fn credit(&mut self, amount: f64) {
        self.balance += amount;
    }

    /// Subtract from the claimable balance; refuses to overdraw.
    pub fn debit(&mut self, amount: f64) -> Result<(), PlatformError> {
        if amount > self.balance {
            return Err(PlatformError::InsufficientBalance {
                available: self.balance,
                requested: amount,
            });
        }
        self.balance -= amount;
        Ok(())
    }

    /// Debit funds for a new withdrawal request. Called at request-creation
    /// time, before any administrator action, so the amount is unavailable
    /// to a second request while the first is still pending.
    pub fn lock_for_withdrawal(&mut self, amount: f64) -> Result<(), PlatformError> {
        self.debit(amount)
    }

    /// Credit locked funds back. Called only when a pending withdrawal is
    /// rejected; there is no cancel-before-resolution path.
    pub fn release_lock(&mut self, amount: f64) {
        self.credit(amount);
    }

    // -- Lookups ------------------------------------------------------------

    pub fn withdrawal(&self, request_id: &str) -> Option<&WithdrawalRequest> {
        self.withdrawals.iter().find(|w| w.id == request_id)
    }

    pub fn withdrawal_mut(&mut self, request_id: &str) -> Option<&mut WithdrawalRequest> {
        self.withdrawals.iter_mut().find(|w| w.id == request_id)
    }
}

// ---------------------------------------------------------------------------
// Credential generation
// ---------------------------------------------------------------------------

/// Generate a referral code: 4 random bytes, uppercase hex.
pub fn new_referral_code() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes).to_uppercase()
}

/// Generate an opaque access token for the auth collaborator.
pub fn new_access_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
