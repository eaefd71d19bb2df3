/// Platform settings document.
///
/// Global toggles and numeric parameters gating the accrual engine and the
/// withdrawal lifecycle. Stored as a single document in the platform store
/// and passed explicitly into each operation — never read as ambient global
/// state. Defaults are seeded on first load.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSettings {
    #[serde(default = "default_true")]
    pub mining_enabled: bool,
    #[serde(default = "default_true")]
    pub withdrawals_enabled: bool,
    #[serde(default = "default_true")]
    pub kyc_enabled: bool,
    #[serde(default = "default_true")]
    pub referral_enabled: bool,
    #[serde(default)]
    pub maintenance_mode: bool,

    // Mining
    #[serde(default = "default_min_claim")]
    pub min_claim_amount: f64,
    #[serde(default = "default_daily_limit")]
    pub daily_mining_limit_hours: f64,

    // Withdrawals
    #[serde(default = "default_min_withdrawal")]
    pub min_withdrawal_amount: f64,
    #[serde(default = "default_withdrawal_fee")]
    pub withdrawal_fee_percent: f64,

    // Referrals
    #[serde(default = "default_referral_commission")]
    pub referral_commission: f64,

    // KYC payment details shown to users
    #[serde(default = "default_kyc_usdt_amount")]
    pub kyc_usdt_amount: f64,
    #[serde(default)]
    pub usdt_wallet_address: String,
}

fn default_true() -> bool { true }
fn default_min_claim() -> f64 { 1.0 }
fn default_daily_limit() -> f64 { 24.0 }
fn default_min_withdrawal() -> f64 { 10.0 }
fn default_withdrawal_fee() -> f64 { 0.1 }
fn default_referral_commission() -> f64 { 0.1 }
fn default_kyc_usdt_amount() -> f64 { 10.0 }

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            mining_enabled: true,
            withdrawals_enabled: true,
            kyc_enabled: true,
            referral_enabled: true,
            maintenance_mode: false,
            min_claim_amount: default_min_claim(),
            daily_mining_limit_hours: default_daily_limit(),
            min_withdrawal_amount: default_min_withdrawal(),
            withdrawal_fee_percent: default_withdrawal_fee(),
            referral_commission: default_referral_commission(),
            kyc_usdt_amount: default_kyc_usdt_amount(),
            usdt_wallet_address: String::new(),
        }
    }
}

/// Subset of settings exposed on the unauthenticated public endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PublicSettings {
    pub mining_enabled: bool,
    pub withdrawals_enabled: bool,
    pub kyc_enabled: bool,
    pub referral_enabled: bool,
    pub maintenance_mode: bool,
    pub min_withdrawal_amount: f64,
    pub kyc_usdt_amount: f64,
    pub usdt_wallet_address: String,
}

impl PlatformSettings {
    pub fn public(&self) -> PublicSettings {
        PublicSettings {
            mining_enabled: self.mining_enabled,
            withdrawals_enabled: self.withdrawals_enabled,
            kyc_enabled: self.kyc_enabled,
            referral_enabled: self.referral_enabled,
            maintenance_mode: self.maintenance_mode,
            min_withdrawal_amount: self.min_withdrawal_amount,
            kyc_usdt_amount: self.kyc_usdt_amount,
            usdt_wallet_address: self.usdt_wallet_address.clone(),
        }
    }
}
