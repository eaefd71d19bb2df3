/// Mining Platform service — orchestration over the store
///
/// Ties the pure core (accrual, referral, withdrawal) to the persistence
/// store. Every read-modify-write sequence for an account runs under that
/// account's async mutex (`AccountLocks`), so two concurrent requests for
/// the same account — a stop-mining racing a withdrawal, two withdrawal
/// requests in quick succession — cannot interleave and lose updates. The
/// store itself stays a plain single-document read/write.
///
/// Settings are loaded per operation and passed into the core explicitly.
/// Accrual is always computed on demand from wall-clock deltas; there is no
/// background scheduler. Each public operation has an `_at` variant taking
/// an explicit timestamp so tests can drive a simulated clock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::account::{Account, KycState, KycStatus, WithdrawalRequest, WithdrawalStatus};
use crate::accrual;
use crate::error::PlatformError;
use crate::news::{NewsPost, NewsUpdate};
use crate::referral;
use crate::settings::{PlatformSettings, PublicSettings};
use crate::store::PlatformStore;
use crate::withdrawal::{self, WithdrawalDecision};

// ---------------------------------------------------------------------------
// Per-account serialization
// ---------------------------------------------------------------------------

/// Registry of per-account mutexes. Locks are created on first use and kept
/// for the process lifetime; the guard is held across the whole
/// read-modify-write of one operation.
pub struct AccountLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, account_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(account_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl Default for AccountLocks {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStarted {
    pub accrual_rate: f64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimResult {
    pub earned: f64,
    pub balance: f64,
    pub total_mined: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MiningStatus {
    pub is_mining: bool,
    pub mining_started_at: Option<DateTime<Utc>>,
    /// Live unclaimed earnings of the open session (0 when idle)
    pub current_earnings: f64,
    /// Rate the account is currently entitled to (refreshed from referrals)
    pub accrual_rate: f64,
    /// Frozen rate of the open session, if one is running
    pub session_rate: Option<f64>,
    pub balance: f64,
    pub total_mined: f64,
    pub mining_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferredAccount {
    pub username: String,
    pub joined_at: DateTime<Utc>,
    pub total_mined: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralSummary {
    pub referral_code: String,
    pub referral_count: u64,
    pub referral_earnings: f64,
    pub referral_enabled: bool,
    pub referral_commission: f64,
    pub referred: Vec<ReferredAccount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KycSummary {
    pub status: KycStatus,
    pub tid: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub kyc_enabled: bool,
    pub usdt_amount: f64,
    pub usdt_wallet_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KycDecision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalResolution {
    pub request: WithdrawalRequest,
    /// Owner balance after resolution (restored on rejection)
    pub balance: f64,
}

/// Admin listing row: one account with its derived referral count.
#[derive(Debug, Clone, Serialize)]
pub struct AccountOverview {
    pub id: String,
    pub username: String,
    pub email: String,
    pub balance: f64,
    pub accrual_rate: f64,
    pub is_mining: bool,
    pub total_mined: f64,
    pub kyc_status: KycStatus,
    pub referral_count: u64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Admin review row: a withdrawal request joined with its owner.
#[derive(Debug, Clone, Serialize)]
pub struct AdminWithdrawal {
    pub account_id: String,
    pub username: String,
    pub request: WithdrawalRequest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsDraft {
    pub title: String,
    pub content: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub publish: bool,
}

fn default_category() -> String {
    "general".to_string()
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct MiningPlatform {
    store: Arc<dyn PlatformStore>,
    locks: AccountLocks,
}

impl MiningPlatform {
    pub fn new(store: Arc<dyn PlatformStore>) -> Self {
        Self {
            store,
            locks: AccountLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn PlatformStore> {
        &self.store
    }

    async fn load_account(&self, account_id: &str) -> Result<Account, PlatformError> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or_else(|| PlatformError::NotFound("Account".to_string()))
    }

    // -- Registration -------------------------------------------------------

    pub async fn register(&self, request: RegisterRequest) -> Result<Account, PlatformError> {
        self.register_at(request, Utc::now()).await
    }

    pub async fn register_at(
        &self,
        request: RegisterRequest,
        now: DateTime<Utc>,
    ) -> Result<Account, PlatformError> {
        let username = request.username.trim();
        let email = request.email.trim();

        if let Some(existing) = self.store.find_by_identity(username, email).await? {
            return Err(PlatformError::DuplicateAccount(existing.username));
        }

        // An unknown referral code is ignored: the account is simply created
        // unreferred
        let referrer = match request
            .referral_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
        {
            Some(code) => self.store.find_by_referral_code(code).await?,
            None => None,
        };

        let referral_code = loop {
            let code = crate::account::new_referral_code();
            if self.store.find_by_referral_code(&code).await?.is_none() {
                break code;
            }
        };

        let account = Account::new(
            username,
            email,
            referral_code,
            referrer.as_ref().map(|r| r.id.clone()),
            now,
        );
        self.store.insert_account(&account).await?;

        // Registration side effect: the referrer's stored rate goes up by one
        // bonus, exactly once. Their open session (if any) keeps its frozen
        // rate.
        if let Some(referrer) = referrer {
            let _guard = self.locks.acquire(&referrer.id).await;
            if let Some(mut referrer) = self.store.get_account(&referrer.id).await? {
                referral::apply_referral_bonus(&mut referrer);
                self.store.update_account(&referrer).await?;
                tracing::info!(
                    "🎉 Referral bonus: {} rate +{} (now {})",
                    referrer.username,
                    referral::BONUS_PER_REFERRAL,
                    referrer.accrual_rate
                );
            }
        }

        tracing::info!("👤 Account registered: {}", account.username);
        Ok(account)
    }

    /// Resolve an opaque bearer credential to its account (auth collaborator).
    pub async fn account_by_token(&self, token: &str) -> Result<Option<Account>, PlatformError> {
        self.store.find_by_token(token).await
    }

    // -- Mining sessions ----------------------------------------------------

    pub async fn start_mining(&self, account_id: &str) -> Result<SessionStarted, PlatformError> {
        self.start_mining_at(account_id, Utc::now()).await
    }

    pub async fn start_mining_at(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionStarted, PlatformError> {
        let settings = self.store.load_settings().await?;
        if !settings.mining_enabled {
            return Err(PlatformError::FeatureDisabled("Mining"));
        }

        let _guard = self.locks.acquire(account_id).await;
        let mut account = self.load_account(account_id).await?;

        let referral_count = self.store.count_referrals(account_id).await?;
        let rate = referral::current_rate(referral_count);
        accrual::start_session(&mut account, rate, now)?;
        self.store.update_account(&account).await?;

        tracing::info!("⛏️ Mining started: {} at {} NBX/h", account.username, rate);
        Ok(SessionStarted {
            accrual_rate: rate,
            started_at: now,
        })
    }

    pub async fn stop_mining(&self, account_id: &str) -> Result<ClaimResult, PlatformError> {
        self.stop_mining_at(account_id, Utc::now()).await
    }

    pub async fn stop_mining_at(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimResult, PlatformError> {
        let _guard = self.locks.acquire(account_id).await;
        let mut account = self.load_account(account_id).await?;

        let earned = accrual::stop_session(&mut account, now)?;
        self.store.update_account(&account).await?;

        tracing::info!(
            "💰 Claim settled: {} earned {} NBX (balance {})",
            account.username,
            earned,
            account.balance
        );
        Ok(ClaimResult {
            earned,
            balance: account.balance,
            total_mined: account.total_mined,
        })
    }

    pub async fn mining_status(&self, account_id: &str) -> Result<MiningStatus, PlatformError> {
        self.mining_status_at(account_id, Utc::now()).await
    }

    pub async fn mining_status_at(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<MiningStatus, PlatformError> {
        let settings = self.store.load_settings().await?;

        let _guard = self.locks.acquire(account_id).await;
        let mut account = self.load_account(account_id).await?;

        // Opportunistic refresh of the stored rate. A running session keeps
        // its frozen session_rate regardless.
        let referral_count = self.store.count_referrals(account_id).await?;
        let computed_rate = referral::current_rate(referral_count);
        if account.accrual_rate != computed_rate {
            account.accrual_rate = computed_rate;
            self.store.update_account(&account).await?;
        }

        let current_earnings = accrual::elapsed_earnings(&account, now);
        Ok(MiningStatus {
            is_mining: account.is_mining,
            mining_started_at: account.mining_started_at,
            current_earnings,
            accrual_rate: computed_rate,
            session_rate: account.session_rate,
            balance: account.balance,
            total_mined: account.total_mined,
            mining_enabled: settings.mining_enabled,
        })
    }

    // -- Withdrawals --------------------------------------------------------

    pub async fn request_withdrawal(
        &self,
        account_id: &str,
        amount: f64,
        address: &str,
    ) -> Result<WithdrawalRequest, PlatformError> {
        self.request_withdrawal_at(account_id, amount, address, Utc::now())
            .await
    }

    pub async fn request_withdrawal_at(
        &self,
        account_id: &str,
        amount: f64,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalRequest, PlatformError> {
        let settings = self.store.load_settings().await?;

        let _guard = self.locks.acquire(account_id).await;
        let mut account = self.load_account(account_id).await?;

        let request = withdrawal::request_withdrawal(&mut account, amount, address, &settings, now)?;
        self.store.update_account(&account).await?;

        tracing::info!(
            "🏦 Withdrawal requested: {} amount={} (balance {})",
            account.username,
            request.amount,
            account.balance
        );
        Ok(request)
    }

    pub async fn resolve_withdrawal(
        &self,
        account_id: &str,
        request_id: &str,
        decision: WithdrawalDecision,
    ) -> Result<WithdrawalResolution, PlatformError> {
        self.resolve_withdrawal_at(account_id, request_id, decision, Utc::now())
            .await
    }

    pub async fn resolve_withdrawal_at(
        &self,
        account_id: &str,
        request_id: &str,
        decision: WithdrawalDecision,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalResolution, PlatformError> {
        let _guard = self.locks.acquire(account_id).await;
        let mut account = self.load_account(account_id).await?;

        let request = withdrawal::resolve_withdrawal(&mut account, request_id, decision, now)?;
        self.store.update_account(&account).await?;

        tracing::info!(
            "🏦 Withdrawal {:?}: {} amount={} (balance {})",
            request.status,
            account.username,
            request.amount,
            account.balance
        );
        Ok(WithdrawalResolution {
            request,
            balance: account.balance,
        })
    }

    /// Owner's withdrawal history, newest first.
    pub async fn withdrawal_history(
        &self,
        account_id: &str,
    ) -> Result<Vec<WithdrawalRequest>, PlatformError> {
        let account = self.load_account(account_id).await?;
        let mut history = account.withdrawals;
        history.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(history)
    }

    /// Admin review listing across all accounts, optionally filtered by
    /// status, newest first.
    pub async fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
    ) -> Result<Vec<AdminWithdrawal>, PlatformError> {
        let accounts = self.store.list_accounts().await?;
        let mut rows: Vec<AdminWithdrawal> = Vec::new();
        for account in accounts {
            for request in &account.withdrawals {
                if status.map_or(true, |s| request.status == s) {
                    rows.push(AdminWithdrawal {
                        account_id: account.id.clone(),
                        username: account.username.clone(),
                        request: request.clone(),
                    });
                }
            }
        }
        rows.sort_by(|a, b| b.request.requested_at.cmp(&a.request.requested_at));
        Ok(rows)
    }

    // -- Referrals ----------------------------------------------------------

    pub async fn referral_summary(
        &self,
        account_id: &str,
    ) -> Result<ReferralSummary, PlatformError> {
        let settings = self.store.load_settings().await?;
        let account = self.load_account(account_id).await?;
        let referral_count = self.store.count_referrals(account_id).await?;
        let referred = self
            .store
            .list_referrals(account_id)
            .await?
            .into_iter()
            .map(|a| ReferredAccount {
                username: a.username,
                joined_at: a.created_at,
                total_mined: a.total_mined,
            })
            .collect();

        Ok(ReferralSummary {
            referral_code: account.referral_code,
            referral_count,
            referral_earnings: account.referral_earnings,
            referral_enabled: settings.referral_enabled,
            referral_commission: settings.referral_commission,
            referred,
        })
    }

    // -- KYC ----------------------------------------------------------------

    pub async fn submit_kyc(
        &self,
        account_id: &str,
        tid: &str,
    ) -> Result<KycSummary, PlatformError> {
        self.submit_kyc_at(account_id, tid, Utc::now()).await
    }

    pub async fn submit_kyc_at(
        &self,
        account_id: &str,
        tid: &str,
        now: DateTime<Utc>,
    ) -> Result<KycSummary, PlatformError> {
        let settings = self.store.load_settings().await?;
        if !settings.kyc_enabled {
            return Err(PlatformError::FeatureDisabled("KYC submissions"));
        }

        let _guard = self.locks.acquire(account_id).await;
        let mut account = self.load_account(account_id).await?;

        if account.kyc.status == KycStatus::Approved {
            return Err(PlatformError::KycAlreadyApproved);
        }

        account.kyc = KycState {
            status: KycStatus::Pending,
            tid: Some(tid.trim().to_string()),
            submitted_at: Some(now),
            rejection_reason: None,
        };
        self.store.update_account(&account).await?;

        tracing::info!("🪪 KYC submitted: {}", account.username);
        Ok(kyc_summary(&account, &settings))
    }

    pub async fn kyc_summary(&self, account_id: &str) -> Result<KycSummary, PlatformError> {
        let settings = self.store.load_settings().await?;
        let account = self.load_account(account_id).await?;
        Ok(kyc_summary(&account, &settings))
    }

    pub async fn review_kyc(
        &self,
        account_id: &str,
        decision: KycDecision,
        rejection_reason: Option<String>,
    ) -> Result<KycStatus, PlatformError> {
        let _guard = self.locks.acquire(account_id).await;
        let mut account = self.load_account(account_id).await?;

        account.kyc.status = match decision {
            KycDecision::Approved => KycStatus::Approved,
            KycDecision::Rejected => KycStatus::Rejected,
        };
        account.kyc.rejection_reason = match decision {
            KycDecision::Rejected => rejection_reason,
            KycDecision::Approved => None,
        };
        self.store.update_account(&account).await?;

        tracing::info!("🪪 KYC {:?}: {}", account.kyc.status, account.username);
        Ok(account.kyc.status)
    }

    // -- Settings -----------------------------------------------------------

    pub async fn get_settings(&self) -> Result<PlatformSettings, PlatformError> {
        self.store.load_settings().await
    }

    pub async fn public_settings(&self) -> Result<PublicSettings, PlatformError> {
        Ok(self.store.load_settings().await?.public())
    }

    pub async fn update_settings(
        &self,
        settings: PlatformSettings,
    ) -> Result<PlatformSettings, PlatformError> {
        self.store.save_settings(&settings).await?;
        tracing::info!("⚙️ Platform settings updated");
        Ok(settings)
    }

    // -- News ---------------------------------------------------------------

    pub async fn publish_news(&self, draft: NewsDraft) -> Result<NewsPost, PlatformError> {
        self.publish_news_at(draft, Utc::now()).await
    }

    pub async fn publish_news_at(
        &self,
        draft: NewsDraft,
        now: DateTime<Utc>,
    ) -> Result<NewsPost, PlatformError> {
        let post = NewsPost::new(&draft.title, &draft.content, &draft.category, draft.publish, now);
        self.store.insert_news(&post).await?;
        Ok(post)
    }

    pub async fn edit_news(
        &self,
        id: &str,
        update: NewsUpdate,
    ) -> Result<NewsPost, PlatformError> {
        self.edit_news_at(id, update, Utc::now()).await
    }

    pub async fn edit_news_at(
        &self,
        id: &str,
        update: NewsUpdate,
        now: DateTime<Utc>,
    ) -> Result<NewsPost, PlatformError> {
        let mut post = self
            .store
            .get_news(id)
            .await?
            .ok_or_else(|| PlatformError::NotFound("News post".to_string()))?;
        post.apply(update, now);
        self.store.update_news(&post).await?;
        Ok(post)
    }

    pub async fn remove_news(&self, id: &str) -> Result<(), PlatformError> {
        if !self.store.delete_news(id).await? {
            return Err(PlatformError::NotFound("News post".to_string()));
        }
        Ok(())
    }

    /// Public read: published posts only; bumps the view counter.
    pub async fn read_news(&self, id: &str) -> Result<NewsPost, PlatformError> {
        let mut post = self
            .store
            .get_news(id)
            .await?
            .filter(|p| p.is_published)
            .ok_or_else(|| PlatformError::NotFound("News post".to_string()))?;
        post.views += 1;
        self.store.update_news(&post).await?;
        Ok(post)
    }

    pub async fn list_news(&self, published_only: bool) -> Result<Vec<NewsPost>, PlatformError> {
        self.store.list_news(published_only).await
    }

    // -- Admin account management -------------------------------------------

    pub async fn account_overviews(&self) -> Result<Vec<AccountOverview>, PlatformError> {
        let accounts = self.store.list_accounts().await?;
        let mut overviews = Vec::with_capacity(accounts.len());
        for account in accounts {
            let referral_count = self.store.count_referrals(&account.id).await?;
            overviews.push(AccountOverview {
                id: account.id,
                username: account.username,
                email: account.email,
                balance: account.balance,
                accrual_rate: account.accrual_rate,
                is_mining: account.is_mining,
                total_mined: account.total_mined,
                kyc_status: account.kyc.status,
                referral_count,
                is_active: account.is_active,
                created_at: account.created_at,
            });
        }
        Ok(overviews)
    }

    pub async fn set_account_active(
        &self,
        account_id: &str,
        is_active: bool,
    ) -> Result<(), PlatformError> {
        let _guard = self.locks.acquire(account_id).await;
        let mut account = self.load_account(account_id).await?;
        account.is_active = is_active;
        self.store.update_account(&account).await?;
        tracing::info!(
            "👤 Account {}: {}",
            if is_active { "enabled" } else { "disabled" },
            account.username
        );
        Ok(())
    }
}

fn kyc_summary(account: &Account, settings: &PlatformSettings) -> KycSummary {
    KycSummary {
        status: account.kyc.status,
        tid: account.kyc.tid.clone(),
        submitted_at: account.kyc.submitted_at,
        rejection_reason: account.kyc.rejection_reason.clone(),
        kyc_enabled: settings.kyc_enabled,
        usdt_amount: settings.kyc_usdt_amount,
        usdt_wallet_address: settings.usdt_wallet_address.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
