/// Platform persistence — document-style storage for accounts, settings, news
///
/// The store is the only collaborator the core mutates through. It offers
/// find-by-id, find-by-referral-code, find-by-token, and update-by-id over
/// whole account documents (withdrawal requests ride along embedded in the
/// account). Two implementations:
///
/// - `MemoryStore` — in-process maps; used by tests and single-node dev runs
/// - `RedisStore`  — JSON documents + index hashes (see `redis.rs`)

pub mod redis;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::account::Account;
use crate::error::PlatformError;
use crate::news::NewsPost;
use crate::settings::PlatformSettings;

pub use self::redis::RedisStore;

#[async_trait]
pub trait PlatformStore: Send + Sync {
    /// Liveness probe for health reporting.
    async fn ping(&self) -> Result<(), PlatformError>;

    // -- Accounts -----------------------------------------------------------

    async fn insert_account(&self, account: &Account) -> Result<(), PlatformError>;
    async fn get_account(&self, id: &str) -> Result<Option<Account>, PlatformError>;
    async fn update_account(&self, account: &Account) -> Result<(), PlatformError>;
    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Account>, PlatformError>;
    async fn find_by_token(&self, token: &str) -> Result<Option<Account>, PlatformError>;
    /// Match on username OR email (duplicate-registration check).
    async fn find_by_identity(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<Account>, PlatformError>;
    /// Count of accounts whose `referred_by` points at `account_id`.
    async fn count_referrals(&self, account_id: &str) -> Result<u64, PlatformError>;
    async fn list_referrals(&self, account_id: &str) -> Result<Vec<Account>, PlatformError>;
    async fn list_accounts(&self) -> Result<Vec<Account>, PlatformError>;

    // -- Settings -----------------------------------------------------------

    async fn load_settings(&self) -> Result<PlatformSettings, PlatformError>;
    async fn save_settings(&self, settings: &PlatformSettings) -> Result<(), PlatformError>;

    // -- News ---------------------------------------------------------------

    async fn insert_news(&self, post: &NewsPost) -> Result<(), PlatformError>;
    async fn get_news(&self, id: &str) -> Result<Option<NewsPost>, PlatformError>;
    async fn update_news(&self, post: &NewsPost) -> Result<(), PlatformError>;
    async fn delete_news(&self, id: &str) -> Result<bool, PlatformError>;
    /// Newest first (by publish time, then creation time).
    async fn list_news(&self, published_only: bool) -> Result<Vec<NewsPost>, PlatformError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

pub struct MemoryStore {
    accounts: RwLock<HashMap<String, Account>>,
    settings: RwLock<PlatformSettings>,
    news: RwLock<HashMap<String, NewsPost>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            settings: RwLock::new(PlatformSettings::default()),
            news: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_news(mut posts: Vec<NewsPost>) -> Vec<NewsPost> {
    posts.sort_by(|a, b| {
        let a_key = a.published_at.unwrap_or(a.created_at);
        let b_key = b.published_at.unwrap_or(b.created_at);
        b_key.cmp(&a_key)
    });
    posts
}

#[async_trait]
impl PlatformStore for MemoryStore {
    async fn ping(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn insert_account(&self, account: &Account) -> Result<(), PlatformError> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn get_account(&self, id: &str) -> Result<Option<Account>, PlatformError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(id).cloned())
    }

    async fn update_account(&self, account: &Account) -> Result<(), PlatformError> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Account>, PlatformError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| a.referral_code == code).cloned())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Account>, PlatformError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| a.access_token == token).cloned())
    }

    async fn find_by_identity(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<Account>, PlatformError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.username == username || a.email == email)
            .cloned())
    }

    async fn count_referrals(&self, account_id: &str) -> Result<u64, PlatformError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .filter(|a| a.referred_by.as_deref() == Some(account_id))
            .count() as u64)
    }

    async fn list_referrals(&self, account_id: &str) -> Result<Vec<Account>, PlatformError> {
        let accounts = self.accounts.read().await;
        let mut referred: Vec<Account> = accounts
            .values()
            .filter(|a| a.referred_by.as_deref() == Some(account_id))
            .cloned()
            .collect();
        referred.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(referred)
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, PlatformError> {
        let accounts = self.accounts.read().await;
        let mut all: Vec<Account> = accounts.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn load_settings(&self) -> Result<PlatformSettings, PlatformError> {
        Ok(self.settings.read().await.clone())
    }

    async fn save_settings(&self, settings: &PlatformSettings) -> Result<(), PlatformError> {
        *self.settings.write().await = settings.clone();
        Ok(())
    }

    async fn insert_news(&self, post: &NewsPost) -> Result<(), PlatformError> {
        let mut news = self.news.write().await;
        news.insert(post.id.clone(), post.clone());
        Ok(())
    }

    async fn get_news(&self, id: &str) -> Result<Option<NewsPost>, PlatformError> {
        let news = self.news.read().await;
        Ok(news.get(id).cloned())
    }

    async fn update_news(&self, post: &NewsPost) -> Result<(), PlatformError> {
        let mut news = self.news.write().await;
        news.insert(post.id.clone(), post.clone());
        Ok(())
    }

    async fn delete_news(&self, id: &str) -> Result<bool, PlatformError> {
        let mut news = self.news.write().await;
        Ok(news.remove(id).is_some())
    }

    async fn list_news(&self, published_only: bool) -> Result<Vec<NewsPost>, PlatformError> {
        let news = self.news.read().await;
        let posts: Vec<NewsPost> = news
            .values()
            .filter(|p| !published_only || p.is_published)
            .cloned()
            .collect();
        Ok(sort_news(posts))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::new_referral_code;
    use chrono::Utc;

    fn account(username: &str, referred_by: Option<&str>) -> Account {
        Account::new(
            username,
            &format!("{}@example.com", username),
            new_referral_code(),
            referred_by.map(str::to_string),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_account_round_trip() {
        let store = MemoryStore::new();
        let mut acct = account("alice", None);
        store.insert_account(&acct).await.unwrap();

        let loaded = store.get_account(&acct.id).await.unwrap().unwrap();
        assert_eq!(loaded.username, "alice");

        acct.credit(42.0);
        store.update_account(&acct).await.unwrap();
        let loaded = store.get_account(&acct.id).await.unwrap().unwrap();
        assert_eq!(loaded.balance, 42.0);
    }

    #[tokio::test]
    async fn test_lookup_indexes() {
        let store = MemoryStore::new();
        let acct = account("alice", None);
        store.insert_account(&acct).await.unwrap();

        assert!(store
            .find_by_referral_code(&acct.referral_code)
            .await
            .unwrap()
            .is_some());
        assert!(store.find_by_token(&acct.access_token).await.unwrap().is_some());
        assert!(store
            .find_by_identity("alice", "nobody@example.com")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_by_identity("nobody", "alice@example.com")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_by_identity("nobody", "nobody@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_referral_counting() {
        let store = MemoryStore::new();
        let referrer = account("referrer", None);
        store.insert_account(&referrer).await.unwrap();
        assert_eq!(store.count_referrals(&referrer.id).await.unwrap(), 0);

        for i in 0..3 {
            let referred = account(&format!("user{}", i), Some(&referrer.id));
            store.insert_account(&referred).await.unwrap();
        }
        assert_eq!(store.count_referrals(&referrer.id).await.unwrap(), 3);
        assert_eq!(store.list_referrals(&referrer.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let store = MemoryStore::new();
        let mut settings = store.load_settings().await.unwrap();
        assert!(settings.mining_enabled);

        settings.mining_enabled = false;
        settings.min_withdrawal_amount = 25.0;
        store.save_settings(&settings).await.unwrap();

        let loaded = store.load_settings().await.unwrap();
        assert!(!loaded.mining_enabled);
        assert_eq!(loaded.min_withdrawal_amount, 25.0);
    }

    #[tokio::test]
    async fn test_news_listing_filters_drafts() {
        let store = MemoryStore::new();
        let published = NewsPost::new("Live", "body", "general", true, Utc::now());
        let draft = NewsPost::new("Draft", "body", "general", false, Utc::now());
        store.insert_news(&published).await.unwrap();
        store.insert_news(&draft).await.unwrap();

        assert_eq!(store.list_news(true).await.unwrap().len(), 1);
        assert_eq!(store.list_news(false).await.unwrap().len(), 2);

        assert!(store.delete_news(&draft.id).await.unwrap());
        assert!(!store.delete_news(&draft.id).await.unwrap());
    }
}
