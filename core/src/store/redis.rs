/// Redis-backed platform store.
///
/// Document layout:
/// - `account:{id}`            — account JSON (withdrawals embedded)
/// - `accounts:all`            — set of account ids
/// - `accounts:by_code`        — hash: referral code → account id
/// - `accounts:by_token`       — hash: access token → account id
/// - `accounts:by_ident`       — hash: `u:{username}` / `e:{email}` → id
/// - `accounts:referrals:{id}` — set of ids referred by `{id}`
/// - `platform:settings`       — settings JSON
/// - `news:{id}` / `news:index`— post JSON + zset scored by publish time
///
/// Uses `redis::aio::ConnectionManager` (lazy) for async operations. Every
/// failure surfaces as an opaque `Storage` error; there are no retries.

use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::RwLock;

use crate::account::Account;
use crate::error::PlatformError;
use crate::news::NewsPost;
use crate::settings::PlatformSettings;
use crate::store::PlatformStore;

const SETTINGS_KEY: &str = "platform:settings";
const NEWS_INDEX_KEY: &str = "news:index";

fn store_err(context: &str, e: impl std::fmt::Display) -> PlatformError {
    PlatformError::Storage(format!("{}: {}", context, e))
}

pub struct RedisStore {
    client: redis::Client,
    connection: Arc<RwLock<Option<redis::aio::ConnectionManager>>>,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self, PlatformError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| store_err("Failed to create Redis client", e))?;
        Ok(Self {
            client,
            connection: Arc::new(RwLock::new(None)),
        })
    }

    /// Get async connection (lazy initialization).
    async fn get_connection(&self) -> Result<redis::aio::ConnectionManager, PlatformError> {
        let mut conn_guard = self.connection.write().await;
        if conn_guard.is_none() {
            let manager = self
                .client
                .get_connection_manager()
                .await
                .map_err(|e| store_err("Failed to get connection manager", e))?;
            *conn_guard = Some(manager);
        }
        Ok(conn_guard.clone().unwrap())
    }

    async fn get_account_by_index(
        &self,
        index_key: &str,
        field: &str,
    ) -> Result<Option<Account>, PlatformError> {
        let mut conn = self.get_connection().await?;
        let id: Option<String> = conn
            .hget(index_key, field)
            .await
            .map_err(|e| store_err("Failed to read account index", e))?;
        match id {
            Some(id) => self.get_account(&id).await,
            None => Ok(None),
        }
    }

    async fn fetch_accounts(&self, ids: Vec<String>) -> Result<Vec<Account>, PlatformError> {
        let mut conn = self.get_connection().await?;
        let mut accounts = Vec::with_capacity(ids.len());
        for id in ids {
            let json: Option<String> = conn
                .get(format!("account:{}", id))
                .await
                .map_err(|e| store_err("Failed to load account", e))?;
            if let Some(json) = json {
                match serde_json::from_str::<Account>(&json) {
                    Ok(account) => accounts.push(account),
                    Err(e) => tracing::warn!("Skipping unparseable account {}: {}", id, e),
                }
            }
        }
        Ok(accounts)
    }
}

#[async_trait]
impl PlatformStore for RedisStore {
    async fn ping(&self) -> Result<(), PlatformError> {
        let mut conn = self.get_connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| store_err("Redis ping failed", e))?;
        Ok(())
    }

    async fn insert_account(&self, account: &Account) -> Result<(), PlatformError> {
        let json = serde_json::to_string(account)
            .map_err(|e| store_err("Failed to serialize account", e))?;
        let mut conn = self.get_connection().await?;

        conn.set::<_, _, ()>(format!("account:{}", account.id), json)
            .await
            .map_err(|e| store_err("Failed to store account", e))?;
        conn.sadd::<_, _, ()>("accounts:all", &account.id)
            .await
            .map_err(|e| store_err("Failed to index account", e))?;
        conn.hset::<_, _, _, ()>("accounts:by_code", &account.referral_code, &account.id)
            .await
            .map_err(|e| store_err("Failed to index referral code", e))?;
        conn.hset::<_, _, _, ()>("accounts:by_token", &account.access_token, &account.id)
            .await
            .map_err(|e| store_err("Failed to index access token", e))?;
        conn.hset::<_, _, _, ()>(
            "accounts:by_ident",
            format!("u:{}", account.username),
            &account.id,
        )
        .await
        .map_err(|e| store_err("Failed to index username", e))?;
        conn.hset::<_, _, _, ()>(
            "accounts:by_ident",
            format!("e:{}", account.email),
            &account.id,
        )
        .await
        .map_err(|e| store_err("Failed to index email", e))?;

        if let Some(referrer_id) = &account.referred_by {
            conn.sadd::<_, _, ()>(format!("accounts:referrals:{}", referrer_id), &account.id)
                .await
                .map_err(|e| store_err("Failed to index referral", e))?;
        }

        Ok(())
    }

    async fn get_account(&self, id: &str) -> Result<Option<Account>, PlatformError> {
        let mut conn = self.get_connection().await?;
        let json: Option<String> = conn
            .get(format!("account:{}", id))
            .await
            .map_err(|e| store_err("Failed to load account", e))?;
        match json {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| store_err("Failed to parse account", e)),
            None => Ok(None),
        }
    }

    async fn update_account(&self, account: &Account) -> Result<(), PlatformError> {
        // Referral code, token, and identity are immutable, so the indexes
        // never need rewriting here
        let json = serde_json::to_string(account)
            .map_err(|e| store_err("Failed to serialize account", e))?;
        let mut conn = self.get_connection().await?;
        conn.set::<_, _, ()>(format!("account:{}", account.id), json)
            .await
            .map_err(|e| store_err("Failed to update account", e))?;
        Ok(())
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Account>, PlatformError> {
        self.get_account_by_index("accounts:by_code", code).await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Account>, PlatformError> {
        self.get_account_by_index("accounts:by_token", token).await
    }

    async fn find_by_identity(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<Account>, PlatformError> {
        if let Some(account) = self
            .get_account_by_index("accounts:by_ident", &format!("u:{}", username))
            .await?
        {
            return Ok(Some(account));
        }
        self.get_account_by_index("accounts:by_ident", &format!("e:{}", email))
            .await
    }

    async fn count_referrals(&self, account_id: &str) -> Result<u64, PlatformError> {
        let mut conn = self.get_connection().await?;
        let count: u64 = conn
            .scard(format!("accounts:referrals:{}", account_id))
            .await
            .map_err(|e| store_err("Failed to count referrals", e))?;
        Ok(count)
    }

    async fn list_referrals(&self, account_id: &str) -> Result<Vec<Account>, PlatformError> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = conn
            .smembers(format!("accounts:referrals:{}", account_id))
            .await
            .map_err(|e| store_err("Failed to list referrals", e))?;
        let mut accounts = self.fetch_accounts(ids).await?;
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(accounts)
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, PlatformError> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = conn
            .smembers("accounts:all")
            .await
            .map_err(|e| store_err("Failed to list accounts", e))?;
        let mut accounts = self.fetch_accounts(ids).await?;
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(accounts)
    }

    async fn load_settings(&self) -> Result<PlatformSettings, PlatformError> {
        let mut conn = self.get_connection().await?;
        let json: Option<String> = conn
            .get(SETTINGS_KEY)
            .await
            .map_err(|e| store_err("Failed to load settings", e))?;
        match json {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| store_err("Failed to parse settings", e)),
            None => Ok(PlatformSettings::default()),
        }
    }

    async fn save_settings(&self, settings: &PlatformSettings) -> Result<(), PlatformError> {
        let json = serde_json::to_string(settings)
            .map_err(|e| store_err("Failed to serialize settings", e))?;
        let mut conn = self.get_connection().await?;
        conn.set::<_, _, ()>(SETTINGS_KEY, json)
            .await
            .map_err(|e| store_err("Failed to save settings", e))?;
        Ok(())
    }

    async fn insert_news(&self, post: &NewsPost) -> Result<(), PlatformError> {
        let json = serde_json::to_string(post)
            .map_err(|e| store_err("Failed to serialize news post", e))?;
        let mut conn = self.get_connection().await?;
        conn.set::<_, _, ()>(format!("news:{}", post.id), json)
            .await
            .map_err(|e| store_err("Failed to store news post", e))?;
        let score = post.published_at.unwrap_or(post.created_at).timestamp();
        conn.zadd::<_, _, _, ()>(NEWS_INDEX_KEY, &post.id, score)
            .await
            .map_err(|e| store_err("Failed to index news post", e))?;
        Ok(())
    }

    async fn get_news(&self, id: &str) -> Result<Option<NewsPost>, PlatformError> {
        let mut conn = self.get_connection().await?;
        let json: Option<String> = conn
            .get(format!("news:{}", id))
            .await
            .map_err(|e| store_err("Failed to load news post", e))?;
        match json {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| store_err("Failed to parse news post", e)),
            None => Ok(None),
        }
    }

    async fn update_news(&self, post: &NewsPost) -> Result<(), PlatformError> {
        // Re-insert refreshes both the document and the index score
        self.insert_news(post).await
    }

    async fn delete_news(&self, id: &str) -> Result<bool, PlatformError> {
        let mut conn = self.get_connection().await?;
        let removed: i64 = conn
            .del(format!("news:{}", id))
            .await
            .map_err(|e| store_err("Failed to delete news post", e))?;
        conn.zrem::<_, _, ()>(NEWS_INDEX_KEY, id)
            .await
            .map_err(|e| store_err("Failed to unindex news post", e))?;
        Ok(removed > 0)
    }

    async fn list_news(&self, published_only: bool) -> Result<Vec<NewsPost>, PlatformError> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = conn
            .zrevrange(NEWS_INDEX_KEY, 0, -1)
            .await
            .map_err(|e| store_err("Failed to list news", e))?;

        let mut posts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(post) = self.get_news(&id).await? {
                if !published_only || post.is_published {
                    posts.push(post);
                }
            }
        }
        Ok(posts)
    }
}
