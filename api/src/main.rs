// Nimbus API — cloud mining rewards platform HTTP service
//
// User surface: register, mining start/stop/status, wallet + withdrawals,
// referrals, KYC, news.
// Admin console: account review, withdrawal approval, KYC review, platform
// settings, news publishing.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use nimbus_api::auth::{self, AuthedAccount};
use nimbus_api::config::Config;
use nimbus_api::metrics::prometheus as metrics;
use nimbus_api::ApiState;
use nimbus_core::account::WithdrawalStatus;
use nimbus_core::error::PlatformError;
use nimbus_core::news::NewsUpdate;
use nimbus_core::platform::{KycDecision, MiningPlatform, NewsDraft, RegisterRequest};
use nimbus_core::settings::PlatformSettings;
use nimbus_core::store::{MemoryStore, PlatformStore, RedisStore};
use nimbus_core::withdrawal::WithdrawalDecision;

type ApiResult = Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)>;

fn api_error(e: PlatformError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &e {
        PlatformError::NotFound(_) => StatusCode::NOT_FOUND,
        PlatformError::Storage(_) => {
            metrics::inc_storage_errors();
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(json!({"ok": false, "error": e.to_string()})))
}

fn bad_request(message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({"ok": false, "error": message})))
}

// ─── Public handlers ───

async fn api_health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let store_ok = state.platform.store().ping().await.is_ok();
    metrics::set_store_up(store_ok);
    Json(json!({"status": "ok", "store": store_ok}))
}

async fn api_info(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let uptime_secs = Utc::now().timestamp().saturating_sub(state.start_time);
    Json(json!({
        "name": "Nimbus API",
        "version": "1.3.0",
        "uptime_secs": uptime_secs,
        "listen": state.listen,
    }))
}

async fn api_metrics() -> impl IntoResponse {
    let body = metrics::render();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

async fn api_register(
    State(state): State<ApiState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult {
    if body.username.trim().is_empty() {
        return Err(bad_request("Username is required"));
    }
    if body.email.trim().is_empty() || !body.email.contains('@') {
        return Err(bad_request("A valid email is required"));
    }

    let account = state.platform.register(body).await.map_err(api_error)?;
    metrics::inc_accounts_registered();
    Ok(Json(json!({
        "ok": true,
        "message": "Registration successful",
        "account": {
            "id": account.id,
            "username": account.username,
            "email": account.email,
            "referral_code": account.referral_code,
            "access_token": account.access_token,
        }
    })))
}

async fn api_public_settings(State(state): State<ApiState>) -> ApiResult {
    let settings = state.platform.public_settings().await.map_err(api_error)?;
    Ok(Json(json!({"ok": true, "settings": settings})))
}

#[derive(Deserialize)]
struct NewsListParams {
    page: Option<usize>,
    limit: Option<usize>,
    category: Option<String>,
}

async fn api_news_list(
    Query(params): Query<NewsListParams>,
    State(state): State<ApiState>,
) -> ApiResult {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(10).clamp(1, 50);

    let mut posts = state.platform.list_news(true).await.map_err(api_error)?;
    if let Some(category) = &params.category {
        posts.retain(|p| &p.category == category);
    }
    let total = posts.len();
    let pages = total.div_ceil(limit);
    let page_posts: Vec<_> = posts
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .collect();

    Ok(Json(json!({
        "ok": true,
        "news": page_posts,
        "pagination": {"current": page, "pages": pages, "total": total},
    })))
}

async fn api_news_get(Path(id): Path<String>, State(state): State<ApiState>) -> ApiResult {
    let post = state.platform.read_news(&id).await.map_err(api_error)?;
    Ok(Json(json!({"ok": true, "post": post})))
}

// ─── User handlers ───

async fn api_mining_status(
    State(state): State<ApiState>,
    AuthedAccount(account): AuthedAccount,
) -> ApiResult {
    let status = state
        .platform
        .mining_status(&account.id)
        .await
        .map_err(api_error)?;
    Ok(Json(json!({"ok": true, "mining": status})))
}

async fn api_mining_start(
    State(state): State<ApiState>,
    AuthedAccount(account): AuthedAccount,
) -> ApiResult {
    let started = state
        .platform
        .start_mining(&account.id)
        .await
        .map_err(api_error)?;
    metrics::inc_sessions_started();
    Ok(Json(json!({
        "ok": true,
        "message": "Mining started",
        "accrual_rate": started.accrual_rate,
        "started_at": started.started_at,
    })))
}

async fn api_mining_stop(
    State(state): State<ApiState>,
    AuthedAccount(account): AuthedAccount,
) -> ApiResult {
    let claim = state
        .platform
        .stop_mining(&account.id)
        .await
        .map_err(api_error)?;
    metrics::inc_sessions_stopped();
    metrics::add_nbx_claimed(claim.earned);
    Ok(Json(json!({
        "ok": true,
        "message": "Mining stopped",
        "earned": claim.earned,
        "balance": claim.balance,
        "total_mined": claim.total_mined,
    })))
}

async fn api_wallet_balance(AuthedAccount(account): AuthedAccount) -> ApiResult {
    Ok(Json(json!({
        "ok": true,
        "balance": account.balance,
        "total_mined": account.total_mined,
        "referral_earnings": account.referral_earnings,
    })))
}

#[derive(Deserialize)]
struct WithdrawBody {
    amount: f64,
    address: String,
}

async fn api_wallet_withdraw(
    State(state): State<ApiState>,
    AuthedAccount(account): AuthedAccount,
    Json(body): Json<WithdrawBody>,
) -> ApiResult {
    let request = state
        .platform
        .request_withdrawal(&account.id, body.amount, &body.address)
        .await
        .map_err(api_error)?;
    metrics::inc_withdrawals_requested();
    Ok(Json(json!({
        "ok": true,
        "message": "Withdrawal request submitted",
        "request": request,
    })))
}

async fn api_wallet_withdrawals(
    State(state): State<ApiState>,
    AuthedAccount(account): AuthedAccount,
) -> ApiResult {
    let history = state
        .platform
        .withdrawal_history(&account.id)
        .await
        .map_err(api_error)?;
    Ok(Json(json!({"ok": true, "withdrawals": history})))
}

async fn api_referral_info(
    State(state): State<ApiState>,
    AuthedAccount(account): AuthedAccount,
) -> ApiResult {
    let summary = state
        .platform
        .referral_summary(&account.id)
        .await
        .map_err(api_error)?;
    Ok(Json(json!({"ok": true, "referral": summary})))
}

#[derive(Deserialize)]
struct KycSubmitBody {
    tid: String,
}

async fn api_kyc_submit(
    State(state): State<ApiState>,
    AuthedAccount(account): AuthedAccount,
    Json(body): Json<KycSubmitBody>,
) -> ApiResult {
    if body.tid.trim().is_empty() {
        return Err(bad_request("Transaction ID is required"));
    }
    let summary = state
        .platform
        .submit_kyc(&account.id, &body.tid)
        .await
        .map_err(api_error)?;
    metrics::inc_kyc_submissions();
    Ok(Json(json!({"ok": true, "message": "KYC submitted", "kyc": summary})))
}

async fn api_kyc_status(
    State(state): State<ApiState>,
    AuthedAccount(account): AuthedAccount,
) -> ApiResult {
    let summary = state
        .platform
        .kyc_summary(&account.id)
        .await
        .map_err(api_error)?;
    Ok(Json(json!({"ok": true, "kyc": summary})))
}

// ─── Admin handlers ───

async fn api_admin_accounts(State(state): State<ApiState>) -> ApiResult {
    let accounts = state.platform.account_overviews().await.map_err(api_error)?;
    Ok(Json(json!({"ok": true, "count": accounts.len(), "accounts": accounts})))
}

#[derive(Deserialize)]
struct AccountStatusBody {
    is_active: bool,
}

async fn api_admin_account_status(
    Path(account_id): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<AccountStatusBody>,
) -> ApiResult {
    state
        .platform
        .set_account_active(&account_id, body.is_active)
        .await
        .map_err(api_error)?;
    Ok(Json(json!({"ok": true, "is_active": body.is_active})))
}

#[derive(Deserialize)]
struct WithdrawalListParams {
    status: Option<String>,
}

fn parse_status(raw: &str) -> Result<WithdrawalStatus, (StatusCode, Json<serde_json::Value>)> {
    match raw {
        "pending" => Ok(WithdrawalStatus::Pending),
        "approved" => Ok(WithdrawalStatus::Approved),
        "rejected" => Ok(WithdrawalStatus::Rejected),
        _ => Err(bad_request("status must be pending, approved, or rejected")),
    }
}

async fn api_admin_withdrawals(
    Query(params): Query<WithdrawalListParams>,
    State(state): State<ApiState>,
) -> ApiResult {
    let status = match params.status.as_deref() {
        Some(raw) => Some(parse_status(raw)?),
        None => None,
    };
    let withdrawals = state
        .platform
        .list_withdrawals(status)
        .await
        .map_err(api_error)?;
    Ok(Json(json!({
        "ok": true,
        "count": withdrawals.len(),
        "withdrawals": withdrawals,
    })))
}

#[derive(Deserialize)]
struct ResolveBody {
    decision: WithdrawalDecision,
}

async fn api_admin_resolve_withdrawal(
    Path((account_id, request_id)): Path<(String, String)>,
    State(state): State<ApiState>,
    Json(body): Json<ResolveBody>,
) -> ApiResult {
    let resolution = state
        .platform
        .resolve_withdrawal(&account_id, &request_id, body.decision)
        .await
        .map_err(api_error)?;
    match body.decision {
        WithdrawalDecision::Approved => metrics::inc_withdrawals_approved(),
        WithdrawalDecision::Rejected => metrics::inc_withdrawals_rejected(),
    }
    Ok(Json(json!({
        "ok": true,
        "request": resolution.request,
        "balance": resolution.balance,
    })))
}

#[derive(Deserialize)]
struct KycReviewBody {
    decision: KycDecision,
    #[serde(default)]
    rejection_reason: Option<String>,
}

async fn api_admin_kyc_review(
    Path(account_id): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<KycReviewBody>,
) -> ApiResult {
    let status = state
        .platform
        .review_kyc(&account_id, body.decision, body.rejection_reason)
        .await
        .map_err(api_error)?;
    Ok(Json(json!({"ok": true, "kyc_status": status})))
}

async fn api_admin_settings_get(State(state): State<ApiState>) -> ApiResult {
    let settings = state.platform.get_settings().await.map_err(api_error)?;
    Ok(Json(json!({"ok": true, "settings": settings})))
}

async fn api_admin_settings_put(
    State(state): State<ApiState>,
    Json(settings): Json<PlatformSettings>,
) -> ApiResult {
    let settings = state
        .platform
        .update_settings(settings)
        .await
        .map_err(api_error)?;
    Ok(Json(json!({"ok": true, "settings": settings})))
}

async fn api_admin_news_list(State(state): State<ApiState>) -> ApiResult {
    let posts = state.platform.list_news(false).await.map_err(api_error)?;
    Ok(Json(json!({"ok": true, "count": posts.len(), "news": posts})))
}

async fn api_admin_news_create(
    State(state): State<ApiState>,
    Json(draft): Json<NewsDraft>,
) -> ApiResult {
    if draft.title.trim().is_empty() {
        return Err(bad_request("Title is required"));
    }
    let post = state.platform.publish_news(draft).await.map_err(api_error)?;
    Ok(Json(json!({"ok": true, "post": post})))
}

async fn api_admin_news_update(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(update): Json<NewsUpdate>,
) -> ApiResult {
    let post = state.platform.edit_news(&id, update).await.map_err(api_error)?;
    Ok(Json(json!({"ok": true, "post": post})))
}

async fn api_admin_news_delete(Path(id): Path<String>, State(state): State<ApiState>) -> ApiResult {
    state.platform.remove_news(&id).await.map_err(api_error)?;
    Ok(Json(json!({"ok": true, "message": "News post deleted"})))
}

// ─── Main ───

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    println!("🚀 Nimbus API v1.3.0 — cloud mining rewards platform");
    let cfg = Config::load();

    let store: Arc<dyn PlatformStore> = if cfg.redis_url.is_empty() {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(RedisStore::new(&cfg.redis_url).expect("redis store"))
    };
    let platform = Arc::new(MiningPlatform::new(store));

    // Seed the settings document so the admin console always has one to edit
    match platform.get_settings().await {
        Ok(settings) => {
            if let Err(e) = platform.update_settings(settings).await {
                tracing::warn!("Failed to seed settings document: {}", e);
            }
        }
        Err(e) => tracing::warn!("Failed to load settings: {}", e),
    }

    let state = ApiState {
        platform: platform.clone(),
        start_time: Utc::now().timestamp(),
        listen: cfg.listen.clone(),
    };

    // Background store-liveness sampler
    {
        let platform = platform.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            loop {
                interval.tick().await;
                metrics::set_store_up(platform.store().ping().await.is_ok());
            }
        });
    }

    let admin = axum::Router::new()
        .route("/accounts", get(api_admin_accounts))
        .route("/accounts/:account_id/status", put(api_admin_account_status))
        .route("/withdrawals", get(api_admin_withdrawals))
        .route(
            "/withdrawals/:account_id/:request_id",
            put(api_admin_resolve_withdrawal),
        )
        .route("/kyc/:account_id/review", put(api_admin_kyc_review))
        .route("/settings", get(api_admin_settings_get).put(api_admin_settings_put))
        .route("/news", get(api_admin_news_list).post(api_admin_news_create))
        .route("/news/:id", put(api_admin_news_update).delete(api_admin_news_delete))
        .route_layer(middleware::from_fn(auth::require_admin_token));

    let api = axum::Router::new()
        .route("/health", get(api_health))
        .route("/info", get(api_info))
        .route("/metrics", get(api_metrics))
        .route("/api/auth/register", post(api_register))
        .route("/api/settings/public", get(api_public_settings))
        .route("/api/news", get(api_news_list))
        .route("/api/news/:id", get(api_news_get))
        .route("/api/mining/status", get(api_mining_status))
        .route("/api/mining/start", post(api_mining_start))
        .route("/api/mining/stop", post(api_mining_stop))
        .route("/api/wallet/balance", get(api_wallet_balance))
        .route("/api/wallet/withdraw", post(api_wallet_withdraw))
        .route("/api/wallet/withdrawals", get(api_wallet_withdrawals))
        .route("/api/referral/info", get(api_referral_info))
        .route("/api/kyc/submit", post(api_kyc_submit))
        .route("/api/kyc/status", get(api_kyc_status))
        .nest("/api/admin", admin)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.listen).await.unwrap();

    // Graceful shutdown (cross-platform: ctrl_c + SIGTERM on Unix)
    let shutdown_signal = async {
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler");
            let ctrl_c = tokio::signal::ctrl_c();
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("SIGTERM — shutting down"),
                _ = ctrl_c => tracing::info!("SIGINT — shutting down"),
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.expect("Failed to register Ctrl+C handler");
            tracing::info!("Ctrl+C — shutting down");
        }
    };

    tracing::info!("📡 Nimbus API listening on {}", cfg.listen);
    axum::serve(listener, api)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .unwrap();

    tracing::info!("🏁 Nimbus API shut down cleanly");
}
