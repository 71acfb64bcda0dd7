pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod storage;

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::Config,
    database::{Database, Ledger, MemoryLedger},
    errors::Result,
    handlers::{accounts, admin, health, jobs, metrics, quota, AppState},
    middleware::OperatorToken,
    services::{AccountService, MetricsService, PolicyHandle, QuotaManager},
    storage::MediaStorage,
};

/// Connects the ledger named by the config and applies migrations.
pub async fn connect_ledger(config: &Config) -> Result<Arc<dyn Ledger>> {
    if config.uses_memory_ledger() {
        tracing::warn!("Using in-memory ledger; state is lost on restart");
        return Ok(Arc::new(MemoryLedger::new()));
    }

    let database = Database::new(&config.database_url, config.database_max_connections).await?;
    database.migrate().await?;
    Ok(Arc::new(database))
}

pub async fn build_state(
    ledger: Arc<dyn Ledger>,
    storage: Arc<dyn MediaStorage>,
    config: Config,
) -> Result<AppState> {
    let metrics = Arc::new(MetricsService::new()?);
    let policy = PolicyHandle::load(ledger.as_ref()).await?;
    let quota = QuotaManager::new(ledger.clone(), metrics.clone());
    let accounts = AccountService::new(
        ledger.clone(),
        storage,
        metrics.clone(),
        config.initial_free_credits,
    );

    let operator_token = config.admin_token.as_deref().map(OperatorToken::new);

    Ok(AppState {
        ledger,
        config,
        operator_token,
        policy,
        quota,
        accounts,
        metrics,
    })
}

pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/account",
            get(accounts::get_account)
                .post(accounts::provision_account)
                .delete(accounts::delete_account),
        )
        .route("/quota", get(quota::get_quota_status))
        .route("/quota/can-generate", get(quota::can_generate))
        .route("/jobs", get(jobs::list_jobs).post(jobs::create_job))
        .route("/jobs/:id", get(jobs::get_job));

    let operator = Router::new()
        .route("/jobs/:id/status", patch(admin::update_job_status))
        .route("/accounts/:id/credits/decrement", post(admin::decrement_credits))
        .route("/accounts/:id/tier", put(admin::set_tier))
        .route(
            "/quota-policy",
            get(admin::get_quota_policy).put(admin::set_quota_policy),
        )
        .route("/quota-policy/reload", post(admin::reload_quota_policy));

    Router::new()
        .route("/health", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/api/v1", api)
        .nest("/admin", operator)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
