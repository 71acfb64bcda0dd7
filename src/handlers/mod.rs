use std::sync::Arc;

use crate::{
    config::Config,
    database::Ledger,
    middleware::OperatorToken,
    services::{AccountService, MetricsService, PolicyHandle, QuotaManager},
};

pub mod accounts;
pub mod admin;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod quota;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn Ledger>,
    pub config: Config,
    pub operator_token: Option<OperatorToken>,
    pub policy: PolicyHandle,
    pub quota: QuotaManager,
    pub accounts: AccountService,
    pub metrics: Arc<MetricsService>,
}
