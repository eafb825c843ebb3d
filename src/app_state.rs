use std::sync::Arc;

use crate::{config::Config, db::DbPool, gateway::PaymentGateway, notify::NotificationClient};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub http_client: reqwest::Client,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<NotificationClient>,
    pub config: Arc<Config>,
}
