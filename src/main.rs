use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use mealdrop_orderservice::{
    app_state::AppState,
    bootstrap, config, db,
    gateway::gateway_for,
    notify::NotificationClient,
    routes, swagger,
};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_tracing();
    bootstrap::init_env();

    let config = Arc::new(config::load()?);
    let db_pool = db::connect(&config.database.url).await?;
    let http_client = reqwest::Client::new();

    let state = AppState {
        db_pool,
        http_client: http_client.clone(),
        gateway: gateway_for(&config.gateway),
        notifier: Arc::new(NotificationClient::new(http_client, &config.notify)),
        config: config.clone(),
    };

    let routes = routes::orders::routes_with_openapi()
        .merge(routes::deliveries::routes_with_openapi(state.clone()))
        .merge(routes::payments::routes_with_openapi(state.clone()));

    let mut openapi = routes.get_openapi().clone();
    openapi.info = utoipa::openapi::InfoBuilder::new()
        .title("Mealdrop OrderService API")
        .version("1.0.0")
        .build();
    let swagger_ui = swagger::create_swagger_ui(openapi)?;

    let app = Router::new()
        .merge(routes)
        .merge(swagger_ui)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    bootstrap::serve("OrderService", app, &config.server.bind_addr).await
}
