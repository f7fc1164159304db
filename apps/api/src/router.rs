use std::sync::Arc;

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use notification_cell::router::create_notification_router;
use scheduling_cell::router::create_scheduling_router;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "MedFlow scheduling API is running!" }))
        .route("/api/v1/health", get(health))
        .with_state(state.clone())
        .nest("/api/v1/slots", create_scheduling_router(state.clone()))
        .nest("/api/v1/notifications", create_notification_router(state))
}

/// Liveness plus configuration flags, so deployments can tell a healthy
/// process from one missing its store or gateway settings.
async fn health(State(config): State<Arc<AppConfig>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "medflow-api",
        "store_configured": config.is_configured(),
        "gateway_configured": config.is_gateway_configured(),
    }))
}
