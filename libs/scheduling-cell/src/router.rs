use std::sync::Arc;

use axum::{routing::post, Router};

use shared_config::AppConfig;

use crate::handlers::suggest_slots;

pub fn create_scheduling_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/suggest", post(suggest_slots))
        .with_state(state)
}
