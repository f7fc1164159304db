use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;

use crate::handlers;

pub fn create_notification_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/schedule", post(handlers::schedule_notifications))
        .route(
            "/appointments/{appointment_id}/cancel",
            post(handlers::cancel_notifications),
        )
        .route(
            "/appointments/{appointment_id}/reschedule",
            post(handlers::reschedule_notifications),
        )
        .route(
            "/appointments/{appointment_id}/jobs",
            get(handlers::get_appointment_jobs),
        )
        .route("/jobs/{job_id}", get(handlers::get_job))
        .route("/execute-pending", post(handlers::execute_pending))
        .with_state(state)
}
