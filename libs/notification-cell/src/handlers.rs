use std::sync::{Arc, OnceLock};

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::error::NotificationError;
use crate::models::{
    ExecutionSummary, NotificationJob, RescheduleNotificationsRequest,
    ScheduleNotificationsRequest,
};
use crate::services::dispatch::{
    CachingPreferenceResolver, GatewayChannel, NotificationChannel, PreferenceResolver,
    RestPreferenceResolver,
};
use crate::services::executor::NotificationExecutorService;
use crate::services::scheduler::NotificationSchedulerService;
use crate::store::{InMemoryJobStore, JobStore, RestJobStore};

// Fallback store for deployments without a configured document store; shared
// across requests so jobs survive between calls within the process.
static MEMORY_STORE: OnceLock<Arc<InMemoryJobStore>> = OnceLock::new();

fn job_store(config: &AppConfig) -> Arc<dyn JobStore> {
    if config.is_configured() {
        Arc::new(RestJobStore::new(config))
    } else {
        MEMORY_STORE
            .get_or_init(|| Arc::new(InMemoryJobStore::new()))
            .clone()
    }
}

fn scheduler(config: &AppConfig) -> NotificationSchedulerService {
    NotificationSchedulerService::new(job_store(config))
}

fn executor(config: &AppConfig) -> NotificationExecutorService {
    let channel: Arc<dyn NotificationChannel> = Arc::new(GatewayChannel::new(config));
    let preferences: Arc<dyn PreferenceResolver> =
        Arc::new(CachingPreferenceResolver::new(RestPreferenceResolver::new(
            config,
        )));
    NotificationExecutorService::new(job_store(config), channel, preferences)
}

fn map_notification_error(e: NotificationError) -> AppError {
    match e {
        NotificationError::JobNotFound(id) => {
            AppError::NotFound(format!("Notification job {} not found", id))
        }
        NotificationError::InvalidStatusTransition { .. } => AppError::Conflict(e.to_string()),
        NotificationError::Persistence(_) => AppError::Database(e.to_string()),
        NotificationError::Serialization(_) => AppError::Internal(e.to_string()),
    }
}

/// Create reminder jobs for a newly booked appointment.
pub async fn schedule_notifications(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<ScheduleNotificationsRequest>,
) -> Result<Json<Value>, AppError> {
    let jobs = scheduler(&config)
        .schedule_appointment_notifications(&request.appointment, &request.recipient, Utc::now())
        .await
        .map_err(map_notification_error)?;

    Ok(Json(json!({
        "appointment_id": request.appointment.id,
        "created": jobs.len(),
        "jobs": jobs,
    })))
}

/// Cancel all remaining reminders for an appointment.
pub async fn cancel_notifications(
    State(config): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let cancelled = scheduler(&config)
        .cancel_appointment_notifications(appointment_id, Utc::now())
        .await
        .map_err(map_notification_error)?;

    Ok(Json(json!({
        "appointment_id": appointment_id,
        "cancelled": cancelled,
    })))
}

/// Replace an appointment's reminders after it moved to a new start time.
pub async fn reschedule_notifications(
    State(config): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleNotificationsRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = scheduler(&config)
        .reschedule_appointment_notifications(
            appointment_id,
            request.new_start_time,
            &request.recipient,
            Utc::now(),
        )
        .await
        .map_err(map_notification_error)?;

    Ok(Json(json!({
        "appointment_id": appointment_id,
        "created": outcome.created,
        "cancelled": outcome.cancelled,
    })))
}

/// List every reminder job attached to an appointment.
pub async fn get_appointment_jobs(
    State(config): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let jobs = scheduler(&config)
        .jobs_for_appointment(appointment_id)
        .await
        .map_err(map_notification_error)?;

    Ok(Json(json!({
        "appointment_id": appointment_id,
        "total": jobs.len(),
        "jobs": jobs,
    })))
}

pub async fn get_job(
    State(config): State<Arc<AppConfig>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<NotificationJob>, AppError> {
    let job = scheduler(&config)
        .get_job(job_id)
        .await
        .map_err(map_notification_error)?
        .ok_or_else(|| AppError::NotFound(format!("Notification job {} not found", job_id)))?;

    Ok(Json(job))
}

/// Run all due notification jobs. Invoked by the external scheduler trigger;
/// safe to call on overlapping timers.
pub async fn execute_pending(
    State(config): State<Arc<AppConfig>>,
) -> Result<Json<ExecutionSummary>, AppError> {
    let summary = executor(&config)
        .execute_pending(Utc::now())
        .await
        .map_err(map_notification_error)?;

    Ok(Json(summary))
}
