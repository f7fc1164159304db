use std::sync::Arc;

use axum::{extract::State, response::Json};
use chrono::Utc;
use tracing::info;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{SuggestSlotsRequest, SuggestSlotsResponse};
use crate::services::slots::{booked_slots_from, SlotFinderService};
use crate::SchedulingError;

/// Suggest free appointment slots for the booking UI.
pub async fn suggest_slots(
    State(_config): State<Arc<AppConfig>>,
    Json(request): Json<SuggestSlotsRequest>,
) -> Result<Json<SuggestSlotsResponse>, AppError> {
    let from = request.from.unwrap_or_else(Utc::now);

    let mut booked = request.booked_slots.clone();
    booked.extend(booked_slots_from(&request.appointments));

    let service = SlotFinderService::new();
    let slots = service
        .suggest_slots(&request.constraints, &booked, from, request.count)
        .map_err(|e| match e {
            SchedulingError::InvalidConstraints { .. } => AppError::BadRequest(e.to_string()),
        })?;

    info!(
        "Suggested {} slots (requested {}, {} booked intervals)",
        slots.len(),
        request.count,
        booked.len()
    );

    Ok(Json(SuggestSlotsResponse { slots }))
}
