use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SchedulingError;

fn default_duration_minutes() -> i64 {
    60
}

/// A scheduled patient visit. Appointments are never deleted; a cancelled
/// visit keeps its row with status `cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub clinician_id: Uuid,
    pub patient_id: Uuid,
    pub start_time: DateTime<Utc>,
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: i64,
    pub status: AppointmentStatus,
}

impl Appointment {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Whether the appointment still holds its time interval. Completed,
    /// cancelled and no-show visits free the slot.
    pub fn is_blocking(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

/// A candidate or booked time interval. Always half-open: the slot covers
/// `[start_time, end_time)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl TimeSlot {
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time,
        }
    }

    pub fn from_appointment(appointment: &Appointment) -> Self {
        Self {
            start_time: appointment.start_time,
            end_time: appointment.end_time(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.end_time > self.start_time
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

/// Working-hours policy for a clinician, supplied per query. Weekdays use the
/// 0 = Sunday .. 6 = Saturday convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConstraints {
    pub work_days: Vec<u8>,
    pub work_start_hour: u32,
    pub work_end_hour: u32,
    pub slot_minutes: u32,
}

impl Default for ScheduleConstraints {
    fn default() -> Self {
        Self {
            work_days: vec![1, 2, 3, 4, 5],
            work_start_hour: 9,
            work_end_hour: 17,
            slot_minutes: 30,
        }
    }
}

impl ScheduleConstraints {
    pub fn validate(&self) -> Result<(), SchedulingError> {
        if self.work_days.is_empty() {
            return Err(SchedulingError::InvalidConstraints {
                reason: "working-day set is empty".to_string(),
            });
        }
        if let Some(day) = self.work_days.iter().find(|day| **day > 6) {
            return Err(SchedulingError::InvalidConstraints {
                reason: format!("working day {} is out of range 0-6", day),
            });
        }
        if self.work_start_hour > 24 || self.work_end_hour > 24 {
            return Err(SchedulingError::InvalidConstraints {
                reason: "work hours must be within 0-24".to_string(),
            });
        }
        if self.work_end_hour <= self.work_start_hour {
            return Err(SchedulingError::InvalidConstraints {
                reason: "work-end hour must be after work-start hour".to_string(),
            });
        }
        if self.slot_minutes == 0 {
            return Err(SchedulingError::InvalidConstraints {
                reason: "slot granularity must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestSlotsRequest {
    pub constraints: ScheduleConstraints,
    #[serde(default)]
    pub booked_slots: Vec<TimeSlot>,
    #[serde(default)]
    pub appointments: Vec<Appointment>,
    pub from: Option<DateTime<Utc>>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestSlotsResponse {
    pub slots: Vec<TimeSlot>,
}
