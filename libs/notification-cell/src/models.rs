use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// NOTIFICATION JOBS
// ============================================================================

/// A durable unit of scheduled reminder work. Jobs are owned by their
/// appointment: cancelling or rescheduling the appointment invalidates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
    pub id: Uuid,
    pub appointment_id: Uuid,
    /// Contact handle the gateway understands (email address, phone number,
    /// device token or user id, depending on the channel).
    pub recipient: String,
    pub kind: NotificationKind,
    pub channel: DeliveryChannel,
    pub status: JobStatus,
    pub dispatch_at: DateTime<Utc>,
    /// Snapshot of the appointment start, taken at job creation so the
    /// message can be rendered without re-reading the appointment.
    pub appointment_start: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationJob {
    pub fn new(
        appointment_id: Uuid,
        recipient: &str,
        kind: NotificationKind,
        dispatch_at: DateTime<Utc>,
        appointment_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            appointment_id,
            recipient: recipient.to_string(),
            kind,
            channel: DeliveryChannel::InApp,
            status: JobStatus::Pending,
            dispatch_at,
            appointment_start,
            attempts: 0,
            last_error: None,
            dispatched_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.dispatch_at <= now
    }

    pub fn render_message(&self) -> String {
        match self.kind {
            NotificationKind::DayBeforeReminder => format!(
                "Reminder: you have an appointment tomorrow at {}",
                self.appointment_start.format("%H:%M")
            ),
            NotificationKind::SameDayReminder => format!(
                "Reminder: you have an appointment today at {}",
                self.appointment_start.format("%H:%M")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DayBeforeReminder,
    SameDayReminder,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::DayBeforeReminder => write!(f, "day_before_reminder"),
            NotificationKind::SameDayReminder => write!(f, "same_day_reminder"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Email,
    Sms,
    Push,
    InApp,
}

impl std::fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryChannel::Email => write!(f, "email"),
            DeliveryChannel::Sms => write!(f, "sms"),
            DeliveryChannel::Push => write!(f, "push"),
            DeliveryChannel::InApp => write!(f, "in_app"),
        }
    }
}

/// Job lifecycle. `Processing` is the interim claim marker held while a
/// dispatch attempt is in flight; every outcome write is conditional on it,
/// which is what keeps overlapping executor runs from double-sending.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Dispatched,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Dispatched | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, target: &JobStatus) -> bool {
        use JobStatus::*;
        match (self, target) {
            (Pending, Processing) => true,
            (Processing, Dispatched) => true,
            (Processing, Pending) => true,
            (Processing, Failed) => true,
            (_, Cancelled) => !self.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Dispatched => write!(f, "dispatched"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ============================================================================
// POLICY & PREFERENCES
// ============================================================================

/// Reminder policy. The hours, retry cap and timeout are deployment tunables,
/// not constants; defaults follow the clinic's standing rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderPolicy {
    /// Hour of the day-before reminder, in the clinic's time convention.
    pub day_before_hour: u32,
    /// Hour of the same-day reminder.
    pub same_day_hour: u32,
    /// Attempts after which a transiently failing job is marked failed.
    pub retry_limit: u32,
    pub dispatch_timeout_ms: u64,
    /// Claims older than this are treated as abandoned by a dead run.
    pub claim_stale_after_secs: u64,
    pub max_concurrent_dispatches: usize,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            day_before_hour: 9,
            same_day_hour: 15,
            retry_limit: 3,
            dispatch_timeout_ms: 10_000,
            claim_stale_after_secs: 600,
            max_concurrent_dispatches: 5,
        }
    }
}

/// Per-recipient channel switches, stored in the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub recipient: String,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub push_enabled: bool,
    pub in_app_enabled: bool,
    pub preferred_channel: Option<DeliveryChannel>,
}

impl NotificationPreferences {
    pub fn channel_enabled(&self, channel: DeliveryChannel) -> bool {
        match channel {
            DeliveryChannel::Email => self.email_enabled,
            DeliveryChannel::Sms => self.sms_enabled,
            DeliveryChannel::Push => self.push_enabled,
            DeliveryChannel::InApp => self.in_app_enabled,
        }
    }

    /// The channel dispatch should use: the preferred channel when enabled,
    /// otherwise the first enabled channel, otherwise in-app.
    pub fn effective_channel(&self) -> DeliveryChannel {
        if let Some(channel) = self.preferred_channel {
            if self.channel_enabled(channel) {
                return channel;
            }
        }
        for channel in [
            DeliveryChannel::Email,
            DeliveryChannel::Sms,
            DeliveryChannel::Push,
        ] {
            if self.channel_enabled(channel) {
                return channel;
            }
        }
        DeliveryChannel::InApp
    }
}

// ============================================================================
// STORE UPDATE & EXECUTION TYPES
// ============================================================================

/// Partial update applied through a conditional write. `None` fields are left
/// unchanged; the struct serializes straight into the store's PATCH body.
#[derive(Debug, Clone, Serialize)]
pub struct JobUpdate {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<DeliveryChannel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl JobUpdate {
    fn transition(status: JobStatus, now: DateTime<Utc>) -> Self {
        Self {
            status,
            channel: None,
            attempts: None,
            last_error: None,
            dispatched_at: None,
            updated_at: now,
        }
    }

    pub fn claim(now: DateTime<Utc>) -> Self {
        Self::transition(JobStatus::Processing, now)
    }

    pub fn cancel(now: DateTime<Utc>) -> Self {
        Self::transition(JobStatus::Cancelled, now)
    }

    /// Returns an abandoned claim to the pending pool.
    pub fn release(now: DateTime<Utc>) -> Self {
        Self::transition(JobStatus::Pending, now)
    }

    pub fn dispatched(now: DateTime<Utc>, attempts: u32, channel: DeliveryChannel) -> Self {
        Self {
            channel: Some(channel),
            attempts: Some(attempts),
            dispatched_at: Some(now),
            ..Self::transition(JobStatus::Dispatched, now)
        }
    }

    pub fn retry(now: DateTime<Utc>, attempts: u32, error: String, channel: DeliveryChannel) -> Self {
        Self {
            channel: Some(channel),
            attempts: Some(attempts),
            last_error: Some(error),
            ..Self::transition(JobStatus::Pending, now)
        }
    }

    pub fn failed(now: DateTime<Utc>, attempts: u32, error: String, channel: DeliveryChannel) -> Self {
        Self {
            channel: Some(channel),
            attempts: Some(attempts),
            last_error: Some(error),
            ..Self::transition(JobStatus::Failed, now)
        }
    }
}

/// Result of a conditional write: either the job after the update, or a
/// conflict because its status no longer matched the expectation.
#[derive(Debug, Clone)]
pub enum ConditionalUpdate {
    Applied(NotificationJob),
    Conflict,
}

/// Jobs created and invalidated by one reschedule call.
#[derive(Debug, Clone, Serialize)]
pub struct RescheduleOutcome {
    pub created: Vec<NotificationJob>,
    pub cancelled: u32,
}

/// Per-run counters reported by the executor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub due_jobs: usize,
    pub dispatched: usize,
    pub retried: usize,
    pub failed: usize,
    pub skipped: usize,
    pub recovered: usize,
    pub errors: usize,
}

// ============================================================================
// REQUEST TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleNotificationsRequest {
    pub appointment: scheduling_cell::Appointment,
    pub recipient: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleNotificationsRequest {
    pub new_start_time: DateTime<Utc>,
    pub recipient: String,
}
