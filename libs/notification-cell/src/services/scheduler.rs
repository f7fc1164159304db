use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use scheduling_cell::Appointment;

use crate::error::NotificationError;
use crate::models::{
    ConditionalUpdate, JobStatus, JobUpdate, NotificationJob, NotificationKind, ReminderPolicy,
    RescheduleOutcome,
};
use crate::store::JobStore;

/// Creates and invalidates reminder jobs for appointments. Execution of due
/// jobs lives in the executor service; this one only manages the job records.
pub struct NotificationSchedulerService {
    store: Arc<dyn JobStore>,
    policy: ReminderPolicy,
}

impl NotificationSchedulerService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self::with_policy(store, ReminderPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn JobStore>, policy: ReminderPolicy) -> Self {
        Self { store, policy }
    }

    /// Reminder dispatch times for an appointment under the current policy:
    /// the day before at `day_before_hour` and the appointment day at
    /// `same_day_hour`. A policy hour that does not exist on the clock is
    /// skipped rather than rejected.
    pub fn reminder_times(
        &self,
        appointment_start: DateTime<Utc>,
    ) -> Vec<(NotificationKind, DateTime<Utc>)> {
        let start_date = appointment_start.date_naive();
        let mut times = Vec::with_capacity(2);

        if let Some(day_before) = start_date.pred_opt() {
            if let Some(at) = day_before.and_hms_opt(self.policy.day_before_hour, 0, 0) {
                times.push((NotificationKind::DayBeforeReminder, at.and_utc()));
            }
        }
        if let Some(at) = start_date.and_hms_opt(self.policy.same_day_hour, 0, 0) {
            times.push((NotificationKind::SameDayReminder, at.and_utc()));
        }

        times
    }

    /// Creates pending reminder jobs for an appointment. Reminder times that
    /// have already passed relative to `now` are skipped silently, and a kind
    /// that already has a non-cancelled job for this appointment is not
    /// duplicated, so repeated calls are safe.
    #[instrument(skip(self, appointment), fields(appointment_id = %appointment.id))]
    pub async fn schedule_appointment_notifications(
        &self,
        appointment: &Appointment,
        recipient: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationJob>, NotificationError> {
        let existing = self.store.jobs_for_appointment(appointment.id).await?;
        let mut created = Vec::new();

        for (kind, dispatch_at) in self.reminder_times(appointment.start_time) {
            if dispatch_at <= now {
                debug!(
                    "Skipping {} for appointment {}: dispatch time {} already passed",
                    kind, appointment.id, dispatch_at
                );
                continue;
            }
            let duplicate = existing
                .iter()
                .any(|job| job.kind == kind && job.status != JobStatus::Cancelled);
            if duplicate {
                debug!(
                    "Skipping {} for appointment {}: job already scheduled",
                    kind, appointment.id
                );
                continue;
            }

            let job = NotificationJob::new(
                appointment.id,
                recipient,
                kind,
                dispatch_at,
                appointment.start_time,
                now,
            );
            self.store.create(&job).await?;
            created.push(job);
        }

        info!(
            "Scheduled {} reminder job(s) for appointment {}",
            created.len(),
            appointment.id
        );
        Ok(created)
    }

    /// Cancels every non-terminal job of an appointment and returns how many
    /// were cancelled. Jobs already dispatched, failed or cancelled are left
    /// alone, and a job claimed by an in-flight executor run keeps its claim;
    /// the call is idempotent either way.
    #[instrument(skip(self))]
    pub async fn cancel_appointment_notifications(
        &self,
        appointment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u32, NotificationError> {
        let cancelled = self
            .cancel_jobs_excluding(appointment_id, &[], now)
            .await?;
        info!(
            "Cancelled {} reminder job(s) for appointment {}",
            cancelled, appointment_id
        );
        Ok(cancelled)
    }

    /// Replaces an appointment's reminders after its start time moved. The
    /// new jobs are created before the old ones are cancelled, so a failure
    /// partway leaves the patient with extra reminders rather than none.
    #[instrument(skip(self))]
    pub async fn reschedule_appointment_notifications(
        &self,
        appointment_id: Uuid,
        new_start: DateTime<Utc>,
        recipient: &str,
        now: DateTime<Utc>,
    ) -> Result<RescheduleOutcome, NotificationError> {
        let mut created = Vec::new();
        for (kind, dispatch_at) in self.reminder_times(new_start) {
            if dispatch_at <= now {
                continue;
            }
            let job =
                NotificationJob::new(appointment_id, recipient, kind, dispatch_at, new_start, now);
            self.store.create(&job).await?;
            created.push(job);
        }

        let keep: Vec<Uuid> = created.iter().map(|job| job.id).collect();
        let cancelled = self
            .cancel_jobs_excluding(appointment_id, &keep, now)
            .await?;

        info!(
            "Rescheduled appointment {}: {} job(s) created, {} cancelled",
            appointment_id,
            created.len(),
            cancelled
        );
        Ok(RescheduleOutcome { created, cancelled })
    }

    pub async fn jobs_for_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<NotificationJob>, NotificationError> {
        self.store.jobs_for_appointment(appointment_id).await
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Option<NotificationJob>, NotificationError> {
        self.store.get(id).await
    }

    async fn cancel_jobs_excluding(
        &self,
        appointment_id: Uuid,
        keep: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<u32, NotificationError> {
        let jobs = self.store.jobs_for_appointment(appointment_id).await?;
        let mut cancelled = 0;

        for job in jobs {
            if job.status.is_terminal() || keep.contains(&job.id) {
                continue;
            }
            match self
                .store
                .conditional_update(job.id, job.status, JobUpdate::cancel(now))
                .await?
            {
                ConditionalUpdate::Applied(_) => cancelled += 1,
                ConditionalUpdate::Conflict => {
                    // Status moved between the read and the write; whoever won
                    // that race owns the job now.
                    debug!("Job {} changed status during cancellation sweep", job.id);
                }
            }
        }

        Ok(cancelled)
    }
}
