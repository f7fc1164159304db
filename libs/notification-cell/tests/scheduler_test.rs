use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use notification_cell::{
    InMemoryJobStore, JobStatus, JobStore, NotificationKind, NotificationSchedulerService,
};
use scheduling_cell::{Appointment, AppointmentStatus};

fn appointment(start_time: DateTime<Utc>) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        clinician_id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        start_time,
        duration_minutes: 30,
        status: AppointmentStatus::Scheduled,
    }
}

fn setup() -> (Arc<InMemoryJobStore>, NotificationSchedulerService) {
    let store = Arc::new(InMemoryJobStore::new());
    let scheduler = NotificationSchedulerService::new(store.clone());
    (store, scheduler)
}

#[tokio::test]
async fn schedules_day_before_and_same_day_reminders() {
    let (_store, scheduler) = setup();
    // Wednesday 14:00; scheduling happens the prior Monday.
    let start = Utc.with_ymd_and_hms(2025, 6, 4, 14, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
    let appointment = appointment(start);

    let jobs = scheduler
        .schedule_appointment_notifications(&appointment, "pat@example.com", now)
        .await
        .unwrap();

    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].kind, NotificationKind::DayBeforeReminder);
    assert_eq!(
        jobs[0].dispatch_at,
        Utc.with_ymd_and_hms(2025, 6, 3, 9, 0, 0).unwrap()
    );
    assert_eq!(jobs[1].kind, NotificationKind::SameDayReminder);
    assert_eq!(
        jobs[1].dispatch_at,
        Utc.with_ymd_and_hms(2025, 6, 4, 15, 0, 0).unwrap()
    );
    for job in &jobs {
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.appointment_id, appointment.id);
    }
}

#[tokio::test]
async fn past_reminder_times_are_skipped_silently() {
    let (_store, scheduler) = setup();
    // Wednesday 14:00 appointment, scheduled the same Wednesday at 10:00:
    // the day-before time is gone, the same-day 15:00 is still ahead.
    let start = Utc.with_ymd_and_hms(2025, 6, 4, 14, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2025, 6, 4, 10, 0, 0).unwrap();

    let jobs = scheduler
        .schedule_appointment_notifications(&appointment(start), "pat@example.com", now)
        .await
        .unwrap();

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, NotificationKind::SameDayReminder);
}

#[tokio::test]
async fn scheduling_after_all_times_passed_succeeds_with_zero_jobs() {
    let (store, scheduler) = setup();
    // Called Wednesday 16:00 for a Wednesday 14:00 appointment.
    let start = Utc.with_ymd_and_hms(2025, 6, 4, 14, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2025, 6, 4, 16, 0, 0).unwrap();
    let appointment = appointment(start);

    let jobs = scheduler
        .schedule_appointment_notifications(&appointment, "pat@example.com", now)
        .await
        .unwrap();

    assert!(jobs.is_empty());
    assert!(store
        .jobs_for_appointment(appointment.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn double_scheduling_does_not_duplicate_jobs() {
    let (store, scheduler) = setup();
    let start = Utc.with_ymd_and_hms(2025, 6, 4, 14, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
    let appointment = appointment(start);

    let first = scheduler
        .schedule_appointment_notifications(&appointment, "pat@example.com", now)
        .await
        .unwrap();
    let second = scheduler
        .schedule_appointment_notifications(&appointment, "pat@example.com", now)
        .await
        .unwrap();

    assert_eq!(first.len(), 2);
    assert!(second.is_empty());
    assert_eq!(
        store.jobs_for_appointment(appointment.id).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn cancelled_jobs_can_be_rescheduled_fresh() {
    let (store, scheduler) = setup();
    let start = Utc.with_ymd_and_hms(2025, 6, 4, 14, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
    let appointment = appointment(start);

    scheduler
        .schedule_appointment_notifications(&appointment, "pat@example.com", now)
        .await
        .unwrap();
    scheduler
        .cancel_appointment_notifications(appointment.id, now)
        .await
        .unwrap();

    // The cancelled pair no longer blocks a new schedule call.
    let fresh = scheduler
        .schedule_appointment_notifications(&appointment, "pat@example.com", now)
        .await
        .unwrap();

    assert_eq!(fresh.len(), 2);
    let all = store.jobs_for_appointment(appointment.id).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(
        all.iter()
            .filter(|job| job.status == JobStatus::Cancelled)
            .count(),
        2
    );
}

#[tokio::test]
async fn cancel_transitions_pending_jobs_and_reports_count() {
    let (store, scheduler) = setup();
    let start = Utc.with_ymd_and_hms(2025, 6, 4, 14, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
    let appointment = appointment(start);

    scheduler
        .schedule_appointment_notifications(&appointment, "pat@example.com", now)
        .await
        .unwrap();

    let cancelled = scheduler
        .cancel_appointment_notifications(appointment.id, now)
        .await
        .unwrap();
    assert_eq!(cancelled, 2);

    for job in store.jobs_for_appointment(appointment.id).await.unwrap() {
        assert_eq!(job.status, JobStatus::Cancelled);
    }
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let (_store, scheduler) = setup();
    let start = Utc.with_ymd_and_hms(2025, 6, 4, 14, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
    let appointment = appointment(start);

    scheduler
        .schedule_appointment_notifications(&appointment, "pat@example.com", now)
        .await
        .unwrap();

    assert_eq!(
        scheduler
            .cancel_appointment_notifications(appointment.id, now)
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        scheduler
            .cancel_appointment_notifications(appointment.id, now)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn cancel_of_unknown_appointment_is_a_no_op() {
    let (_store, scheduler) = setup();
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();

    let cancelled = scheduler
        .cancel_appointment_notifications(Uuid::new_v4(), now)
        .await
        .unwrap();
    assert_eq!(cancelled, 0);
}

#[tokio::test]
async fn reschedule_replaces_old_reminders_with_new_schedule() {
    let (store, scheduler) = setup();
    let old_start = Utc.with_ymd_and_hms(2025, 6, 4, 14, 0, 0).unwrap();
    let new_start = Utc.with_ymd_and_hms(2025, 6, 10, 11, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
    let appointment = appointment(old_start);

    scheduler
        .schedule_appointment_notifications(&appointment, "pat@example.com", now)
        .await
        .unwrap();

    let outcome = scheduler
        .reschedule_appointment_notifications(appointment.id, new_start, "pat@example.com", now)
        .await
        .unwrap();

    assert_eq!(outcome.created.len(), 2);
    assert_eq!(outcome.cancelled, 2);

    // Round-trip: reading back yields jobs matching the new schedule only.
    let jobs = store.jobs_for_appointment(appointment.id).await.unwrap();
    let active: Vec<_> = jobs
        .iter()
        .filter(|job| job.status != JobStatus::Cancelled)
        .collect();
    assert_eq!(active.len(), 2);
    assert!(active
        .iter()
        .any(|job| job.dispatch_at == Utc.with_ymd_and_hms(2025, 6, 9, 9, 0, 0).unwrap()));
    assert!(active
        .iter()
        .any(|job| job.dispatch_at == Utc.with_ymd_and_hms(2025, 6, 10, 15, 0, 0).unwrap()));
    for job in active {
        assert_eq!(job.appointment_start, new_start);
    }
}

#[tokio::test]
async fn reschedule_into_the_past_only_cancels() {
    let (store, scheduler) = setup();
    let old_start = Utc.with_ymd_and_hms(2025, 6, 10, 14, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
    let appointment = appointment(old_start);

    scheduler
        .schedule_appointment_notifications(&appointment, "pat@example.com", now)
        .await
        .unwrap();

    // Moved to later today, rescheduled at 16:00: both reminder hours for the
    // new date have already passed.
    let reschedule_now = Utc.with_ymd_and_hms(2025, 6, 2, 16, 0, 0).unwrap();
    let new_start = Utc.with_ymd_and_hms(2025, 6, 2, 17, 0, 0).unwrap();
    let outcome = scheduler
        .reschedule_appointment_notifications(
            appointment.id,
            new_start,
            "pat@example.com",
            reschedule_now,
        )
        .await
        .unwrap();

    assert!(outcome.created.is_empty());
    assert_eq!(outcome.cancelled, 2);
    let jobs = store.jobs_for_appointment(appointment.id).await.unwrap();
    assert!(jobs.iter().all(|job| job.status == JobStatus::Cancelled));
}
