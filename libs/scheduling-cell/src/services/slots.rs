use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use tracing::{debug, instrument};

use crate::error::SchedulingError;
use crate::models::{Appointment, ScheduleConstraints, TimeSlot};

const DEFAULT_SEARCH_HORIZON_DAYS: i64 = 60;

/// Finds free appointment slots under a clinician's working-hours policy.
///
/// The search is a pure function of its inputs: it walks forward day by day
/// from the requested lower bound, enumerates slot boundaries inside the work
/// window and drops any candidate that overlaps a booked interval. It never
/// samples the clock, so identical inputs always yield identical suggestions.
pub struct SlotFinderService {
    search_horizon_days: i64,
}

impl SlotFinderService {
    pub fn new() -> Self {
        Self {
            search_horizon_days: DEFAULT_SEARCH_HORIZON_DAYS,
        }
    }

    pub fn with_horizon(search_horizon_days: i64) -> Self {
        Self {
            search_horizon_days,
        }
    }

    /// Returns up to `count` free slots, ascending by start time. Exhausting
    /// the search horizon is not an error; the result is simply shorter than
    /// requested (possibly empty).
    #[instrument(skip(self, constraints, booked_slots))]
    pub fn suggest_slots(
        &self,
        constraints: &ScheduleConstraints,
        booked_slots: &[TimeSlot],
        from: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<TimeSlot>, SchedulingError> {
        constraints.validate()?;
        if count == 0 {
            return Err(SchedulingError::InvalidConstraints {
                reason: "count must be at least 1".to_string(),
            });
        }

        // Degenerate intervals cannot overlap anything; drop them up front.
        let mut booked: Vec<TimeSlot> = booked_slots
            .iter()
            .filter(|slot| slot.is_valid())
            .cloned()
            .collect();
        booked.sort_by(|a, b| a.start_time.cmp(&b.start_time));

        let slot_length = Duration::minutes(constraints.slot_minutes as i64);
        let mut suggestions = Vec::with_capacity(count);
        let first_date = from.date_naive();

        for day_offset in 0..=self.search_horizon_days {
            let date = first_date + Duration::days(day_offset);

            if !constraints.work_days.contains(&weekday_index(date.weekday())) {
                continue;
            }

            let midnight = match date.and_hms_opt(0, 0, 0) {
                Some(time) => time.and_utc(),
                None => continue,
            };
            let work_start = midnight + Duration::hours(constraints.work_start_hour as i64);
            let work_end = midnight + Duration::hours(constraints.work_end_hour as i64);

            let mut current_time = work_start;
            while current_time + slot_length <= work_end {
                let slot_end = current_time + slot_length;

                if current_time >= from && !overlaps_any(&booked, current_time, slot_end) {
                    suggestions.push(TimeSlot::new(current_time, slot_end));
                    if suggestions.len() >= count {
                        debug!("Collected {} slots", suggestions.len());
                        return Ok(suggestions);
                    }
                }

                current_time += slot_length;
            }
        }

        debug!(
            "Search horizon exhausted after {} days with {} slots",
            self.search_horizon_days,
            suggestions.len()
        );
        Ok(suggestions)
    }
}

impl Default for SlotFinderService {
    fn default() -> Self {
        Self::new()
    }
}

/// Overlap test against a list sorted by start time. Entries starting at or
/// after `end` cannot overlap, so the scan stops there.
fn overlaps_any(booked: &[TimeSlot], start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    for slot in booked {
        if slot.start_time >= end {
            break;
        }
        if start < slot.end_time && slot.start_time < end {
            return true;
        }
    }
    false
}

/// Two half-open intervals overlap iff each starts before the other ends.
/// Slots that merely share a boundary do not conflict.
pub fn slots_overlap(a: &TimeSlot, b: &TimeSlot) -> bool {
    a.start_time < b.end_time && b.start_time < a.end_time
}

/// Whether `candidate` collides with any appointment that still holds its
/// interval.
pub fn appointment_conflicts(candidate: &TimeSlot, existing: &[Appointment]) -> bool {
    existing
        .iter()
        .filter(|appointment| appointment.status.is_blocking())
        .any(|appointment| {
            candidate.start_time < appointment.end_time()
                && appointment.start_time < candidate.end_time
        })
}

/// Booked intervals derived from blocking appointments.
pub fn booked_slots_from(appointments: &[Appointment]) -> Vec<TimeSlot> {
    appointments
        .iter()
        .filter(|appointment| appointment.status.is_blocking())
        .map(TimeSlot::from_appointment)
        .collect()
}

fn weekday_index(weekday: Weekday) -> u8 {
    match weekday {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}
