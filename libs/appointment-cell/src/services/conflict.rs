use std::sync::Arc;

use tracing::{debug, warn};

use shared_database::StoreError;
use shared_models::time::intervals_overlap;
use shared_models::Appointment;

use crate::models::{ConflictCandidate, ConflictResult};
use crate::store::AppointmentStore;

/// Pure overlap check of a candidate placement against a set of bookings.
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector {
    slot_minutes: u32,
}

impl ConflictDetector {
    pub fn new(slot_minutes: u32) -> Self {
        Self {
            slot_minutes: slot_minutes.max(1),
        }
    }

    pub fn slot_minutes(&self) -> u32 {
        self.slot_minutes
    }

    /// Every active booking of the same staff member on the same date whose
    /// interval overlaps the candidate's. The candidate's own id never counts.
    pub fn check(&self, appointments: &[Appointment], candidate: &ConflictCandidate) -> ConflictResult {
        let slot = self.slot_minutes;
        let start = candidate.start_minute();
        let end = candidate.end_minute(slot);

        let conflicts: Vec<Appointment> = appointments
            .iter()
            .filter(|apt| apt.staff_id == candidate.staff_id && apt.date == candidate.date)
            .filter(|apt| apt.is_active())
            .filter(|apt| Some(apt.id) != candidate.id)
            .filter(|apt| intervals_overlap(start, end, apt.start_minute(), apt.end_minute(slot)))
            .cloned()
            .collect();

        ConflictResult {
            has_conflict: !conflicts.is_empty(),
            conflicts,
        }
    }
}

/// Free-function form for callers holding their own appointment list.
pub fn check_conflict(
    appointments: &[Appointment],
    candidate: &ConflictCandidate,
    slot_minutes: u32,
) -> ConflictResult {
    ConflictDetector::new(slot_minutes).check(appointments, candidate)
}

/// Runs the detector against a fresh read of the store.
pub struct ConflictDetectionService {
    store: Arc<dyn AppointmentStore>,
    detector: ConflictDetector,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn AppointmentStore>, slot_minutes: u32) -> Self {
        Self {
            store,
            detector: ConflictDetector::new(slot_minutes),
        }
    }

    pub fn detector(&self) -> ConflictDetector {
        self.detector
    }

    pub async fn check_current(&self, candidate: &ConflictCandidate) -> Result<ConflictResult, StoreError> {
        debug!(
            "Checking conflicts for staff {} on {} at {}",
            candidate.staff_id, candidate.date, candidate.start_time
        );

        let appointments = self
            .store
            .list_for_staff_on(candidate.staff_id, candidate.date)
            .await?;
        let result = self.detector.check(&appointments, candidate);

        if result.has_conflict {
            warn!(
                "Conflict detected for staff {} - {} conflicting appointments",
                candidate.staff_id,
                result.conflicts.len()
            );
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use shared_models::{AppointmentStatus, StaffId};
    use uuid::Uuid;

    fn at(staff_id: StaffId, h: u32, m: u32, duration: Option<u32>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            staff_id,
            staff_name: "Dr. Rivera".to_string(),
            patient_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            start_time: NaiveTime::from_hms_opt(h, m, 0).unwrap(),
            duration_minutes: duration,
            status: AppointmentStatus::Confirmed,
            program_key: None,
            is_extra_treatment: false,
            updated_at: Utc::now(),
        }
    }

    fn candidate_for(apt: &Appointment, id: Option<Uuid>) -> ConflictCandidate {
        ConflictCandidate {
            id,
            staff_id: apt.staff_id,
            date: apt.date,
            start_time: apt.start_time,
            duration_minutes: apt.duration_minutes,
        }
    }

    #[test]
    fn test_touching_intervals_do_not_conflict() {
        let staff = StaffId::new();
        let existing = at(staff, 10, 0, Some(30));
        let next = at(staff, 10, 30, None);

        let result = check_conflict(&[existing], &candidate_for(&next, None), 30);
        assert!(!result.has_conflict);
    }

    #[test]
    fn test_short_duration_is_padded_to_one_slot() {
        let staff = StaffId::new();
        let existing = at(staff, 10, 0, Some(10));
        let next = at(staff, 10, 20, Some(10));

        let result = check_conflict(&[existing.clone()], &candidate_for(&next, None), 30);
        assert_eq!(result.conflicts, vec![existing]);
    }

    #[test]
    fn test_huge_duration_conflicts_with_rest_of_day() {
        let staff = StaffId::new();
        let later = at(staff, 16, 0, Some(30));
        let runaway = at(staff, 10, 0, Some(u32::MAX));

        let result = check_conflict(&[later.clone()], &candidate_for(&runaway, None), 30);
        assert_eq!(result.conflicts, vec![later]);
    }
}
