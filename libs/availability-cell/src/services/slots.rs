// libs/availability-cell/src/services/slots.rs
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use shared_models::time::{minute_of_day, time_from_minute, MINUTES_PER_DAY};
use shared_models::{Appointment, AppointmentId, StaffId};
use shared_utils::Clock;

use crate::models::{AvailabilityError, CandidateSlot, EffectiveAvailability};
use crate::services::resolver::AvailabilityResolver;

/// Expands resolved availability into discrete start times.
#[derive(Debug, Clone, Copy)]
pub struct SlotGenerator {
    slot_minutes: u32,
}

impl SlotGenerator {
    pub fn new(slot_minutes: u32) -> Self {
        Self {
            slot_minutes: slot_minutes.max(1),
        }
    }

    pub fn slot_minutes(&self) -> u32 {
        self.slot_minutes
    }

    /// `appointments` must be the staff member's full history, not just
    /// `availability.date`: the no-backfill cutoff looks across dates.
    pub fn generate(
        &self,
        availability: &EffectiveAvailability,
        staff_id: StaffId,
        appointments: &[Appointment],
        exclude_appointment_id: Option<AppointmentId>,
        now: NaiveDateTime,
    ) -> Vec<CandidateSlot> {
        let date = availability.date;
        if !availability.enabled || availability.open_ranges.is_empty() {
            return vec![];
        }
        if date < now.date() {
            return vec![];
        }

        let slot = self.slot_minutes;
        let relevant: Vec<&Appointment> = appointments
            .iter()
            .filter(|apt| apt.staff_id == staff_id)
            .filter(|apt| apt.is_active())
            .filter(|apt| Some(apt.id) != exclude_appointment_id)
            .collect();

        let booked = self.booked_offsets(&relevant, date);
        let cutoff = self.backfill_cutoff(&relevant, date);
        let earliest_start = if date == now.date() {
            // Strictly after now: a slot already in progress is not offerable.
            Some(minute_of_day(now.time()))
        } else {
            None
        };

        let mut points = BTreeSet::new();
        for range in &availability.open_ranges {
            let end = range.end_minute();
            let mut start = range.start_minute();
            while start + slot <= end {
                let blocked = availability
                    .unavailable_ranges
                    .iter()
                    .any(|unavailable| unavailable.overlaps_minutes(start, start + slot));
                let before_cutoff = cutoff.is_some_and(|c| start < c);
                let elapsed = earliest_start.is_some_and(|e| start <= e);

                if !blocked && !before_cutoff && !elapsed && !booked.contains(&start) {
                    points.insert(start);
                }
                start += slot;
            }
        }

        points
            .into_iter()
            .filter_map(time_from_minute)
            .map(|start_time| CandidateSlot { date, start_time })
            .collect()
    }

    /// Grid offsets covered by each active booking on `date`, the duration
    /// rounded up to whole slots.
    fn booked_offsets(&self, appointments: &[&Appointment], date: NaiveDate) -> BTreeSet<u32> {
        let slot = self.slot_minutes;
        let mut booked = BTreeSet::new();

        for apt in appointments.iter().filter(|apt| apt.date == date) {
            let start = apt.start_minute();
            let blocks = apt.duration_or(slot).div_ceil(slot).max(1);
            let end = start.saturating_add(blocks.saturating_mul(slot)).min(MINUTES_PER_DAY);

            let mut offset = start - start % slot;
            while offset < end {
                booked.insert(offset);
                offset += slot;
            }
        }

        booked
    }

    /// End of the chronologically latest booking on or before `date`, if
    /// that booking falls on `date` itself.
    fn backfill_cutoff(&self, appointments: &[&Appointment], date: NaiveDate) -> Option<u32> {
        let slot = self.slot_minutes;
        appointments
            .iter()
            .filter(|apt| apt.date <= date)
            .map(|apt| (apt.date, apt.end_minute(slot)))
            .max()
            .filter(|(latest_date, _)| *latest_date == date)
            .map(|(_, end)| end)
    }
}

/// Resolver plus generator, reading "now" from the injected clock.
pub struct SlotService {
    resolver: Arc<AvailabilityResolver>,
    generator: SlotGenerator,
    clock: Arc<dyn Clock>,
}

impl SlotService {
    pub fn new(resolver: Arc<AvailabilityResolver>, clock: Arc<dyn Clock>) -> Self {
        let generator = SlotGenerator::new(resolver.policy().slot_minutes);
        Self {
            resolver,
            generator,
            clock,
        }
    }

    pub fn resolver(&self) -> &Arc<AvailabilityResolver> {
        &self.resolver
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn generate_slots(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
        appointments: &[Appointment],
        exclude_appointment_id: Option<AppointmentId>,
    ) -> Result<Vec<CandidateSlot>, AvailabilityError> {
        let availability = self.resolver.resolve(staff_id, date).await?;
        let slots = self.generator.generate(
            &availability,
            staff_id,
            appointments,
            exclude_appointment_id,
            self.clock.now(),
        );

        debug!("Generated {} slots for staff {} on {}", slots.len(), staff_id, date);
        Ok(slots)
    }
}
