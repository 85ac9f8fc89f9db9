use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, info, instrument, warn};

use availability_cell::models::CandidateSlot;
use availability_cell::services::SlotService;
use shared_database::StoreError;
use shared_models::{Appointment, AppointmentId};

use crate::models::{ConflictCandidate, ConflictResult, RescheduleError};
use crate::services::conflict::ConflictDetectionService;
use crate::services::debounce::{Debouncer, Pending};
use crate::store::{AppointmentStore, ScheduleChange, ScheduleKey};

pub struct RescheduleService {
    store: Arc<dyn AppointmentStore>,
    slots: Arc<SlotService>,
    conflicts: Arc<ConflictDetectionService>,
    debounce: Duration,
}

impl RescheduleService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        slots: Arc<SlotService>,
        conflicts: Arc<ConflictDetectionService>,
        debounce: Duration,
    ) -> Self {
        Self {
            store,
            slots,
            conflicts,
            debounce,
        }
    }

    pub async fn load_movable(&self, id: AppointmentId) -> Result<Appointment, RescheduleError> {
        let appointment = self.store.get(id).await?.ok_or(RescheduleError::NotFound(id))?;
        if !appointment.status.is_movable() {
            return Err(RescheduleError::NotMovable(appointment.status));
        }
        Ok(appointment)
    }

    /// Start times on `date` for the appointment's staff member, the
    /// appointment itself not counted as a booking.
    pub async fn offered_slots(
        &self,
        appointment: &Appointment,
        date: NaiveDate,
    ) -> Result<Vec<CandidateSlot>, RescheduleError> {
        let history = self.store.list_for_staff(appointment.staff_id).await?;
        let slots = self
            .slots
            .generate_slots(appointment.staff_id, date, &history, Some(appointment.id))
            .await?;
        Ok(slots)
    }

    pub async fn check(
        &self,
        appointment: &Appointment,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<ConflictResult, RescheduleError> {
        let candidate = ConflictCandidate::for_appointment(appointment, appointment.staff_id, date, time);
        Ok(self.conflicts.check_current(&candidate).await?)
    }

    /// Fresh conflict check followed by a conditional write keyed on the
    /// placement `appointment` was read with.
    #[instrument(skip(self, appointment), fields(appointment_id = %appointment.id))]
    pub async fn commit(
        &self,
        appointment: &Appointment,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Appointment, RescheduleError> {
        let result = self.check(appointment, date, time).await?;
        if result.has_conflict {
            warn!("Reschedule of {} to {} {} refused", appointment.id, date, time.format("%H:%M"));
            return Err(RescheduleError::ConflictDetected(result.conflicts));
        }

        let change = ScheduleChange {
            appointment_id: appointment.id,
            expected: ScheduleKey::of(appointment),
            next: ScheduleKey {
                staff_id: appointment.staff_id,
                date,
                start_time: time,
            },
            next_staff_name: appointment.staff_name.clone(),
        };

        match self.store.commit_change(change).await {
            Ok(updated) => {
                info!(
                    "Appointment {} rescheduled from {} {} to {} {}",
                    appointment.id,
                    appointment.date,
                    appointment.start_time.format("%H:%M"),
                    date,
                    time.format("%H:%M")
                );
                Ok(updated)
            }
            Err(StoreError::StaleWrite(reason)) => {
                warn!("Reschedule of {} lost a race: {}", appointment.id, reason);
                let recheck = self.check(appointment, date, time).await?;
                if recheck.has_conflict {
                    Err(RescheduleError::ConflictDetected(recheck.conflicts))
                } else {
                    Err(RescheduleError::Store(StoreError::StaleWrite(reason)))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// One-shot reschedule for API callers.
    pub async fn reschedule(
        &self,
        id: AppointmentId,
        new_date: NaiveDate,
        new_time: NaiveTime,
    ) -> Result<Appointment, RescheduleError> {
        let appointment = self.load_movable(id).await?;

        if appointment.date == new_date && appointment.start_time == new_time {
            debug!("Reschedule of {} keeps its placement", id);
            return Ok(appointment);
        }

        if new_date.and_time(new_time) <= self.slots.clock().now() {
            return Err(RescheduleError::InvalidInput(format!(
                "{} {} is in the past",
                new_date,
                new_time.format("%H:%M")
            )));
        }

        let slot = self.conflicts.detector().slot_minutes();
        let candidate = ConflictCandidate::for_appointment(&appointment, appointment.staff_id, new_date, new_time);
        let availability = self.slots.resolver().resolve(appointment.staff_id, new_date).await?;
        if !availability.covers(candidate.start_minute(), candidate.end_minute(slot)) {
            return Err(RescheduleError::NoAvailability(format!(
                "{} is not available on {} at {}",
                appointment.staff_name,
                new_date,
                new_time.format("%H:%M")
            )));
        }

        self.commit(&appointment, new_date, new_time).await
    }

    pub async fn begin(self: &Arc<Self>, id: AppointmentId) -> Result<RescheduleSession, RescheduleError> {
        let original = self.load_movable(id).await?;
        Ok(RescheduleSession::new(self.clone(), original))
    }
}

// ==============================================================================
// INTERACTIVE SESSION
// ==============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RescheduleState {
    Idle,
    DateSelected { date: NaiveDate },
    SlotsOffered { date: NaiveDate },
    TimeSelected { date: NaiveDate, time: NaiveTime },
    ConflictChecked { date: NaiveDate, time: NaiveTime },
    Rejected { date: NaiveDate, time: NaiveTime, conflicts: Vec<Appointment> },
    Confirmed(Appointment),
}

impl RescheduleState {
    pub fn name(&self) -> &'static str {
        match self {
            RescheduleState::Idle => "idle",
            RescheduleState::DateSelected { .. } => "date_selected",
            RescheduleState::SlotsOffered { .. } => "slots_offered",
            RescheduleState::TimeSelected { .. } => "time_selected",
            RescheduleState::ConflictChecked { .. } => "conflict_checked",
            RescheduleState::Rejected { .. } => "rejected",
            RescheduleState::Confirmed(_) => "confirmed",
        }
    }

    fn selected_date(&self) -> Option<NaiveDate> {
        match self {
            RescheduleState::SlotsOffered { date }
            | RescheduleState::TimeSelected { date, .. }
            | RescheduleState::ConflictChecked { date, .. }
            | RescheduleState::Rejected { date, .. } => Some(*date),
            _ => None,
        }
    }
}

/// One user's pass through the reschedule dialog. Dropping the session
/// mutates nothing and cancels any pending check.
pub struct RescheduleSession {
    service: Arc<RescheduleService>,
    original: Appointment,
    state: RescheduleState,
    offered: Vec<CandidateSlot>,
    debouncer: Debouncer,
    pending: Option<Pending<Result<ConflictResult, StoreError>>>,
}

impl RescheduleSession {
    fn new(service: Arc<RescheduleService>, original: Appointment) -> Self {
        let debouncer = Debouncer::new(service.debounce);
        Self {
            service,
            original,
            state: RescheduleState::Idle,
            offered: vec![],
            debouncer,
            pending: None,
        }
    }

    pub fn original(&self) -> &Appointment {
        &self.original
    }

    pub fn state(&self) -> &RescheduleState {
        &self.state
    }

    pub fn offered(&self) -> &[CandidateSlot] {
        &self.offered
    }

    fn is_original(&self, date: NaiveDate, time: NaiveTime) -> bool {
        self.original.date == date && self.original.start_time == time
    }

    fn drop_pending_check(&mut self) {
        self.debouncer.cancel();
        self.pending = None;
    }

    fn schedule_check(&mut self, date: NaiveDate, time: NaiveTime) {
        let service = self.service.clone();
        let candidate =
            ConflictCandidate::for_appointment(&self.original, self.original.staff_id, date, time);

        self.pending = Some(
            self.debouncer
                .schedule(async move { service.conflicts.check_current(&candidate).await }),
        );
        self.state = RescheduleState::TimeSelected { date, time };
    }

    /// Picking a date discards any previously chosen time.
    pub async fn select_date(&mut self, date: NaiveDate) -> Result<&[CandidateSlot], RescheduleError> {
        if let RescheduleState::Confirmed(_) = self.state {
            return Err(RescheduleError::InvalidState(self.state.name()));
        }

        self.drop_pending_check();
        self.offered.clear();
        self.state = RescheduleState::DateSelected { date };

        let slots = self.service.offered_slots(&self.original, date).await?;
        if slots.is_empty() {
            return Err(RescheduleError::NoSlots(date));
        }

        self.offered = slots;
        self.state = RescheduleState::SlotsOffered { date };
        Ok(&self.offered)
    }

    /// Schedules a debounced conflict check; a newer selection supersedes it.
    pub fn select_time(&mut self, time: NaiveTime) -> Result<(), RescheduleError> {
        let date = self
            .state
            .selected_date()
            .ok_or(RescheduleError::InvalidState(self.state.name()))?;

        if self.is_original(date, time) {
            self.drop_pending_check();
            self.state = RescheduleState::TimeSelected { date, time };
            return Ok(());
        }

        if !self.offered.iter().any(|slot| slot.start_time == time) {
            return Err(RescheduleError::InvalidInput(format!(
                "{} is not an offered slot on {}",
                time.format("%H:%M"),
                date
            )));
        }

        self.schedule_check(date, time);
        Ok(())
    }

    /// Waits for the pending check and records its outcome.
    pub async fn await_check(&mut self) -> Result<ConflictResult, RescheduleError> {
        let (date, time) = match &self.state {
            RescheduleState::TimeSelected { date, time } => (*date, *time),
            RescheduleState::ConflictChecked { .. } => return Ok(ConflictResult::clear()),
            RescheduleState::Rejected { conflicts, .. } => {
                return Ok(ConflictResult {
                    has_conflict: true,
                    conflicts: conflicts.clone(),
                })
            }
            other => return Err(RescheduleError::InvalidState(other.name())),
        };

        if self.is_original(date, time) {
            return Ok(ConflictResult::clear());
        }

        let pending = self.pending.take().ok_or(RescheduleError::CheckPending)?;
        let result = match pending.await {
            Ok(Some(result)) => result?,
            Ok(None) | Err(_) => return Err(RescheduleError::CheckPending),
        };

        self.state = if result.has_conflict {
            RescheduleState::Rejected {
                date,
                time,
                conflicts: result.conflicts.clone(),
            }
        } else {
            RescheduleState::ConflictChecked { date, time }
        };
        Ok(result)
    }

    pub async fn confirm(&mut self) -> Result<Appointment, RescheduleError> {
        match self.state.clone() {
            RescheduleState::TimeSelected { date, time } if self.is_original(date, time) => {
                debug!("Reschedule of {} confirmed without changes", self.original.id);
                self.state = RescheduleState::Confirmed(self.original.clone());
                Ok(self.original.clone())
            }
            RescheduleState::TimeSelected { .. } => Err(RescheduleError::CheckPending),
            RescheduleState::ConflictChecked { date, time } => {
                match self.service.commit(&self.original, date, time).await {
                    Ok(updated) => {
                        self.state = RescheduleState::Confirmed(updated.clone());
                        Ok(updated)
                    }
                    Err(e) => {
                        self.schedule_check(date, time);
                        Err(e)
                    }
                }
            }
            RescheduleState::Rejected { conflicts, .. } => Err(RescheduleError::ConflictDetected(conflicts)),
            RescheduleState::Confirmed(appointment) => Ok(appointment),
            other => Err(RescheduleError::InvalidState(other.name())),
        }
    }

    pub fn cancel(self) {
        debug!("Reschedule of {} abandoned", self.original.id);
    }
}
