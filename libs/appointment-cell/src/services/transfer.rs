use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use availability_cell::models::{ClosedReason, EffectiveAvailability};
use availability_cell::services::AvailabilityResolver;
use shared_database::StoreError;
use shared_models::{Appointment, AppointmentId, StaffId, StaffMember};

use crate::models::{ConflictCandidate, ConflictResult, TransferError};
use crate::services::conflict::ConflictDetectionService;
use crate::services::debounce::{Debouncer, Pending};
use crate::services::staff::StaffDirectory;
use crate::store::{AppointmentStore, ScheduleChange, ScheduleKey};

pub struct TransferService {
    store: Arc<dyn AppointmentStore>,
    directory: Arc<dyn StaffDirectory>,
    resolver: Arc<AvailabilityResolver>,
    conflicts: Arc<ConflictDetectionService>,
    debounce: Duration,
}

impl TransferService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn StaffDirectory>,
        resolver: Arc<AvailabilityResolver>,
        conflicts: Arc<ConflictDetectionService>,
        debounce: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            resolver,
            conflicts,
            debounce,
        }
    }

    pub async fn load_movable(&self, id: AppointmentId) -> Result<Appointment, TransferError> {
        let appointment = self.store.get(id).await?.ok_or(TransferError::NotFound(id))?;
        if !appointment.status.is_movable() {
            return Err(TransferError::NotMovable(appointment.status));
        }
        Ok(appointment)
    }

    /// Clinically qualified staff other than the current assignee.
    pub async fn targets_for(&self, appointment: &Appointment) -> Result<Vec<StaffMember>, TransferError> {
        let members = self.directory.list().await?;
        Ok(members
            .into_iter()
            .filter(|member| member.role.is_clinical())
            .filter(|member| member.id != appointment.staff_id)
            .collect())
    }

    pub async fn transfer_targets(&self, id: AppointmentId) -> Result<Vec<StaffMember>, TransferError> {
        let appointment = self.load_movable(id).await?;
        self.targets_for(&appointment).await
    }

    async fn resolve_target(
        &self,
        appointment: &Appointment,
        new_staff_id: StaffId,
    ) -> Result<StaffMember, TransferError> {
        if appointment.staff_id == new_staff_id {
            return Err(TransferError::SameStaff(new_staff_id));
        }

        let target = self
            .directory
            .get(new_staff_id)
            .await?
            .ok_or(TransferError::StaffNotFound(new_staff_id))?;
        if !target.role.is_clinical() {
            return Err(TransferError::NotQualified(new_staff_id));
        }
        Ok(target)
    }

    /// The target must be working that date and the whole appointment must
    /// fall inside their open hours net of blocked ranges.
    pub async fn check_availability(
        &self,
        appointment: &Appointment,
        target: &StaffMember,
    ) -> Result<EffectiveAvailability, TransferError> {
        let availability = self.resolver.resolve(target.id, appointment.date).await?;

        if !availability.enabled {
            let reason = match availability.closed_reason {
                Some(ClosedReason::RestDay) => "it is the weekly rest day",
                Some(ClosedReason::NoOpenHours) => "the clinic has no open hours",
                Some(ClosedReason::MarkedUnavailable) | None => "they are marked unavailable",
            };
            return Err(TransferError::NoAvailability(format!(
                "{} cannot take appointments on {}: {}",
                target.display_name, appointment.date, reason
            )));
        }

        let slot = self.conflicts.detector().slot_minutes();
        let start = appointment.start_minute();
        if !availability.covers(start, appointment.end_minute(slot)) {
            return Err(TransferError::NoAvailability(format!(
                "{} is not available on {} at {}",
                target.display_name,
                appointment.date,
                appointment.start_time.format("%H:%M")
            )));
        }

        Ok(availability)
    }

    fn candidate(appointment: &Appointment, target: &StaffMember) -> ConflictCandidate {
        ConflictCandidate::for_appointment(appointment, target.id, appointment.date, appointment.start_time)
    }

    /// Availability first; the conflict check only runs if it passes.
    pub async fn check_target(
        &self,
        appointment: &Appointment,
        target: &StaffMember,
    ) -> Result<ConflictResult, TransferError> {
        self.check_availability(appointment, target).await?;
        Ok(self.conflicts.check_current(&Self::candidate(appointment, target)).await?)
    }

    #[instrument(skip(self, appointment, target), fields(appointment_id = %appointment.id, target = %target.id))]
    pub async fn commit(
        &self,
        appointment: &Appointment,
        target: &StaffMember,
    ) -> Result<Appointment, TransferError> {
        let result = self.check_target(appointment, target).await?;
        if result.has_conflict {
            warn!("Transfer of {} to {} refused", appointment.id, target.id);
            return Err(TransferError::ConflictDetected(result.conflicts));
        }

        let change = ScheduleChange {
            appointment_id: appointment.id,
            expected: ScheduleKey::of(appointment),
            next: ScheduleKey {
                staff_id: target.id,
                date: appointment.date,
                start_time: appointment.start_time,
            },
            next_staff_name: target.display_name.clone(),
        };

        match self.store.commit_change(change).await {
            Ok(updated) => {
                info!(
                    "Appointment {} transferred from {} to {}",
                    appointment.id, appointment.staff_id, target.id
                );
                Ok(updated)
            }
            Err(StoreError::StaleWrite(reason)) => {
                warn!("Transfer of {} lost a race: {}", appointment.id, reason);
                let recheck = self.conflicts.check_current(&Self::candidate(appointment, target)).await?;
                if recheck.has_conflict {
                    Err(TransferError::ConflictDetected(recheck.conflicts))
                } else {
                    Err(TransferError::Store(StoreError::StaleWrite(reason)))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// One-shot transfer for API callers.
    pub async fn transfer(&self, id: AppointmentId, new_staff_id: StaffId) -> Result<Appointment, TransferError> {
        let appointment = self.load_movable(id).await?;
        let target = self.resolve_target(&appointment, new_staff_id).await?;
        self.commit(&appointment, &target).await
    }

    pub async fn begin(self: &Arc<Self>, id: AppointmentId) -> Result<TransferSession, TransferError> {
        let original = self.load_movable(id).await?;
        let targets = self.targets_for(&original).await?;
        Ok(TransferSession::new(self.clone(), original, targets))
    }
}

// ==============================================================================
// INTERACTIVE SESSION
// ==============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum TransferRejection {
    NoAvailability(String),
    Conflicts(Vec<Appointment>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferState {
    Idle,
    TargetSelected { target: StaffMember },
    /// Availability passed; the conflict check has not produced a result.
    AvailabilityChecked { target: StaffMember },
    ConflictChecked { target: StaffMember },
    Rejected { target: StaffMember, reason: TransferRejection },
    Confirmed(Appointment),
}

impl TransferState {
    pub fn name(&self) -> &'static str {
        match self {
            TransferState::Idle => "idle",
            TransferState::TargetSelected { .. } => "target_selected",
            TransferState::AvailabilityChecked { .. } => "availability_checked",
            TransferState::ConflictChecked { .. } => "conflict_checked",
            TransferState::Rejected { .. } => "rejected",
            TransferState::Confirmed(_) => "confirmed",
        }
    }
}

enum TargetVerdict {
    Unavailable(String),
    Checked(ConflictResult),
    CheckFailed(StoreError),
}

pub struct TransferSession {
    service: Arc<TransferService>,
    original: Appointment,
    targets: Vec<StaffMember>,
    state: TransferState,
    debouncer: Debouncer,
    pending: Option<Pending<Result<TargetVerdict, TransferError>>>,
}

impl TransferSession {
    fn new(service: Arc<TransferService>, original: Appointment, targets: Vec<StaffMember>) -> Self {
        let debouncer = Debouncer::new(service.debounce);
        Self {
            service,
            original,
            targets,
            state: TransferState::Idle,
            debouncer,
            pending: None,
        }
    }

    pub fn original(&self) -> &Appointment {
        &self.original
    }

    pub fn targets(&self) -> &[StaffMember] {
        &self.targets
    }

    pub fn state(&self) -> &TransferState {
        &self.state
    }

    fn schedule_check(&mut self, target: StaffMember) {
        let service = self.service.clone();
        let appointment = self.original.clone();
        let selected = target.clone();

        self.pending = Some(self.debouncer.schedule(async move {
            match service.check_availability(&appointment, &selected).await {
                Err(TransferError::NoAvailability(reason)) => return Ok(TargetVerdict::Unavailable(reason)),
                Err(e) => return Err(e),
                Ok(_) => {}
            }
            let candidate = TransferService::candidate(&appointment, &selected);
            Ok(match service.conflicts.check_current(&candidate).await {
                Ok(result) => TargetVerdict::Checked(result),
                Err(e) => TargetVerdict::CheckFailed(e),
            })
        }));
        self.state = TransferState::TargetSelected { target };
    }

    pub fn select_target(&mut self, staff_id: StaffId) -> Result<(), TransferError> {
        if let TransferState::Confirmed(_) = self.state {
            return Err(TransferError::InvalidState(self.state.name()));
        }
        if staff_id == self.original.staff_id {
            return Err(TransferError::SameStaff(staff_id));
        }

        let target = self
            .targets
            .iter()
            .find(|member| member.id == staff_id)
            .cloned()
            .ok_or(TransferError::NotQualified(staff_id))?;

        debug!("Transfer of {} targeting {}", self.original.id, staff_id);
        self.schedule_check(target);
        Ok(())
    }

    pub async fn await_check(&mut self) -> Result<ConflictResult, TransferError> {
        let target = match &self.state {
            TransferState::TargetSelected { target } | TransferState::AvailabilityChecked { target } => {
                target.clone()
            }
            TransferState::ConflictChecked { .. } => return Ok(ConflictResult::clear()),
            TransferState::Rejected { reason: TransferRejection::NoAvailability(reason), .. } => {
                return Err(TransferError::NoAvailability(reason.clone()))
            }
            TransferState::Rejected { reason: TransferRejection::Conflicts(conflicts), .. } => {
                return Ok(ConflictResult {
                    has_conflict: true,
                    conflicts: conflicts.clone(),
                })
            }
            other => return Err(TransferError::InvalidState(other.name())),
        };

        let pending = self.pending.take().ok_or(TransferError::CheckPending)?;
        let verdict = match pending.await {
            Ok(Some(verdict)) => verdict?,
            Ok(None) | Err(_) => return Err(TransferError::CheckPending),
        };

        match verdict {
            TargetVerdict::Unavailable(reason) => {
                self.state = TransferState::Rejected {
                    target,
                    reason: TransferRejection::NoAvailability(reason.clone()),
                };
                Err(TransferError::NoAvailability(reason))
            }
            TargetVerdict::CheckFailed(e) => {
                self.state = TransferState::AvailabilityChecked { target };
                Err(TransferError::Store(e))
            }
            TargetVerdict::Checked(result) => {
                self.state = if result.has_conflict {
                    TransferState::Rejected {
                        target,
                        reason: TransferRejection::Conflicts(result.conflicts.clone()),
                    }
                } else {
                    TransferState::ConflictChecked { target }
                };
                Ok(result)
            }
        }
    }

    pub async fn confirm(&mut self) -> Result<Appointment, TransferError> {
        match self.state.clone() {
            TransferState::ConflictChecked { target } => match self.service.commit(&self.original, &target).await {
                Ok(updated) => {
                    self.state = TransferState::Confirmed(updated.clone());
                    Ok(updated)
                }
                Err(e) => {
                    self.schedule_check(target);
                    Err(e)
                }
            },
            TransferState::TargetSelected { .. } | TransferState::AvailabilityChecked { .. } => {
                Err(TransferError::CheckPending)
            }
            TransferState::Rejected { reason: TransferRejection::NoAvailability(reason), .. } => {
                Err(TransferError::NoAvailability(reason))
            }
            TransferState::Rejected { reason: TransferRejection::Conflicts(conflicts), .. } => {
                Err(TransferError::ConflictDetected(conflicts))
            }
            TransferState::Confirmed(appointment) => Ok(appointment),
            other => Err(TransferError::InvalidState(other.name())),
        }
    }

    pub fn cancel(self) {
        debug!("Transfer of {} abandoned", self.original.id);
    }
}
