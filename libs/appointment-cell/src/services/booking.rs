use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use availability_cell::services::AvailabilityResolver;
use shared_database::StoreError;
use shared_models::time::{parse_calendar_date, parse_clock_time};
use shared_models::{Appointment, AppointmentId, AppointmentStatus};
use shared_utils::Clock;

use crate::models::{AppointmentError, BookAppointmentRequest, ConflictCandidate};
use crate::services::conflict::ConflictDetectionService;
use crate::services::staff::StaffDirectory;
use crate::store::AppointmentStore;

pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    directory: Arc<dyn StaffDirectory>,
    resolver: Arc<AvailabilityResolver>,
    conflicts: Arc<ConflictDetectionService>,
    clock: Arc<dyn Clock>,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn StaffDirectory>,
        resolver: Arc<AvailabilityResolver>,
        conflicts: Arc<ConflictDetectionService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            resolver,
            conflicts,
            clock,
        }
    }

    pub async fn get_appointment(&self, id: AppointmentId) -> Result<Appointment, AppointmentError> {
        self.store.get(id).await?.ok_or(AppointmentError::NotFound(id))
    }

    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        info!("Booking appointment for patient {} with staff {}", request.patient_id, request.staff_id);

        // Step 1: input
        let date = parse_calendar_date(&request.date)?;
        let start_time = parse_clock_time(&request.start_time)?;
        let slot = self.conflicts.detector().slot_minutes();
        let candidate = ConflictCandidate {
            id: None,
            staff_id: request.staff_id,
            date,
            start_time,
            duration_minutes: request.duration_minutes,
        };
        candidate.validate_extent(slot)?;
        if date.and_time(start_time) <= self.clock.now() {
            return Err(AppointmentError::InvalidInput(format!(
                "{} {} is in the past",
                date,
                start_time.format("%H:%M")
            )));
        }

        let staff = self
            .directory
            .get(request.staff_id)
            .await?
            .ok_or(AppointmentError::StaffNotFound(request.staff_id))?;

        // Step 2: availability
        let availability = self.resolver.resolve(staff.id, date).await?;
        if !availability.covers(candidate.start_minute(), candidate.end_minute(slot)) {
            return Err(AppointmentError::NoAvailability(format!(
                "{} is not available on {} at {}",
                staff.display_name,
                date,
                start_time.format("%H:%M")
            )));
        }

        // Step 3: conflicts against current data
        let check = self.conflicts.check_current(&candidate).await?;
        if check.has_conflict {
            return Err(AppointmentError::ConflictDetected(check.conflicts));
        }

        // Step 4: write
        let appointment = Appointment {
            id: Uuid::new_v4(),
            staff_id: staff.id,
            staff_name: staff.display_name.clone(),
            patient_id: request.patient_id,
            date,
            start_time,
            duration_minutes: request.duration_minutes,
            status: AppointmentStatus::Pending,
            program_key: request.program_key,
            is_extra_treatment: request.is_extra_treatment,
            updated_at: Utc::now(),
        };

        let stored = match self.store.insert(appointment).await {
            Ok(stored) => stored,
            Err(StoreError::StaleWrite(reason)) => {
                warn!("Booking lost a race for staff {}: {}", staff.id, reason);
                let recheck = self.conflicts.check_current(&candidate).await?;
                return Err(AppointmentError::ConflictDetected(recheck.conflicts));
            }
            Err(e) => return Err(e.into()),
        };

        info!("Appointment {} booked with staff {}", stored.id, staff.id);
        Ok(stored)
    }
}
