use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use shared_config::{AppConfig, BillingConfig, SchedulingConfig, StoreBackend};
use shared_models::{Appointment, AppointmentStatus, StaffId, StaffMember, StaffRole};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub store_backend: StoreBackend,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            store_backend: StoreBackend::Memory,
        }
    }
}

impl TestConfig {
    /// Point the Supabase backend at a wiremock server.
    pub fn supabase(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            store_backend: StoreBackend::Supabase,
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            redis_url: None,
            store_backend: self.store_backend,
            bind_addr: "127.0.0.1:0".to_string(),
            scheduling: SchedulingConfig::default(),
            billing: BillingConfig::default(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid test time")
}

pub struct TestStaff;

impl TestStaff {
    pub fn clinician(name: &str) -> StaffMember {
        StaffMember {
            id: StaffId::new(),
            display_name: name.to_string(),
            role: StaffRole::Clinician,
        }
    }

    pub fn front_desk(name: &str) -> StaffMember {
        StaffMember {
            id: StaffId::new(),
            display_name: name.to_string(),
            role: StaffRole::FrontDesk,
        }
    }
}

/// Builder for appointment fixtures; defaults to a confirmed 30-minute booking.
pub struct TestAppointment {
    appointment: Appointment,
}

impl TestAppointment {
    pub fn for_staff(staff: &StaffMember, date: NaiveDate, start: NaiveTime) -> Self {
        Self {
            appointment: Appointment {
                id: Uuid::new_v4(),
                staff_id: staff.id,
                staff_name: staff.display_name.clone(),
                patient_id: Uuid::new_v4(),
                date,
                start_time: start,
                duration_minutes: Some(30),
                status: AppointmentStatus::Confirmed,
                program_key: None,
                is_extra_treatment: false,
                updated_at: Utc::now(),
            },
        }
    }

    pub fn duration(mut self, minutes: Option<u32>) -> Self {
        self.appointment.duration_minutes = minutes;
        self
    }

    pub fn status(mut self, status: AppointmentStatus) -> Self {
        self.appointment.status = status;
        self
    }

    pub fn program(mut self, key: &str) -> Self {
        self.appointment.program_key = Some(key.to_string());
        self
    }

    pub fn extra_treatment(mut self) -> Self {
        self.appointment.is_extra_treatment = true;
        self
    }

    pub fn build(self) -> Appointment {
        self.appointment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert_eq!(app_config.scheduling.slot_minutes, 30);
        assert_eq!(app_config.billing.capacity_threshold, 500);
    }

    #[test]
    fn test_appointment_builder_defaults() {
        let staff = TestStaff::clinician("Dr. Okafor");
        let apt = TestAppointment::for_staff(&staff, date(2024, 3, 4), time(14, 0))
            .duration(None)
            .build();

        assert_eq!(apt.staff_id, staff.id);
        assert_eq!(apt.staff_name, "Dr. Okafor");
        assert_eq!(apt.status, AppointmentStatus::Confirmed);
        assert_eq!(apt.duration_minutes, None);
    }
}
