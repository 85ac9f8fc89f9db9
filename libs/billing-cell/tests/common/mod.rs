#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use appointment_cell::services::AppointmentLifecycleService;
use appointment_cell::store::{AppointmentStore, InMemoryAppointmentStore};
use billing_cell::models::{BillingRecord, ClaimOutcome, CounterKey};
use billing_cell::store::{BillingStore, InMemoryBillingStore};
use billing_cell::{
    BillingError, BillingService, CapacityCounter, InMemorySessionCounter, SessionCompletionService,
    SessionCounter,
};
use shared_config::BillingConfig;
use shared_database::StoreError;
use shared_models::{Appointment, AppointmentId, AppointmentStatus, StaffMember};
use shared_utils::test_utils::TestStaff;

pub const PROGRAM: &str = "physio";
pub const YEAR: i32 = 2024;

pub fn billing_config() -> BillingConfig {
    BillingConfig::default()
}

pub fn billing_service(store: Arc<dyn BillingStore>, counter: Arc<dyn SessionCounter>) -> BillingService {
    let config = billing_config();
    BillingService::new(store, CapacityCounter::new(counter, config.capacity_threshold), &config)
}

/// Fails the first `failures` increments, then counts normally.
pub struct FlakyCounter {
    inner: InMemorySessionCounter,
    failures: AtomicU32,
}

impl FlakyCounter {
    pub fn failing(failures: u32) -> Self {
        Self {
            inner: InMemorySessionCounter::new(),
            failures: AtomicU32::new(failures),
        }
    }

    pub async fn current(&self, key: &CounterKey) -> u64 {
        self.inner.current(key).await
    }
}

#[async_trait]
impl SessionCounter for FlakyCounter {
    async fn increment_and_get(&self, key: &CounterKey) -> Result<u64, BillingError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BillingError::CounterUnavailable("connection refused".to_string()));
        }
        self.inner.increment_and_get(key).await
    }
}

/// Rejects the first `reserve_failures` reserve calls and the first
/// `finalize_failures` finalize calls as if the database were down.
pub struct FlakyWriteStore {
    pub inner: InMemoryBillingStore,
    reserve_failures: AtomicU32,
    finalize_failures: AtomicU32,
    pub finalize_calls: AtomicU32,
}

impl FlakyWriteStore {
    fn new(reserve_failures: u32, finalize_failures: u32) -> Self {
        Self {
            inner: InMemoryBillingStore::new(),
            reserve_failures: AtomicU32::new(reserve_failures),
            finalize_failures: AtomicU32::new(finalize_failures),
            finalize_calls: AtomicU32::new(0),
        }
    }

    pub fn failing_finalize(failures: u32) -> Self {
        Self::new(0, failures)
    }

    pub fn failing_reserve(failures: u32) -> Self {
        Self::new(failures, 0)
    }
}

fn take_failure(counter: &AtomicU32) -> Result<(), StoreError> {
    let remaining = counter.load(Ordering::SeqCst);
    if remaining > 0 {
        counter.store(remaining - 1, Ordering::SeqCst);
        return Err(StoreError::Unavailable("API error (503 Service Unavailable): down".to_string()));
    }
    Ok(())
}

#[async_trait]
impl BillingStore for FlakyWriteStore {
    async fn claim(
        &self,
        appointment_id: AppointmentId,
        program_key: &str,
        year: i32,
    ) -> Result<ClaimOutcome, StoreError> {
        self.inner.claim(appointment_id, program_key, year).await
    }

    async fn reserve(&self, charge: &BillingRecord) -> Result<(), StoreError> {
        take_failure(&self.reserve_failures)?;
        self.inner.reserve(charge).await
    }

    async fn finalize(&self, record: BillingRecord) -> Result<BillingRecord, StoreError> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        take_failure(&self.finalize_failures)?;
        self.inner.finalize(record).await
    }

    async fn release(&self, appointment_id: AppointmentId) -> Result<(), StoreError> {
        self.inner.release(appointment_id).await
    }

    async fn get(&self, appointment_id: AppointmentId) -> Result<Option<BillingRecord>, StoreError> {
        self.inner.get(appointment_id).await
    }
}

pub struct Harness {
    pub appointments: Arc<InMemoryAppointmentStore>,
    pub records: Arc<InMemoryBillingStore>,
    pub counter: Arc<InMemorySessionCounter>,
    pub lifecycle: Arc<AppointmentLifecycleService>,
    pub billing: Arc<BillingService>,
    pub completion: Arc<SessionCompletionService>,
    pub clinician: StaffMember,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_counter(InMemorySessionCounter::new())
    }

    pub fn with_counter(counter: InMemorySessionCounter) -> Self {
        let appointments = Arc::new(InMemoryAppointmentStore::new(30));
        let records = Arc::new(InMemoryBillingStore::new());
        let counter = Arc::new(counter);
        let lifecycle = Arc::new(AppointmentLifecycleService::new(appointments.clone()));
        let billing = Arc::new(billing_service(records.clone(), counter.clone()));
        let completion = Arc::new(SessionCompletionService::new(
            appointments.clone(),
            lifecycle.clone(),
            billing.clone(),
        ));

        Self {
            appointments,
            records,
            counter,
            lifecycle,
            billing,
            completion,
            clinician: TestStaff::clinician("Dr. Amara Osei"),
        }
    }

    pub async fn seed(&self, appointment: Appointment) -> Appointment {
        self.appointments.insert(appointment).await.unwrap()
    }

    pub async fn appointments_status(&self, id: AppointmentId) -> AppointmentStatus {
        self.appointments.get(id).await.unwrap().unwrap().status
    }

    pub async fn count(&self) -> u64 {
        self.counter.current(&CounterKey::new(PROGRAM, YEAR)).await
    }
}
