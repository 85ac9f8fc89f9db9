#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use appointment_cell::handlers::AppointmentState;
use appointment_cell::services::{
    AppointmentBookingService, AppointmentLifecycleService, ConflictDetectionService,
    InMemoryStaffDirectory, RescheduleService, TransferService,
};
use appointment_cell::store::{AppointmentStore, InMemoryAppointmentStore, ScheduleChange};
use availability_cell::models::AvailabilityPolicy;
use availability_cell::services::{AvailabilityResolver, SlotService};
use availability_cell::store::InMemoryAvailabilityStore;
use shared_database::StoreError;
use shared_models::{Appointment, AppointmentId, AppointmentStatus, StaffId, StaffMember};
use shared_utils::test_utils::{date, time, TestStaff};
use shared_utils::FixedClock;

pub const SLOT_MINUTES: u32 = 30;
pub const DEBOUNCE: Duration = Duration::from_millis(500);

pub fn monday() -> NaiveDate {
    date(2024, 3, 4)
}

/// Wraps the in-memory store and counts per-date reads, which is what every
/// conflict check issues.
pub struct CountingStore {
    inner: InMemoryAppointmentStore,
    day_reads: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryAppointmentStore::new(SLOT_MINUTES),
            day_reads: AtomicUsize::new(0),
        }
    }

    pub fn day_reads(&self) -> usize {
        self.day_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AppointmentStore for CountingStore {
    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError> {
        self.inner.get(id).await
    }

    async fn list_for_staff(&self, staff_id: StaffId) -> Result<Vec<Appointment>, StoreError> {
        self.inner.list_for_staff(staff_id).await
    }

    async fn list_for_staff_on(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError> {
        self.day_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.list_for_staff_on(staff_id, date).await
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        self.inner.insert(appointment).await
    }

    async fn commit_change(&self, change: ScheduleChange) -> Result<Appointment, StoreError> {
        self.inner.commit_change(change).await
    }

    async fn set_status(
        &self,
        id: AppointmentId,
        expected: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        self.inner.set_status(id, expected, next).await
    }
}

pub struct Harness {
    pub store: Arc<CountingStore>,
    pub availability: Arc<InMemoryAvailabilityStore>,
    pub directory: Arc<InMemoryStaffDirectory>,
    pub clock: FixedClock,
    pub resolver: Arc<AvailabilityResolver>,
    pub slots: Arc<SlotService>,
    pub conflicts: Arc<ConflictDetectionService>,
    pub booking: Arc<AppointmentBookingService>,
    pub lifecycle: Arc<AppointmentLifecycleService>,
    pub reschedule: Arc<RescheduleService>,
    pub transfer: Arc<TransferService>,
    pub amara: StaffMember,
    pub lena: StaffMember,
    pub desk: StaffMember,
}

impl Harness {
    pub async fn new() -> Self {
        let amara = TestStaff::clinician("Dr. Amara Osei");
        let lena = TestStaff::clinician("Dr. Lena Park");
        let desk = TestStaff::front_desk("Sam Reyes");

        let store = Arc::new(CountingStore::new());
        let availability = Arc::new(InMemoryAvailabilityStore::new());
        let directory = Arc::new(
            InMemoryStaffDirectory::with_staff(vec![amara.clone(), lena.clone(), desk.clone()]).await,
        );
        // A week ahead of the dates under test.
        let clock = FixedClock::at(date(2024, 2, 26).and_time(time(8, 0)));

        let resolver = Arc::new(AvailabilityResolver::new(
            availability.clone(),
            AvailabilityPolicy::default(),
        ));
        let slots = Arc::new(SlotService::new(resolver.clone(), Arc::new(clock.clone())));
        let conflicts = Arc::new(ConflictDetectionService::new(store.clone(), SLOT_MINUTES));

        let booking = Arc::new(AppointmentBookingService::new(
            store.clone(),
            directory.clone(),
            resolver.clone(),
            conflicts.clone(),
            Arc::new(clock.clone()),
        ));
        let lifecycle = Arc::new(AppointmentLifecycleService::new(store.clone()));
        let reschedule = Arc::new(RescheduleService::new(
            store.clone(),
            slots.clone(),
            conflicts.clone(),
            DEBOUNCE,
        ));
        let transfer = Arc::new(TransferService::new(
            store.clone(),
            directory.clone(),
            resolver.clone(),
            conflicts.clone(),
            DEBOUNCE,
        ));

        Self {
            store,
            availability,
            directory,
            clock,
            resolver,
            slots,
            conflicts,
            booking,
            lifecycle,
            reschedule,
            transfer,
            amara,
            lena,
            desk,
        }
    }

    pub async fn seed(&self, appointment: Appointment) -> Appointment {
        self.store.insert(appointment).await.unwrap()
    }

    pub async fn reload(&self, id: AppointmentId) -> Appointment {
        self.store.get(id).await.unwrap().unwrap()
    }

    pub fn state(&self) -> Arc<AppointmentState> {
        Arc::new(AppointmentState {
            store: self.store.clone(),
            slots: self.slots.clone(),
            conflicts: self.conflicts.clone(),
            booking: self.booking.clone(),
            lifecycle: self.lifecycle.clone(),
            reschedule: self.reschedule.clone(),
            transfer: self.transfer.clone(),
        })
    }
}
