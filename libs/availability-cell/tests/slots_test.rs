// libs/availability-cell/tests/slots_test.rs

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use availability_cell::models::*;
use availability_cell::services::{AvailabilityResolver, SlotGenerator, SlotService};
use availability_cell::store::{AvailabilityStore, InMemoryAvailabilityStore};
use shared_models::time::{intervals_overlap, minute_of_day, TimeRange};
use shared_models::{Appointment, AppointmentStatus, StaffMember};
use shared_utils::test_utils::{date, time, TestAppointment, TestStaff};
use shared_utils::FixedClock;

// ==============================================================================
// TEST FIXTURES AND UTILITIES
// ==============================================================================

const MONDAY: (i32, u32, u32) = (2024, 3, 4);

fn monday() -> NaiveDate {
    date(MONDAY.0, MONDAY.1, MONDAY.2)
}

fn morning_of(day: NaiveDate) -> NaiveDateTime {
    // A clock well before the target date unless a test says otherwise.
    (day - chrono::Duration::days(7)).and_time(time(8, 0))
}

struct TestSetup {
    store: Arc<InMemoryAvailabilityStore>,
    clock: FixedClock,
    service: SlotService,
    staff: StaffMember,
}

impl TestSetup {
    fn new() -> Self {
        let store = Arc::new(InMemoryAvailabilityStore::new());
        let resolver = Arc::new(AvailabilityResolver::new(store.clone(), AvailabilityPolicy::default()));
        let clock = FixedClock::at(morning_of(monday()));
        let service = SlotService::new(resolver, Arc::new(clock.clone()));

        Self {
            store,
            clock,
            service,
            staff: TestStaff::clinician("Dr. Amara Osei"),
        }
    }

    fn booking(&self, day: NaiveDate, start: NaiveTime) -> TestAppointment {
        TestAppointment::for_staff(&self.staff, day, start)
    }

    async fn slots(&self, day: NaiveDate, appointments: &[Appointment]) -> Vec<NaiveTime> {
        self.service
            .generate_slots(self.staff.id, day, appointments, None)
            .await
            .unwrap()
            .into_iter()
            .map(|slot| slot.start_time)
            .collect()
    }
}

// ==============================================================================
// DEFAULT POLICY
// ==============================================================================

#[tokio::test]
async fn test_open_day_offers_every_half_hour() {
    let setup = TestSetup::new();

    let slots = setup.slots(monday(), &[]).await;

    assert_eq!(slots.len(), 18);
    assert_eq!(slots.first(), Some(&time(9, 0)));
    assert_eq!(slots.last(), Some(&time(17, 30)));
    assert!(slots.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_rest_day_offers_nothing() {
    let setup = TestSetup::new();
    assert!(setup.slots(date(2024, 3, 3), &[]).await.is_empty());
}

#[tokio::test]
async fn test_unavailable_date_offers_nothing() {
    let setup = TestSetup::new();
    setup.store.put_override(setup.staff.id, monday(), DateOverride::Unavailable).await.unwrap();

    assert!(setup.slots(monday(), &[]).await.is_empty());
}

// ==============================================================================
// SCENARIOS
// ==============================================================================

#[tokio::test]
async fn test_existing_booking_blocks_its_slot_and_everything_before() {
    let setup = TestSetup::new();
    let existing = setup.booking(monday(), time(14, 0)).build();

    let slots = setup.slots(monday(), &[existing]).await;

    assert!(!slots.contains(&time(14, 0)));
    assert!(slots.contains(&time(14, 30)));
    assert!(slots.contains(&time(17, 30)));
    assert!(slots.iter().all(|t| *t >= time(14, 30)));
}

#[tokio::test]
async fn test_unavailable_lunch_removes_its_slots() {
    let setup = TestSetup::new();
    setup
        .store
        .put_override(
            setup.staff.id,
            monday(),
            DateOverride::AvailableWithExceptions {
                unavailable_ranges: vec![TimeRange::new(time(12, 0), time(13, 0))],
            },
        )
        .await
        .unwrap();

    let slots = setup.slots(monday(), &[]).await;

    assert!(slots.contains(&time(11, 30)));
    assert!(!slots.contains(&time(12, 0)));
    assert!(!slots.contains(&time(12, 30)));
    assert!(slots.contains(&time(13, 0)));
}

// ==============================================================================
// PROPERTIES
// ==============================================================================

#[tokio::test]
async fn test_slots_never_overlap_active_bookings() {
    let setup = TestSetup::new();
    let appointments = vec![
        setup.booking(monday(), time(9, 30)).duration(Some(60)).build(),
        setup.booking(monday(), time(11, 15)).duration(Some(20)).build(),
        setup.booking(monday(), time(15, 0)).duration(Some(45)).build(),
        setup.booking(monday(), time(16, 30)).duration(None).build(),
    ];
    let slot_minutes = 30;

    let slots = setup.slots(monday(), &appointments).await;

    for slot in &slots {
        let start = minute_of_day(*slot);
        for apt in &appointments {
            assert!(
                !intervals_overlap(start, start + slot_minutes, apt.start_minute(), apt.end_minute(slot_minutes)),
                "slot {} overlaps booking at {}",
                slot,
                apt.start_time
            );
        }
    }
    assert_eq!(slots, vec![time(17, 0), time(17, 30)]);
}

#[tokio::test]
async fn test_no_backfill_before_latest_booking_end() {
    let setup = TestSetup::new();
    let appointments = vec![
        setup.booking(monday(), time(10, 0)).build(),
        setup.booking(monday(), time(15, 0)).duration(Some(60)).build(),
    ];

    let slots = setup.slots(monday(), &appointments).await;

    // Free slots at 9:00, 10:30..14:30 are never offered.
    assert_eq!(slots.first(), Some(&time(16, 0)));
    assert!(slots.iter().all(|t| *t >= time(16, 0)));
}

#[tokio::test]
async fn test_long_booking_rounds_up_to_whole_slots() {
    let setup = TestSetup::new();
    setup
        .store
        .put_override(
            setup.staff.id,
            monday(),
            DateOverride::AvailableWithExceptions { unavailable_ranges: vec![] },
        )
        .await
        .unwrap();
    let existing = setup.booking(monday(), time(16, 0)).duration(Some(40)).build();

    let slots = setup.slots(monday(), &[existing]).await;

    assert_eq!(slots, vec![time(17, 0), time(17, 30)]);
}

#[tokio::test]
async fn test_cancelled_bookings_are_ignored() {
    let setup = TestSetup::new();
    let cancelled = setup
        .booking(monday(), time(16, 0))
        .status(AppointmentStatus::Cancelled)
        .build();

    let slots = setup.slots(monday(), &[cancelled]).await;

    assert_eq!(slots.len(), 18);
    assert!(slots.contains(&time(9, 0)));
}

#[tokio::test]
async fn test_other_staff_bookings_are_ignored() {
    let setup = TestSetup::new();
    let colleague = TestStaff::clinician("Dr. Lena Park");
    let theirs = TestAppointment::for_staff(&colleague, monday(), time(9, 0)).build();

    let slots = setup.slots(monday(), &[theirs]).await;

    assert!(slots.contains(&time(9, 0)));
}

#[tokio::test]
async fn test_edited_booking_is_excluded() {
    let setup = TestSetup::new();
    let editing = setup.booking(monday(), time(14, 0)).build();

    let slots = setup
        .service
        .generate_slots(setup.staff.id, monday(), &[editing.clone()], Some(editing.id))
        .await
        .unwrap();

    assert_eq!(slots.len(), 18);
    assert!(slots.contains(&CandidateSlot { date: monday(), start_time: time(14, 0) }));
}

#[tokio::test]
async fn test_cutoff_only_applies_when_latest_booking_is_on_target_date() {
    let setup = TestSetup::new();
    let tuesday = date(2024, 3, 5);
    let history = vec![
        setup.booking(monday(), time(17, 0)).build(),
        // Bookings after the target date never feed the cutoff.
        setup.booking(date(2024, 3, 6), time(10, 0)).build(),
    ];

    let slots = setup.slots(tuesday, &history).await;

    assert_eq!(slots.len(), 18);
    assert_eq!(slots.first(), Some(&time(9, 0)));
}

// ==============================================================================
// CLOCK
// ==============================================================================

#[tokio::test]
async fn test_today_drops_elapsed_and_in_progress_slots() {
    let setup = TestSetup::new();
    setup.clock.set(monday().and_time(NaiveTime::from_hms_opt(10, 10, 0).unwrap()));

    let slots = setup.slots(monday(), &[]).await;

    assert!(!slots.contains(&time(9, 30)));
    assert!(!slots.contains(&time(10, 0)));
    assert_eq!(slots.first(), Some(&time(10, 30)));
}

#[tokio::test]
async fn test_today_slot_starting_now_is_not_offered() {
    let setup = TestSetup::new();
    setup.clock.set(monday().and_time(time(10, 30)));

    let slots = setup.slots(monday(), &[]).await;

    assert_eq!(slots.first(), Some(&time(11, 0)));
}

#[tokio::test]
async fn test_past_dates_offer_nothing() {
    let setup = TestSetup::new();
    setup.clock.set(date(2024, 3, 5).and_time(time(8, 0)));

    assert!(setup.slots(monday(), &[]).await.is_empty());
}

#[test]
fn test_generator_is_pure_over_resolved_availability() {
    let staff = TestStaff::clinician("Dr. Noor");
    let generator = SlotGenerator::new(30);
    let availability = EffectiveAvailability {
        date: monday(),
        enabled: true,
        open_ranges: vec![TimeRange::new(time(9, 0), time(10, 0))],
        unavailable_ranges: vec![],
        closed_reason: None,
    };

    let slots = generator.generate(&availability, staff.id, &[], None, morning_of(monday()));

    assert_eq!(
        slots,
        vec![
            CandidateSlot { date: monday(), start_time: time(9, 0) },
            CandidateSlot { date: monday(), start_time: time(9, 30) },
        ]
    );
}

#[tokio::test]
async fn test_stored_runaway_duration_blocks_rest_of_day() {
    let setup = TestSetup::new();
    let runaway = setup.booking(monday(), time(16, 0)).duration(Some(u32::MAX)).build();

    let slots = setup.slots(monday(), &[runaway]).await;

    assert!(slots.is_empty());
}
