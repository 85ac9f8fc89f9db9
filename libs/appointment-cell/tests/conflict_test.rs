mod common;

use appointment_cell::models::ConflictCandidate;
use appointment_cell::services::check_conflict;
use shared_models::{Appointment, AppointmentStatus};
use shared_utils::test_utils::{time, TestAppointment, TestStaff};

use common::{monday, Harness, SLOT_MINUTES};

fn candidate_of(apt: &Appointment) -> ConflictCandidate {
    ConflictCandidate {
        id: Some(apt.id),
        staff_id: apt.staff_id,
        date: apt.date,
        start_time: apt.start_time,
        duration_minutes: apt.duration_minutes,
    }
}

#[test]
fn test_overlap_is_symmetric() {
    let staff = TestStaff::clinician("Dr. Amara Osei");
    let a = TestAppointment::for_staff(&staff, monday(), time(10, 0)).duration(Some(60)).build();
    let b = TestAppointment::for_staff(&staff, monday(), time(10, 30)).build();
    let all = vec![a.clone(), b.clone()];

    let a_vs_b = check_conflict(&all, &candidate_of(&a), SLOT_MINUTES);
    let b_vs_a = check_conflict(&all, &candidate_of(&b), SLOT_MINUTES);

    assert_eq!(a_vs_b.conflicts, vec![b.clone()]);
    assert_eq!(b_vs_a.conflicts, vec![a.clone()]);
}

#[test]
fn test_appointment_never_conflicts_with_itself() {
    let staff = TestStaff::clinician("Dr. Amara Osei");
    let apt = TestAppointment::for_staff(&staff, monday(), time(10, 0)).build();

    let result = check_conflict(&[apt.clone()], &candidate_of(&apt), SLOT_MINUTES);

    assert!(!result.has_conflict);
    assert!(result.conflicts.is_empty());
}

#[test]
fn test_ignores_cancelled_other_staff_and_other_dates() {
    let staff = TestStaff::clinician("Dr. Amara Osei");
    let colleague = TestStaff::clinician("Dr. Lena Park");
    let existing = vec![
        TestAppointment::for_staff(&staff, monday(), time(10, 0))
            .status(AppointmentStatus::Cancelled)
            .build(),
        TestAppointment::for_staff(&colleague, monday(), time(10, 0)).build(),
        TestAppointment::for_staff(&staff, monday().succ_opt().unwrap(), time(10, 0)).build(),
    ];
    let candidate = ConflictCandidate {
        id: None,
        staff_id: staff.id,
        date: monday(),
        start_time: time(10, 0),
        duration_minutes: None,
    };

    assert!(!check_conflict(&existing, &candidate, SLOT_MINUTES).has_conflict);
}

#[test]
fn test_returns_every_overlapping_booking() {
    let staff = TestStaff::clinician("Dr. Amara Osei");
    let first = TestAppointment::for_staff(&staff, monday(), time(9, 0)).build();
    let second = TestAppointment::for_staff(&staff, monday(), time(9, 30)).build();
    let clear = TestAppointment::for_staff(&staff, monday(), time(11, 0)).build();
    let candidate = ConflictCandidate {
        id: None,
        staff_id: staff.id,
        date: monday(),
        start_time: time(9, 15),
        duration_minutes: Some(45),
    };

    let result = check_conflict(&[first.clone(), second.clone(), clear], &candidate, SLOT_MINUTES);

    assert!(result.has_conflict);
    assert_eq!(result.conflicts, vec![first, second]);
}

#[tokio::test]
async fn test_service_reads_current_store_state() {
    let harness = Harness::new().await;
    let candidate = ConflictCandidate {
        id: None,
        staff_id: harness.amara.id,
        date: monday(),
        start_time: time(14, 0),
        duration_minutes: None,
    };

    assert!(!harness.conflicts.check_current(&candidate).await.unwrap().has_conflict);

    let booked = harness
        .seed(TestAppointment::for_staff(&harness.amara, monday(), time(14, 0)).build())
        .await;

    let result = harness.conflicts.check_current(&candidate).await.unwrap();
    assert_eq!(result.conflicts, vec![booked]);
    assert_eq!(harness.store.day_reads(), 2);
}
