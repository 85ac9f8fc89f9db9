mod common;

use assert_matches::assert_matches;
use uuid::Uuid;

use appointment_cell::models::{AppointmentError, BookAppointmentRequest};
use appointment_cell::store::AppointmentStore;
use availability_cell::models::DateOverride;
use availability_cell::store::AvailabilityStore;
use shared_models::{AppointmentStatus, StaffId};
use shared_utils::test_utils::{time, TestAppointment};

use common::{monday, Harness};

fn request(staff_id: StaffId, date: &str, start_time: &str) -> BookAppointmentRequest {
    BookAppointmentRequest {
        staff_id,
        patient_id: Uuid::new_v4(),
        date: date.to_string(),
        start_time: start_time.to_string(),
        duration_minutes: Some(30),
        program_key: Some("physio".to_string()),
        is_extra_treatment: false,
    }
}

#[tokio::test]
async fn test_booking_creates_pending_appointment() {
    let harness = Harness::new().await;

    let apt = harness
        .booking
        .book_appointment(request(harness.amara.id, "2024-03-04", "10:00"))
        .await
        .unwrap();

    assert_eq!(apt.status, AppointmentStatus::Pending);
    assert_eq!(apt.staff_name, "Dr. Amara Osei");
    assert_eq!((apt.date, apt.start_time), (monday(), time(10, 0)));
    assert_eq!(harness.reload(apt.id).await, apt);
}

#[tokio::test]
async fn test_booking_over_existing_appointment_conflicts() {
    let harness = Harness::new().await;
    let existing = harness
        .seed(TestAppointment::for_staff(&harness.amara, monday(), time(10, 0)).build())
        .await;

    let result = harness
        .booking
        .book_appointment(request(harness.amara.id, "2024-03-04", "10:15"))
        .await;

    assert_matches!(result, Err(AppointmentError::ConflictDetected(c)) if c == vec![existing]);
}

#[tokio::test]
async fn test_booking_on_unavailable_date_is_refused() {
    let harness = Harness::new().await;
    harness
        .availability
        .put_override(harness.amara.id, monday(), DateOverride::Unavailable)
        .await
        .unwrap();

    let result = harness
        .booking
        .book_appointment(request(harness.amara.id, "2024-03-04", "10:00"))
        .await;

    assert_matches!(result, Err(AppointmentError::NoAvailability(_)));
}

#[tokio::test]
async fn test_booking_rejects_bad_input() {
    let harness = Harness::new().await;

    let bad_date = harness
        .booking
        .book_appointment(request(harness.amara.id, "next monday", "10:00"))
        .await;
    assert_matches!(bad_date, Err(AppointmentError::InvalidInput(_)));

    let past = harness
        .booking
        .book_appointment(request(harness.amara.id, "2024-02-01", "10:00"))
        .await;
    assert_matches!(past, Err(AppointmentError::InvalidInput(_)));

    let unknown = harness
        .booking
        .book_appointment(request(StaffId::new(), "2024-03-04", "10:00"))
        .await;
    assert_matches!(unknown, Err(AppointmentError::StaffNotFound(_)));
}

#[tokio::test]
async fn test_lifecycle_follows_allowed_transitions() {
    let harness = Harness::new().await;
    let apt = harness
        .seed(
            TestAppointment::for_staff(&harness.amara, monday(), time(9, 0))
                .status(AppointmentStatus::Pending)
                .build(),
        )
        .await;

    assert_matches!(
        harness.lifecycle.complete(apt.id).await,
        Err(AppointmentError::InvalidStatusTransition { .. })
    );

    harness.lifecycle.confirm(apt.id).await.unwrap();
    let done = harness.lifecycle.complete(apt.id).await.unwrap();
    assert_eq!(done.status, AppointmentStatus::Completed);

    assert_matches!(
        harness.lifecycle.cancel(apt.id).await,
        Err(AppointmentError::InvalidStatusTransition { .. })
    );
}

#[tokio::test]
async fn test_cancelled_appointment_frees_its_slot() {
    let harness = Harness::new().await;
    let apt = harness
        .seed(TestAppointment::for_staff(&harness.amara, monday(), time(10, 0)).build())
        .await;

    harness.lifecycle.cancel(apt.id).await.unwrap();

    let rebooked = harness
        .booking
        .book_appointment(request(harness.amara.id, "2024-03-04", "10:00"))
        .await;
    assert!(rebooked.is_ok());
}

#[tokio::test]
async fn test_booking_past_midnight_is_rejected() {
    let harness = Harness::new().await;
    let mut runaway = request(harness.amara.id, "2024-03-04", "10:00");
    runaway.duration_minutes = Some(u32::MAX);
    let mut overnight = request(harness.amara.id, "2024-03-04", "23:30");
    overnight.duration_minutes = Some(60);

    let result = harness.booking.book_appointment(runaway).await;
    assert_matches!(result, Err(AppointmentError::InvalidInput(_)));

    let result = harness.booking.book_appointment(overnight).await;
    assert_matches!(result, Err(AppointmentError::InvalidInput(_)));

    assert!(harness.store.list_for_staff(harness.amara.id).await.unwrap().is_empty());
}
