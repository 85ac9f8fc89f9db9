// libs/availability-cell/tests/supabase_store_test.rs

use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use availability_cell::models::DateOverride;
use availability_cell::store::{AvailabilityStore, SupabaseAvailabilityStore};
use shared_database::{StoreError, SupabaseClient};
use shared_models::time::TimeRange;
use shared_models::StaffId;
use shared_utils::test_utils::{date, time, TestConfig};

async fn setup() -> (MockServer, SupabaseAvailabilityStore) {
    let mock_server = MockServer::start().await;
    let config = TestConfig::supabase(&mock_server.uri()).to_app_config();
    let store = SupabaseAvailabilityStore::new(Arc::new(SupabaseClient::new(&config)));
    (mock_server, store)
}

#[tokio::test]
async fn test_get_override_maps_exception_row() {
    let (mock_server, store) = setup().await;
    let staff = StaffId::new();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_overrides"))
        .and(query_param("staff_id", format!("eq.{}", staff)))
        .and(query_param("override_date", "eq.2024-03-04"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "staff_id": staff,
            "override_date": "2024-03-04",
            "is_available": true,
            "unavailable_ranges": [{"start": "12:00:00", "end": "13:00:00"}]
        }])))
        .mount(&mock_server)
        .await;

    let found = store.get_override(staff, date(2024, 3, 4)).await.unwrap();

    assert_eq!(
        found,
        Some(DateOverride::AvailableWithExceptions {
            unavailable_ranges: vec![TimeRange::new(time(12, 0), time(13, 0))]
        })
    );
}

#[tokio::test]
async fn test_missing_row_means_no_override() {
    let (mock_server, store) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_overrides"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    assert_eq!(store.get_override(StaffId::new(), date(2024, 3, 4)).await.unwrap(), None);
}

#[tokio::test]
async fn test_put_override_upserts_row() {
    let (mock_server, store) = setup().await;
    let staff = StaffId::new();

    Mock::given(method("POST"))
        .and(path("/rest/v1/availability_overrides"))
        .and(query_param("on_conflict", "staff_id,override_date"))
        .and(header("prefer", "resolution=merge-duplicates,return=minimal"))
        .and(body_json(json!({
            "staff_id": staff,
            "override_date": "2024-03-05",
            "is_available": false,
            "unavailable_ranges": []
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    store.put_override(staff, date(2024, 3, 5), DateOverride::Unavailable).await.unwrap();
}

#[tokio::test]
async fn test_load_collects_all_dates() {
    let (mock_server, store) = setup().await;
    let staff = StaffId::new();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_overrides"))
        .and(query_param("order", "override_date.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"staff_id": staff, "override_date": "2024-03-04", "is_available": false},
            {"staff_id": staff, "override_date": "2024-03-06", "is_available": true, "unavailable_ranges": []}
        ])))
        .mount(&mock_server)
        .await;

    let availability = store.load(staff).await.unwrap();

    assert_eq!(availability.overrides.len(), 2);
    assert_eq!(availability.override_for(date(2024, 3, 4)), Some(&DateOverride::Unavailable));
    assert!(availability.override_for(date(2024, 3, 6)).unwrap().is_available());
}

#[tokio::test]
async fn test_outage_surfaces_as_unavailable() {
    let (mock_server, store) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_overrides"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&mock_server)
        .await;

    let result = store.get_override(StaffId::new(), date(2024, 3, 4)).await;
    assert_matches!(result, Err(StoreError::Unavailable(_)));
}
