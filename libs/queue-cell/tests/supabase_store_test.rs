use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use queue_cell::models::{NewBooking, QueueStatus, SlotWindow};
use queue_cell::{SchedulingStore, StoreError, SupabaseStore};
use shared_config::AppConfig;
use shared_database::SupabaseClient;

fn store_for(server: &MockServer) -> SupabaseStore {
    let config = AppConfig {
        supabase_url: server.uri(),
        supabase_anon_key: "test-anon-key".to_string(),
        ..AppConfig::in_memory()
    };
    SupabaseStore::new(Arc::new(SupabaseClient::new(&config)))
}

async fn mount_status_lookup(server: &MockServer, column: &str, status: u16, expected_calls: u64) {
    let body = match status {
        200 => json!([]),
        400 => json!({
            "code": "42703",
            "message": format!("column queue.{} does not exist", column)
        }),
        _ => json!({ "message": "upstream request failed" }),
    };
    Mock::given(method("GET"))
        .and(path("/rest/v1/queue"))
        .and(query_param("select", column))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 3).unwrap()
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

#[tokio::test]
async fn status_column_is_resolved_once() {
    let server = MockServer::start().await;
    mount_status_lookup(&server, "q_status", 200, 1).await;

    let store = store_for(&server);

    assert_eq!(store.status_column().await.unwrap(), "q_status");
    assert_eq!(store.status_column().await.unwrap(), "q_status");
}

#[tokio::test]
async fn status_column_falls_back_to_status() {
    let server = MockServer::start().await;
    mount_status_lookup(&server, "q_status", 400, 1).await;
    mount_status_lookup(&server, "status", 200, 1).await;

    let store = store_for(&server);

    assert_eq!(store.status_column().await.unwrap(), "status");
}

#[tokio::test]
async fn missing_status_column_is_a_schema_error() {
    let server = MockServer::start().await;
    mount_status_lookup(&server, "q_status", 400, 1).await;
    mount_status_lookup(&server, "status", 400, 1).await;

    let store = store_for(&server);

    assert_matches!(store.status_column().await, Err(StoreError::Schema(_)));
}

#[tokio::test]
async fn failed_status_lookup_is_unavailable_not_a_missing_column() {
    let server = MockServer::start().await;
    mount_status_lookup(&server, "q_status", 500, 1).await;
    mount_status_lookup(&server, "status", 200, 0).await;

    let store = store_for(&server);

    assert_matches!(store.status_column().await, Err(StoreError::Unavailable(_)));
}

#[tokio::test]
async fn full_slot_from_booking_function_is_reported() {
    let server = MockServer::start().await;
    mount_status_lookup(&server, "q_status", 200, 1).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "slot_full",
            "count": 5
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let result = store
        .insert_booking(NewBooking {
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            date: day(),
            time: t(9, 15),
            slot: SlotWindow::new(t(9, 0), 30),
            capacity: 5,
        })
        .await;

    assert_matches!(result, Err(StoreError::SlotFull { count: 5 }));
}

#[tokio::test]
async fn booking_function_returns_appointment_and_token() {
    let server = MockServer::start().await;
    mount_status_lookup(&server, "q_status", 200, 1).await;

    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "booked",
            "appointment": {
                "id": appointment_id,
                "patient_id": patient_id,
                "doctor_id": doctor_id,
                "date": "2025-11-03",
                "time": "09:15:00",
                "status": "Scheduled"
            },
            "queue_id": Uuid::new_v4(),
            "token_no": 3
        })))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let (appointment, entry) = store
        .insert_booking(NewBooking {
            patient_id,
            doctor_id,
            date: day(),
            time: t(9, 15),
            slot: SlotWindow::new(t(9, 0), 30),
            capacity: 5,
        })
        .await
        .unwrap();

    assert_eq!(appointment.id, appointment_id);
    assert_eq!(appointment.time, t(9, 15));
    assert_eq!(entry.appointment_id, appointment_id);
    assert_eq!(entry.token_no, 3);
    assert_eq!(entry.status, QueueStatus::Waiting);
}

#[tokio::test]
async fn joined_slot_read_filters_window_and_orders_by_token() {
    let server = MockServer::start().await;
    mount_status_lookup(&server, "q_status", 200, 1).await;

    let doctor_id = Uuid::new_v4();
    let row = |time: &str, token: u32, status: &str| {
        json!({
            "id": Uuid::new_v4(),
            "appointment_id": Uuid::new_v4(),
            "token_no": token,
            "q_status": status,
            "appointments": {
                "id": Uuid::new_v4(),
                "patient_id": Uuid::new_v4(),
                "doctor_id": doctor_id,
                "date": "2025-11-03",
                "time": time,
                "status": "Waiting"
            }
        })
    };
    Mock::given(method("GET"))
        .and(path("/rest/v1/queue"))
        .and(query_param("appointments.doctor_id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            row("10:10:00", 2, "Waiting"),
            row("10:00:00", 4, "In Progress"),
            row("10:30:00", 1, "Waiting"),
            row("10:00:00", 3, "Waiting"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let rows = store
        .queued_in_slot(doctor_id, day(), SlotWindow::new(t(10, 0), 30))
        .await
        .unwrap();

    let order: Vec<_> = rows.iter().map(|r| (r.appointment.time, r.entry.token_no)).collect();
    assert_eq!(order, vec![(t(10, 0), 3), (t(10, 0), 4), (t(10, 10), 2)]);
    assert_eq!(rows[1].entry.status, QueueStatus::InProgress);
}

#[tokio::test]
async fn completion_runs_as_one_function_call() {
    let server = MockServer::start().await;
    mount_status_lookup(&server, "status", 200, 1).await;
    mount_status_lookup(&server, "q_status", 400, 1).await;

    let changed = Uuid::new_v4();
    let untouched = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/complete_appointments"))
        .and(body_json(json!({
            "p_ids": [changed, untouched],
            "p_status_column": "status"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let store = store_for(&server);

    assert_eq!(store.complete_appointments(&[]).await.unwrap(), 0);
    assert_eq!(store.complete_appointments(&[changed, untouched]).await.unwrap(), 1);
}
