use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use queue_cell::{queue_routes, ClinicScheduler, FixedClock, MemoryStore, QueueCellState};

fn test_app(store: Arc<MemoryStore>, hour: u32, minute: u32) -> Router {
    let now = NaiveDate::from_ymd_opt(2025, 11, 3)
        .unwrap()
        .and_time(NaiveTime::from_hms_opt(hour, minute, 0).unwrap());
    let scheduler = Arc::new(ClinicScheduler::new(store));
    queue_routes(Arc::new(QueueCellState::new(scheduler, Arc::new(FixedClock::new(now)))))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn book_request(doctor_id: Uuid, patient_id: Uuid, date: &str, time: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/appointments/book")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "patient_id": patient_id,
                "doctor_id": doctor_id,
                "date": date,
                "time": time
            })
            .to_string(),
        ))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_book_appointment_created() {
    let app = test_app(Arc::new(MemoryStore::new()), 8, 0);
    let doctor_id = Uuid::new_v4();

    let (status, json) = send(&app, book_request(doctor_id, Uuid::new_v4(), "2025-11-03", "09:15")).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["appointment"]["token_no"], 1);
    assert_eq!(json["appointment"]["status"], "Scheduled");
    assert_eq!(json["appointment"]["doctor_id"], json!(doctor_id));
}

#[tokio::test]
async fn test_full_slot_returns_structured_details() {
    let app = test_app(Arc::new(MemoryStore::new()), 8, 0);
    let doctor_id = Uuid::new_v4();

    for _ in 0..5 {
        let (status, _) = send(&app, book_request(doctor_id, Uuid::new_v4(), "2025-11-03", "09:00")).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, json) = send(&app, book_request(doctor_id, Uuid::new_v4(), "2025-11-03", "09:15")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json,
        json!({
            "error": "Selected time slot is full",
            "details": {
                "slot_start": "09:00",
                "slot_end": "09:30",
                "capacity": 5
            }
        })
    );
}

#[tokio::test]
async fn test_booking_in_the_past_returns_timestamps() {
    let app = test_app(Arc::new(MemoryStore::new()), 12, 0);

    let (status, json) = send(&app, book_request(Uuid::new_v4(), Uuid::new_v4(), "2025-11-03", "11:00")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Cannot book an appointment in the past");
    assert_eq!(json["details"]["requested"], "2025-11-03T11:00:00");
    assert_eq!(json["details"]["now"], "2025-11-03T12:00:00");
}

#[tokio::test]
async fn test_malformed_booking_body_is_a_validation_error() {
    let store = Arc::new(MemoryStore::new());
    let app = test_app(store.clone(), 8, 0);

    let bad_uuid = Request::builder()
        .method("POST")
        .uri("/appointments/book")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "patient_id": "not-a-uuid",
                "doctor_id": Uuid::new_v4(),
                "date": "2025-11-03",
                "time": "09:15"
            })
            .to_string(),
        ))
        .unwrap();
    let (status, json) = send(&app, bad_uuid).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let missing_field = Request::builder()
        .method("POST")
        .uri("/appointments/book")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "patient_id": Uuid::new_v4(), "date": "2025-11-03" }).to_string()))
        .unwrap();
    let (status, json) = send(&app, missing_field).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("doctor_id"));

    assert_eq!(store.appointment_count().await, 0);
}

#[tokio::test]
async fn test_unknown_queue_status_is_a_validation_error() {
    let app = test_app(Arc::new(MemoryStore::new()), 9, 0);

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/queue/appointments/{}", Uuid::new_v4()))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "status": "Sleeping" }).to_string()))
        .unwrap();
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_available_slots_requires_date() {
    let app = test_app(Arc::new(MemoryStore::new()), 8, 0);
    let doctor_id = Uuid::new_v4();

    let (status, json) = send(&app, get(&format!("/doctors/{}/available_slots", doctor_id))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing required query param: date");

    let (status, _) = send(&app, get(&format!("/doctors/{}/available_slots?date=tomorrow", doctor_id))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_available_slots_lists_remaining_places() {
    let app = test_app(Arc::new(MemoryStore::new()), 8, 0);
    let doctor_id = Uuid::new_v4();
    send(&app, book_request(doctor_id, Uuid::new_v4(), "2025-11-03", "09:10")).await;

    let (status, json) = send(&app, get(&format!("/doctors/{}/available_slots?date=2025-11-03", doctor_id))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["slots"].as_array().unwrap().len(), 18);
    assert_eq!(json["slots"][0], json!({ "start": "09:00", "end": "09:30", "remaining": 4 }));
}

#[tokio::test]
async fn test_complete_unknown_appointment_is_not_found() {
    let app = test_app(Arc::new(MemoryStore::new()), 8, 0);

    let request = Request::builder()
        .method("POST")
        .uri(format!("/appointments/{}/complete", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Appointment not found");
}

#[tokio::test]
async fn test_patient_queue_status_after_booking() {
    let store = Arc::new(MemoryStore::new());
    let app = test_app(store, 9, 0);
    let patient_id = Uuid::new_v4();

    let (status, json) = send(&app, get(&format!("/queue/patient/{}", patient_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "in_queue": false }));

    send(&app, book_request(Uuid::new_v4(), patient_id, "2025-11-03", "10:00")).await;
    let (status, json) = send(&app, get(&format!("/queue/patient/{}", patient_id))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["in_queue"], true);
    assert_eq!(json["queue_status"], "Waiting");
    assert_eq!(json["position"], 1);
    assert_eq!(json["estimated_wait_minutes"], 60);
}

#[tokio::test]
async fn test_update_queue_status_accepts_legacy_key() {
    let store = Arc::new(MemoryStore::new());
    let app = test_app(store, 9, 0);
    let (_, booked) = send(&app, book_request(Uuid::new_v4(), Uuid::new_v4(), "2025-11-03", "10:00")).await;
    let appointment_id = booked["appointment"]["appointment_id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/queue/appointments/{}", appointment_id))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "q_status": "In Progress" }).to_string()))
        .unwrap();
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["queue"]["status"], "Consulting");

    let (status, json) = send(&app, get("/queue")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert_eq!(json["queue"][0]["queue_status"], "Consulting");
}
