use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use ulid::Ulid;

use slotbook::api::create_router;
use slotbook::engine::{Engine, FixedClock};

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("slotbook_test_http");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn app(name: &str) -> Router {
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2029, 12, 1, 0, 0, 0).unwrap()));
    let engine = Engine::new(test_wal_path(name), clock).unwrap();
    create_router(Arc::new(engine))
}

#[derive(Clone, Copy)]
enum As {
    Nobody,
    Client(Ulid),
    Professional(Ulid),
}

async fn call(app: &Router, method: Method, uri: &str, who: As, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    match who {
        As::Nobody => {}
        As::Client(id) => {
            builder = builder.header("x-user-id", id.to_string()).header("x-user-role", "client");
        }
        As::Professional(id) => {
            builder = builder
                .header("x-user-id", id.to_string())
                .header("x-user-role", "professional");
        }
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// São Paulo professional with Monday 09:00-11:00 and 30-minute appointments.
async fn setup_professional(app: &Router) -> Ulid {
    let pid = Ulid::new();
    let (status, _) = call(
        app,
        Method::PUT,
        &format!("/professionals/{pid}/schedule"),
        As::Professional(pid),
        Some(json!({
            "appointmentDurationMinutes": 30,
            "timezone": "America/Sao_Paulo",
            "autoConfirmAppointments": false
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        app,
        Method::POST,
        "/availability",
        As::Professional(pid),
        Some(json!({ "dayOfWeek": 1, "startTime": "09:00", "endTime": "11:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["start_time"], "09:00");
    pid
}

fn slots_uri(pid: Ulid, date: &str) -> String {
    format!("/professionals/{pid}/available-slots?date={date}")
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app("health.wal");
    let (status, body) = call(&app, Method::GET, "/health", As::Nobody, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn slots_booking_and_cancel_flow() {
    let app = app("flow.wal");
    let pid = setup_professional(&app).await;
    let client = Ulid::new();

    let (status, body) = call(&app, Method::GET, &slots_uri(pid, "2030-01-07"), As::Nobody, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            "2030-01-07T12:00:00.000Z",
            "2030-01-07T12:30:00.000Z",
            "2030-01-07T13:00:00.000Z",
            "2030-01-07T13:30:00.000Z"
        ])
    );

    let (status, appointment) = call(
        &app,
        Method::POST,
        "/appointments",
        As::Client(client),
        Some(json!({ "professionalProfileId": pid, "startTime": "2030-01-07T12:30:00.000Z" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(appointment["status"], "PENDING");
    assert_eq!(appointment["client_id"], client.to_string());
    let id = appointment["id"].as_str().unwrap().to_string();

    let (_, body) = call(&app, Method::GET, &slots_uri(pid, "2030-01-07"), As::Nobody, None).await;
    assert_eq!(body.as_array().unwrap().len(), 3);
    assert!(!body.as_array().unwrap().contains(&json!("2030-01-07T12:30:00.000Z")));

    // Second client on the same slot.
    let (status, body) = call(
        &app,
        Method::POST,
        "/appointments",
        As::Client(Ulid::new()),
        Some(json!({ "professionalProfileId": pid, "startTime": "2030-01-07T12:30:00Z" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Slot not valid or already taken");

    let uri = format!("/appointments/{id}");
    let (status, _) = call(&app, Method::DELETE, &uri, As::Client(Ulid::new()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, listed) = call(&app, Method::GET, "/appointments", As::Professional(pid), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, body) = call(&app, Method::DELETE, &uri, As::Client(client), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = call(&app, Method::GET, &uri, As::Client(client), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = call(&app, Method::GET, &slots_uri(pid, "2030-01-07"), As::Nobody, None).await;
    assert_eq!(body.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn concurrent_double_booking_yields_one_created_one_rejected() {
    let app = app("double_booking.wal");
    let pid = setup_professional(&app).await;
    let body = json!({ "professionalProfileId": pid, "startTime": "2030-01-07T13:00:00.000Z" });

    let (a, b) = futures::future::join(
        call(&app, Method::POST, "/appointments", As::Client(Ulid::new()), Some(body.clone())),
        call(&app, Method::POST, "/appointments", As::Client(Ulid::new()), Some(body)),
    )
    .await;

    let mut statuses = vec![a.0, b.0];
    statuses.sort_by_key(|s| s.as_u16());
    assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::BAD_REQUEST]);
}

#[tokio::test]
async fn weekday_without_rules_is_empty_not_error() {
    let app = app("empty_day.wal");
    let pid = setup_professional(&app).await;
    let (status, body) = call(&app, Method::GET, &slots_uri(pid, "2030-01-08"), As::Nobody, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn slot_query_validation() {
    let app = app("slot_validation.wal");
    let pid = setup_professional(&app).await;

    let (status, _) = call(&app, Method::GET, &slots_uri(pid, "07/01/2030"), As::Nobody, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let uri = format!("/professionals/{pid}/available-slots");
    let (status, body) = call(&app, Method::GET, &uri, As::Nobody, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["details"].as_str().unwrap().contains("date"));

    let (status, _) = call(&app, Method::GET, &slots_uri(Ulid::new(), "2030-01-07"), As::Nobody, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn extreme_dates_are_rejected_not_panicking() {
    let app = app("slot_extreme_dates.wal");
    let pid = setup_professional(&app).await;

    for date in ["-262143-01-01", "+262142-12-31", "0000-01-01", "10000-01-01"] {
        let (status, _) = call(&app, Method::GET, &slots_uri(pid, date), As::Nobody, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "date {date}");
    }
    let (status, _) = call(&app, Method::GET, &slots_uri(pid, "9999-12-31"), As::Nobody, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn overlapping_bulk_availability_is_rejected_whole() {
    let app = app("bulk_overlap.wal");
    let pid = setup_professional(&app).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/availability",
        As::Professional(pid),
        Some(json!([
            { "dayOfWeek": 1, "startTime": "07:00", "endTime": "11:00" },
            { "dayOfWeek": 1, "startTime": "10:00", "endTime": "12:00" }
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let details = body["error"]["details"].as_str().unwrap();
    assert!(details.contains("07:00-11:00"));
    assert!(details.contains("10:00-12:00"));

    let (_, rules) = call(&app, Method::GET, "/availability", As::Professional(pid), None).await;
    assert_eq!(rules.as_array().unwrap().len(), 1);
    assert_eq!(rules[0]["start_time"], "09:00");
}

#[tokio::test]
async fn bulk_availability_replaces_rule_set() {
    let app = app("bulk_replace.wal");
    let pid = setup_professional(&app).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/availability",
        As::Professional(pid),
        Some(json!([
            { "dayOfWeek": 2, "startTime": "13:00", "endTime": "17:00" },
            { "dayOfWeek": 1, "startTime": "08:00", "endTime": "09:00" }
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, slots) = call(&app, Method::GET, &slots_uri(pid, "2030-01-07"), As::Nobody, None).await;
    assert_eq!(slots, json!(["2030-01-07T11:00:00.000Z", "2030-01-07T11:30:00.000Z"]));
}

#[tokio::test]
async fn malformed_availability_is_rejected() {
    let app = app("bad_rule.wal");
    let pid = setup_professional(&app).await;

    for body in [
        json!({ "dayOfWeek": 1, "startTime": "25:00", "endTime": "26:00" }),
        json!({ "dayOfWeek": 9, "startTime": "09:00", "endTime": "10:00" }),
        json!({ "dayOfWeek": 3, "startTime": "11:00", "endTime": "10:00" }),
        json!({ "day": 3 }),
    ] {
        let (status, _) = call(&app, Method::POST, "/availability", As::Professional(pid), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn availability_delete_checks_ownership() {
    let app = app("rule_delete.wal");
    let owner = setup_professional(&app).await;
    let other = setup_professional(&app).await;

    let (_, rules) = call(&app, Method::GET, "/availability", As::Professional(owner), None).await;
    let rule_id = rules[0]["id"].as_str().unwrap().to_string();

    let (status, _) = call(&app, Method::DELETE, "/availability", As::Professional(owner), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, Method::DELETE, "/availability?id=nope", As::Professional(owner), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/availability?id={rule_id}");
    let (status, _) = call(&app, Method::DELETE, &uri, As::Professional(other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = call(&app, Method::DELETE, &uri, As::Professional(owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);
}

#[tokio::test]
async fn identity_and_role_are_enforced() {
    let app = app("auth.wal");
    let pid = setup_professional(&app).await;

    let (status, body) = call(&app, Method::GET, "/appointments", As::Nobody, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"]["action"].as_str().unwrap().contains("X-User-Id"));

    let (status, _) = call(
        &app,
        Method::POST,
        "/availability",
        As::Client(Ulid::new()),
        Some(json!({ "dayOfWeek": 2, "startTime": "09:00", "endTime": "10:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/professionals/{pid}/schedule"),
        As::Professional(Ulid::new()),
        Some(json!({ "appointmentDurationMinutes": 15, "autoConfirmAppointments": true })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn schedule_roundtrip_and_validation() {
    let app = app("schedule.wal");
    let pid = Ulid::new();
    let uri = format!("/professionals/{pid}/schedule");

    let (status, _) = call(&app, Method::GET, &uri, As::Nobody, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        Method::PUT,
        &uri,
        As::Professional(pid),
        Some(json!({ "appointmentDurationMinutes": 30, "timezone": "Not/AZone" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::PUT,
        &uri,
        As::Professional(pid),
        Some(json!({ "appointmentDurationMinutes": 45, "timezone": "Europe/Berlin", "autoConfirmAppointments": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, Method::GET, &uri, As::Nobody, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "appointmentDurationMinutes": 45, "timezone": "Europe/Berlin", "autoConfirmAppointments": true })
    );
}

#[tokio::test]
async fn auto_confirmed_booking_is_scheduled() {
    let app = app("auto_confirm.wal");
    let pid = setup_professional(&app).await;
    call(
        &app,
        Method::PUT,
        &format!("/professionals/{pid}/schedule"),
        As::Professional(pid),
        Some(json!({
            "appointmentDurationMinutes": 30,
            "timezone": "America/Sao_Paulo",
            "autoConfirmAppointments": true
        })),
    )
    .await;

    let client = Ulid::new();
    let (status, created) = call(
        &app,
        Method::POST,
        "/appointments",
        As::Client(client),
        Some(json!({ "professionalProfileId": pid, "startTime": "2030-01-07T09:00:00-03:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "SCHEDULED");

    let id = created["id"].as_str().unwrap();
    let (status, fetched) = call(&app, Method::GET, &format!("/appointments/{id}"), As::Client(client), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, _) = call(&app, Method::GET, &format!("/appointments/{id}"), As::Client(Ulid::new()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
