use axum::http::StatusCode;
use chrono::{Duration, Months, SecondsFormat, Utc};
use serde_json::json;

mod common;

use common::{create_test_app, send, token_for};

async fn record(app: &axum::Router, token: &str, minutes_ago: i64, is_correct: bool) {
    let submitted = Utc::now() - Duration::minutes(minutes_ago);
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/users/alice/attempts",
        Some(token),
        Some(json!({
            "question_id": format!("q-{}", minutes_ago),
            "category": "medical",
            "timestamp_started": (submitted - Duration::seconds(5)).to_rfc3339_opts(SecondsFormat::Millis, true),
            "timestamp_submitted": submitted.to_rfc3339_opts(SecondsFormat::Millis, true),
            "selected_choice_index": 0,
            "is_correct": is_correct,
            "attempt_number_for_question": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "body: {}", body);
}

#[tokio::test]
async fn test_month_chart_splits_success_and_failure() {
    let app = create_test_app();
    let token = token_for("alice", "student");
    for (minutes_ago, correct) in [(5, true), (10, false), (15, true)] {
        record(&app, &token, minutes_ago, correct).await;
    }

    let (status, series) = send(
        &app,
        "GET",
        "/api/v1/users/alice/chart?duration=1M",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", series);
    assert_eq!(series["duration"], "1M");
    assert_eq!(series["labels"].as_array().unwrap().len(), 6);
    assert_eq!(series["total"], json!([0, 0, 0, 0, 0, 3]));
    assert_eq!(series["success"], json!([0, 0, 0, 0, 0, 2]));
    assert_eq!(series["failure"], json!([0, 0, 0, 0, 0, 1]));
}

#[tokio::test]
async fn test_week_chart_is_default_and_has_seven_buckets() {
    let app = create_test_app();
    let token = token_for("alice", "student");

    let (status, series) = send(&app, "GET", "/api/v1/users/alice/chart", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(series["duration"], "1W");
    assert_eq!(series["labels"].as_array().unwrap().len(), 7);
    assert_eq!(series["total"], json!([0, 0, 0, 0, 0, 0, 0]));
}

#[tokio::test]
async fn test_week_chart_counts_same_day_from_earlier_years() {
    let app = create_test_app();
    let token = token_for("alice", "student");
    let now = Utc::now();
    let years_ago = now.checked_sub_months(Months::new(48)).unwrap();
    record(&app, &token, (now - years_ago).num_minutes(), true).await;

    let (status, series) = send(
        &app,
        "GET",
        "/api/v1/users/alice/chart?duration=1W",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(series["total"][6], 1);
}

#[tokio::test]
async fn test_year_chart_has_twelve_buckets() {
    let app = create_test_app();
    let token = token_for("alice", "student");
    record(&app, &token, 1, true).await;

    let (status, series) = send(
        &app,
        "GET",
        "/api/v1/users/alice/chart?duration=1Y&tz_offset_minutes=-300",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(series["labels"].as_array().unwrap().len(), 12);
    assert_eq!(series["total"][11], 1);
}

#[tokio::test]
async fn test_chart_rejects_unknown_and_unimplemented_durations() {
    let app = create_test_app();
    let token = token_for("alice", "student");

    let (status, body) = send(
        &app,
        "GET",
        "/api/v1/users/alice/chart?duration=5D",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("5D"));

    let (status, _) = send(
        &app,
        "GET",
        "/api/v1/users/alice/chart?duration=ALL",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

    for offset in ["5000", "-2147483648", "2147483647"] {
        let (status, _) = send(
            &app,
            "GET",
            &format!("/api/v1/users/alice/chart?tz_offset_minutes={offset}"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "offset {offset}");
    }
}
