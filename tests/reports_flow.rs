mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, read_json, TestApp};
use serde_json::{json, Value};

#[tokio::test]
async fn report_counts_only_included_sections() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.signed_in().await?;

    for date in ["2024-07-02", "2024-07-31", "2024-08-01"] {
        let response = app
            .post_json(
                "/api/calendar/events",
                &json!({ "title": "Sync", "event_date": date }),
                Some(&token),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .post_json(
            "/api/reports",
            &json!({
                "title": "July summary",
                "type": "monthly",
                "start_date": "2024-07-01",
                "end_date": "2024-07-31",
                "include_calendar": true,
                "format": "excel",
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let report: Value = read_json(response).await?;
    assert_eq!(report["period"], "2024-07-01 ~ 2024-07-31");
    assert_eq!(report["type"], "monthly");
    assert_eq!(report["format"], "excel");
    assert_eq!(report["counts"]["calendar_events"], 2);
    assert!(report["counts"].get("documents").is_none());
    assert_eq!(report["includes"]["documents"], false);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn report_rejects_bad_input() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.signed_in().await?;

    let backwards = app
        .post_json(
            "/api/reports",
            &json!({
                "title": "Oops",
                "type": "weekly",
                "start_date": "2024-07-10",
                "end_date": "2024-07-01",
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(backwards.status(), StatusCode::BAD_REQUEST);
    let body: Value = read_json(backwards).await?;
    assert_eq!(body["error"], "end date must be after start date");

    let unknown_type = app
        .post_json(
            "/api/reports",
            &json!({
                "title": "Oops",
                "type": "daily",
                "start_date": "2024-07-01",
                "end_date": "2024-07-10",
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(unknown_type.status(), StatusCode::BAD_REQUEST);

    let missing = app
        .post_json("/api/reports", &json!({ "type": "weekly" }), Some(&token))
        .await?;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    let body: Value = read_json(missing).await?;
    assert_eq!(
        body["error"],
        "required fields missing: title, start_date, end_date"
    );

    app.cleanup().await?;
    Ok(())
}
