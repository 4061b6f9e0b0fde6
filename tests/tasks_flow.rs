mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, read_json, TestApp};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct Task {
    id: String,
    title: String,
    description: String,
    status: String,
    assignee: Option<String>,
    due_date: Option<String>,
}

#[tokio::test]
async fn task_board_starts_seeded_and_prepends_new_tasks() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.signed_in().await?;

    let seeded: Vec<Task> = read_json(app.get("/api/tasks", Some(&token)).await?).await?;
    assert_eq!(seeded.len(), 3);

    let response = app
        .post_json(
            "/api/tasks",
            &json!({
                "title": "Write onboarding guide",
                "description": "Cover VPN and email setup",
                "priority": "low",
                "category": "documentation",
                "assignee": "이기획",
                "due_date": "2024-08-15",
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Task = read_json(response).await?;
    assert_eq!(created.status, "pending");
    assert_eq!(created.due_date.as_deref(), Some("2024-08-15"));

    let all: Vec<Task> = read_json(app.get("/api/tasks", Some(&token)).await?).await?;
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].id, created.id);

    let moved: Task = read_json(
        app.patch_json(
            &format!("/api/tasks/{}/status", created.id),
            &json!({ "status": "in_progress" }),
            Some(&token),
        )
        .await?,
    )
    .await?;
    assert_eq!(moved.status, "in_progress");

    let in_progress: Vec<Task> =
        read_json(app.get("/api/tasks?status=in_progress", Some(&token)).await?).await?;
    assert_eq!(in_progress.len(), 2);

    let edited: Task = read_json(
        app.patch_json(
            &format!("/api/tasks/{}", created.id),
            &json!({
                "title": "  Onboarding guide v2 ",
                "description": "  Cover VPN, email and badges  ",
                "assignee": null,
            }),
            Some(&token),
        )
        .await?,
    )
    .await?;
    assert_eq!(edited.title, "Onboarding guide v2");
    assert_eq!(edited.description, "Cover VPN, email and badges");
    assert!(edited.assignee.is_none());

    let blank = app
        .patch_json(
            &format!("/api/tasks/{}", created.id),
            &json!({ "description": "   " }),
            Some(&token),
        )
        .await?;
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);

    let missing = app
        .post_json("/api/tasks", &json!({ "title": "No details" }), Some(&token))
        .await?;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let response = app
        .delete(&format!("/api/tasks/{}", created.id), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app
        .patch_json(
            &format!("/api/tasks/{}/status", created.id),
            &json!({ "status": "completed" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.cleanup().await?;
    Ok(())
}
