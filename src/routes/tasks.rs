use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AppResult;
use crate::state::AppState;
use crate::tasks::{NewTask, Task, TaskChanges, TaskStatus};
use crate::validation::{parse_priority, require_non_empty, RequiredFields};

#[derive(Deserialize)]
pub struct TaskListQuery {
    pub status: Option<TaskStatus>,
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub status: Option<TaskStatus>,
    pub assignee: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub status: TaskStatus,
}

#[derive(Serialize, Default, Debug, PartialEq, Eq)]
pub struct TaskCounts {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl TaskCounts {
    pub fn tally(tasks: &[Task]) -> Self {
        tasks.iter().fold(TaskCounts::default(), |mut counts, task| {
            counts.total += 1;
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Completed => counts.completed += 1,
            }
            counts
        })
    }
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskListQuery>,
) -> AppResult<Json<Vec<Task>>> {
    let tasks = state.tasks.list().await?;
    let filtered = match params.status {
        Some(status) => tasks.into_iter().filter(|task| task.status == status).collect(),
        None => tasks,
    };
    Ok(Json(filtered))
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(payload): Json<CreateTaskRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    RequiredFields::new()
        .check("title", payload.title.as_deref())
        .check("description", payload.description.as_deref())
        .check("priority", payload.priority.as_deref())
        .check("category", payload.category.as_deref())
        .finish()?;

    let priority = parse_priority(payload.priority.as_deref().unwrap_or_default())?;
    let new_task = NewTask {
        title: payload.title.unwrap_or_default().trim().to_string(),
        description: payload.description.unwrap_or_default().trim().to_string(),
        status: payload.status.unwrap_or(TaskStatus::Pending),
        priority,
        assignee: payload
            .assignee
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()),
        due_date: payload.due_date,
        category: payload.category.unwrap_or_default().trim().to_string(),
    };

    let task = state.tasks.create(new_task).await?;
    info!(task_id = %task.id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(payload): Json<UpdateTaskStatusRequest>,
) -> AppResult<Json<Task>> {
    let task = state.tasks.update_status(&task_id, payload.status).await?;
    info!(task_id = %task.id, status = task.status.as_str(), "task status updated");
    Ok(Json(task))
}

pub async fn update_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(mut changes): Json<TaskChanges>,
) -> AppResult<Json<Task>> {
    if let Some(title) = changes.title.as_deref() {
        changes.title = Some(require_non_empty("title", title)?.to_string());
    }
    if let Some(category) = changes.category.as_deref() {
        changes.category = Some(require_non_empty("category", category)?.to_string());
    }
    if let Some(description) = changes.description.as_deref() {
        changes.description = Some(require_non_empty("description", description)?.to_string());
    }

    let task = state.tasks.update(&task_id, changes).await?;
    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<StatusCode> {
    state.tasks.delete(&task_id).await?;
    info!(task_id = %task_id, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}
