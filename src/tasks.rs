use std::path::{Path, PathBuf};

use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::utils::json::nullable;
use crate::validation::Priority;

pub const TASKS_KEY: &str = "dr-help-tasks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assignee: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub category: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assignee: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub category: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "nullable")]
    pub assignee: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<NaiveDate>>,
    pub category: Option<String>,
}

#[derive(Debug, Error)]
pub enum TaskStoreError {
    #[error("task {0} not found")]
    NotFound(String),
    #[error("task storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("task storage is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type TaskStoreResult<T> = Result<T, TaskStoreError>;

/// Keeps the whole task list as one JSON document under a fixed key in a
/// data directory. Every mutation rewrites the full list.
pub struct TaskStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TaskStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(format!("{TASKS_KEY}.json")),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn list(&self) -> TaskStoreResult<Vec<Task>> {
        let _guard = self.lock.lock().await;
        self.load_or_seed().await
    }

    pub async fn create(&self, new_task: NewTask) -> TaskStoreResult<Task> {
        let _guard = self.lock.lock().await;
        let mut tasks = self.load_or_seed().await?;

        let now = now_iso();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            title: new_task.title,
            description: new_task.description,
            status: new_task.status,
            priority: new_task.priority,
            assignee: new_task.assignee,
            due_date: new_task.due_date,
            category: new_task.category,
            created_at: now.clone(),
            updated_at: now,
        };

        tasks.insert(0, task.clone());
        self.save(&tasks).await?;
        Ok(task)
    }

    pub async fn update_status(&self, id: &str, status: TaskStatus) -> TaskStoreResult<Task> {
        self.update(
            id,
            TaskChanges {
                status: Some(status),
                ..TaskChanges::default()
            },
        )
        .await
    }

    pub async fn update(&self, id: &str, changes: TaskChanges) -> TaskStoreResult<Task> {
        let _guard = self.lock.lock().await;
        let mut tasks = self.load_or_seed().await?;

        let task = tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| TaskStoreError::NotFound(id.to_string()))?;

        if let Some(title) = changes.title {
            task.title = title;
        }
        if let Some(description) = changes.description {
            task.description = description;
        }
        if let Some(status) = changes.status {
            task.status = status;
        }
        if let Some(priority) = changes.priority {
            task.priority = priority;
        }
        if let Some(assignee) = changes.assignee {
            task.assignee = assignee;
        }
        if let Some(due_date) = changes.due_date {
            task.due_date = due_date;
        }
        if let Some(category) = changes.category {
            task.category = category;
        }
        task.updated_at = now_iso();

        let updated = task.clone();
        self.save(&tasks).await?;
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> TaskStoreResult<()> {
        let _guard = self.lock.lock().await;
        let mut tasks = self.load_or_seed().await?;

        let before = tasks.len();
        tasks.retain(|task| task.id != id);
        if tasks.len() == before {
            return Err(TaskStoreError::NotFound(id.to_string()));
        }

        self.save(&tasks).await
    }

    async fn load_or_seed(&self) -> TaskStoreResult<Vec<Task>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let seeded = sample_tasks();
                self.save(&seeded).await?;
                tracing::info!(path = %self.path.display(), count = seeded.len(), "seeded task store");
                Ok(seeded)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, tasks: &[Task]) -> TaskStoreResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(tasks)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn sample_tasks() -> Vec<Task> {
    let now = now_iso();
    let sample = |id: &str,
                  title: &str,
                  description: &str,
                  status: TaskStatus,
                  priority: Priority,
                  assignee: &str,
                  due: (i32, u32, u32),
                  category: &str| Task {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        status,
        priority,
        assignee: Some(assignee.to_string()),
        due_date: NaiveDate::from_ymd_opt(due.0, due.1, due.2),
        category: category.to_string(),
        created_at: now.clone(),
        updated_at: now.clone(),
    };

    vec![
        sample(
            "1",
            "환자 관리 시스템 UI 개선",
            "환자 정보 입력 폼의 사용성을 개선하고 반응형 디자인을 적용합니다.",
            TaskStatus::InProgress,
            Priority::High,
            "김개발",
            (2024, 7, 25),
            "development",
        ),
        sample(
            "2",
            "의료진 일정 관리 기능 추가",
            "의료진의 근무 일정과 휴가를 관리할 수 있는 캘린더 기능을 개발합니다.",
            TaskStatus::Pending,
            Priority::Medium,
            "이기획",
            (2024, 8, 1),
            "planning",
        ),
        sample(
            "3",
            "데이터베이스 백업 시스템 점검",
            "정기적인 데이터베이스 백업이 정상적으로 작동하는지 점검합니다.",
            TaskStatus::Completed,
            Priority::High,
            "박시스템",
            (2024, 7, 20),
            "maintenance",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: "check the nightly backup".to_string(),
            status: TaskStatus::Pending,
            priority: Priority::Low,
            assignee: None,
            due_date: None,
            category: "maintenance".to_string(),
        }
    }

    #[tokio::test]
    async fn missing_key_is_seeded_and_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());

        let tasks = store.list().await.unwrap();
        assert_eq!(tasks.len(), 3);
        assert!(store.path().exists());
        assert!(store.path().ends_with("dr-help-tasks.json"));
    }

    #[tokio::test]
    async fn created_tasks_are_prepended() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());

        let created = store.create(new_task("Rotate keys")).await.unwrap();
        let tasks = store.list().await.unwrap();
        assert_eq!(tasks[0], created);
        assert_eq!(tasks.len(), 4);
    }

    #[tokio::test]
    async fn persisted_list_reloads_identically() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());

        let created = store.create(new_task("Rotate keys")).await.unwrap();
        store
            .update_status(&created.id, TaskStatus::InProgress)
            .await
            .unwrap();
        store.delete("2").await.unwrap();

        let first = store.list().await.unwrap();
        let bytes_before = tokio::fs::read(store.path()).await.unwrap();

        let reopened = TaskStore::new(dir.path());
        let second = reopened.list().await.unwrap();
        assert_eq!(first, second);

        reopened.save(&second).await.unwrap();
        let bytes_after = tokio::fs::read(reopened.path()).await.unwrap();
        assert_eq!(bytes_before, bytes_after);
    }

    #[tokio::test]
    async fn partial_update_touches_only_given_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());
        let created = store.create(new_task("Rotate keys")).await.unwrap();

        let updated = store
            .update(
                &created.id,
                TaskChanges {
                    assignee: Some(Some("박시스템".to_string())),
                    priority: Some(Priority::High),
                    ..TaskChanges::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, created.title);
        assert_eq!(updated.assignee.as_deref(), Some("박시스템"));
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());

        assert!(matches!(
            store.delete("missing").await,
            Err(TaskStoreError::NotFound(_))
        ));
        assert!(matches!(
            store.update_status("missing", TaskStatus::Completed).await,
            Err(TaskStoreError::NotFound(_))
        ));
    }
}
