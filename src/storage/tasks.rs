// src/storage/tasks.rs - In-memory task list
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Task, UpdateTaskRequest};

// Process-local; tasks are gone on restart
#[derive(Clone, Default)]
pub struct TaskStore {
    tasks: Arc<RwLock<HashMap<Uuid, Task>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All tasks, oldest first.
    pub async fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks
    }

    pub async fn get(&self, id: &Uuid) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    pub async fn create(&self, title: String) -> Task {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            title,
            completed: false,
            created_at: now,
            updated_at: now,
        };

        self.tasks.write().await.insert(task.id, task.clone());
        task
    }

    /// Apply the present fields of `changes`. `None` if the task does not exist.
    pub async fn update(&self, id: &Uuid, changes: UpdateTaskRequest) -> Option<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(id)?;

        if let Some(title) = changes.title {
            task.title = title;
        }
        if let Some(completed) = changes.completed {
            task.completed = completed;
        }
        task.updated_at = Utc::now();

        Some(task.clone())
    }

    pub async fn delete(&self, id: &Uuid) -> bool {
        self.tasks.write().await.remove(id).is_some()
    }
}
