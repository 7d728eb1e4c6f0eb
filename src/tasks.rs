use std::io;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::RwLock;
use ulid::Ulid;

/// An internal task or event owned by another system (CRM follow-ups,
/// detailing jobs, ...), shown alongside bookings on the calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: Ulid,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub resource_id: Option<Ulid>,
}

/// Read-only source of tasks for calendar merging.
#[async_trait]
pub trait TaskFeed: Send + Sync {
    /// Tasks intersecting `[start, end)`.
    async fn tasks_between(&self, start: NaiveDateTime, end: NaiveDateTime) -> io::Result<Vec<Task>>;
}

/// Feed for deployments with no task system attached.
#[derive(Debug, Default)]
pub struct NoTasks;

#[async_trait]
impl TaskFeed for NoTasks {
    async fn tasks_between(&self, _start: NaiveDateTime, _end: NaiveDateTime) -> io::Result<Vec<Task>> {
        Ok(Vec::new())
    }
}

/// In-memory feed, filled by whoever embeds the engine.
#[derive(Debug, Default)]
pub struct StaticTaskFeed {
    tasks: RwLock<Vec<Task>>,
}

impl StaticTaskFeed {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: RwLock::new(tasks),
        }
    }

    pub async fn push(&self, task: Task) {
        self.tasks.write().await.push(task);
    }
}

#[async_trait]
impl TaskFeed for StaticTaskFeed {
    async fn tasks_between(&self, start: NaiveDateTime, end: NaiveDateTime) -> io::Result<Vec<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .iter()
            .filter(|t| t.start < end && start < t.end)
            .cloned()
            .collect())
    }
}
