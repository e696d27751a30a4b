//! SQLite-based task store.

use super::{StoreError, TaskStore};
use crate::task::{Task, TaskCounts, TaskStatus};
use crate::util::timestamp_string;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
"#;

const TASK_COLUMNS: &str = "id, title, description, status, created_at, completed_at";

pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTaskStore {
    /// Open (or create) the database at `db_path` and apply the schema.
    pub async fn open(db_path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Backend(format!("Failed to create task store dir: {}", e))
            })?;
        }

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(|e| {
                StoreError::Backend(format!("Failed to open SQLite database: {}", e))
            })?;
            conn.execute_batch(SCHEMA)
                .map_err(|e| StoreError::Backend(format!("Failed to run schema: {}", e)))?;
            Ok::<_, StoreError>(conn)
        })
        .await??;

        tracing::info!("SQLite task store ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await?
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let id_str: String = row.get(0)?;
    let status_str: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let completed_at: Option<String> = row.get(5)?;

    Ok(Task {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        title: row.get(1)?,
        description: row.get(2)?,
        status: TaskStatus::parse(&status_str),
        created_at: parse_timestamp(&created_at).unwrap_or_default(),
        completed_at: completed_at.as_deref().and_then(parse_timestamp),
    })
}

fn fetch_task(conn: &Connection, id: Uuid) -> Result<Task, StoreError> {
    conn.query_row(
        &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
        params![id.to_string()],
        row_to_task,
    )
    .optional()?
    .ok_or(StoreError::NotFound(id))
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn create(&self, title: &str, description: Option<&str>) -> Result<Task, StoreError> {
        let task = Task::new(title, description)?;
        let row = task.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tasks (id, title, description, status, created_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
                params![
                    row.id.to_string(),
                    row.title,
                    row.description,
                    row.status.as_str(),
                    timestamp_string(row.created_at),
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(task)
    }

    async fn get(&self, id: Uuid) -> Result<Task, StoreError> {
        self.with_conn(move |conn| fetch_task(conn, id)).await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tasks ORDER BY created_at DESC, rowid DESC LIMIT ?1",
                TASK_COLUMNS
            ))?;
            let tasks = stmt
                .query_map(params![limit as i64], row_to_task)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
        .await
    }

    async fn complete(&self, id: Uuid) -> Result<Task, StoreError> {
        self.with_conn(move |conn| {
            let mut task = fetch_task(conn, id)?;
            if task.complete(Utc::now()) {
                // The status guard keeps a concurrent writer from moving
                // completed_at once it is set.
                conn.execute(
                    "UPDATE tasks SET status = 'completed', completed_at = ?1
                     WHERE id = ?2 AND status = 'pending'",
                    params![
                        task.completed_at.map(timestamp_string),
                        id.to_string()
                    ],
                )?;
            }
            fetch_task(conn, id)
        })
        .await
    }

    async fn append_description(&self, id: Uuid, text: &str) -> Result<(), StoreError> {
        let text = text.to_string();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE tasks SET description = description || ?1 WHERE id = ?2",
                params![text, id.to_string()],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn counts(&self) -> Result<TaskCounts, StoreError> {
        self.with_conn(|conn| {
            let (completed, pending): (i64, i64) = conn.query_row(
                "SELECT
                     COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                     COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0)
                 FROM tasks",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(TaskCounts::from_parts(completed as u64, pending as u64))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::exercise_store_contract;

    #[tokio::test]
    async fn sqlite_store_satisfies_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteTaskStore::open(dir.path().join("tasks.db"))
            .await
            .unwrap();
        assert!(store.is_persistent());
        exercise_store_contract(&store).await;
    }

    #[tokio::test]
    async fn tasks_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tasks.db");

        let created = {
            let store = SqliteTaskStore::open(path.clone()).await.unwrap();
            let task = store.create("Persist me", Some("body")).await.unwrap();
            store.complete(task.id).await.unwrap()
        };

        let store = SqliteTaskStore::open(path).await.unwrap();
        let loaded = store.get(created.id).await.unwrap();
        assert_eq!(loaded, created);
        assert_eq!(store.counts().await.unwrap().completed, 1);
    }

    #[tokio::test]
    async fn open_fails_on_unusable_path() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file.
        let result = SqliteTaskStore::open(dir.path().to_path_buf()).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }
}
