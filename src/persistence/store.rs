//! SQLite-based persistence store

use crate::core::ExecutionStatus;
use crate::persistence::{ExecutionSummary, JobSummary, PersistenceBackend};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SELECT_COLUMNS: &str =
    "SELECT id, workflow_name, event, status, started_at, completed_at, jobs FROM executions";

/// SQLite execution store
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    /// Open (creating if needed) the database at `db_path`, along with its directory
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        if let Some(dir) = db_path.as_ref().parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.as_ref().display()))?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Default database location in the user's data directory
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ci-runner")
            .join("history.db")
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        Self::new(Self::default_path()).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                workflow_name TEXT NOT NULL,
                event TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                jobs TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_workflow_name ON executions(workflow_name);
            CREATE INDEX IF NOT EXISTS idx_started_at ON executions(started_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize history schema")?;

        Ok(())
    }

    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn from_row(row: &SqliteRow) -> Result<ExecutionSummary> {
        let status: String = row.try_get("status")?;
        let jobs: String = row.try_get("jobs")?;

        Ok(ExecutionSummary {
            execution_id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
            workflow_name: row.try_get("workflow_name")?,
            event: row.try_get("event")?,
            status: status.parse::<ExecutionStatus>().map_err(|e| anyhow!(e))?,
            started_at: Self::from_naive(row.try_get("started_at")?),
            completed_at: row
                .try_get::<Option<NaiveDateTime>, _>("completed_at")?
                .map(Self::from_naive),
            jobs: serde_json::from_str::<Vec<JobSummary>>(&jobs)
                .context("Corrupt job results in history")?,
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteExecutionStore {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let jobs = serde_json::to_string(&execution.jobs)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO executions
            (id, workflow_name, event, status, started_at, completed_at, jobs)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(execution.execution_id.to_string())
        .bind(&execution.workflow_name)
        .bind(&execution.event)
        .bind(execution.status.as_str())
        .bind(Self::to_naive(execution.started_at))
        .bind(execution.completed_at.map(Self::to_naive))
        .bind(jobs)
        .execute(&self.pool)
        .await
        .context("Failed to save execution")?;

        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let row = sqlx::query(&format!("{} WHERE id = ?1", SELECT_COLUMNS))
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load execution")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_executions(&self, workflow_name: &str) -> Result<Vec<ExecutionSummary>> {
        let rows = sqlx::query(&format!(
            "{} WHERE workflow_name = ?1 ORDER BY started_at DESC",
            SELECT_COLUMNS
        ))
        .bind(workflow_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list executions")?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT workflow_name
            FROM executions
            ORDER BY workflow_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list workflows")?;

        rows.iter()
            .map(|row| Ok(row.try_get::<String, _>("workflow_name")?))
            .collect()
    }

    async fn delete_execution(&self, execution_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM executions WHERE id = ?1")
            .bind(execution_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete execution")?;

        Ok(result.rows_affected() > 0)
    }
}
