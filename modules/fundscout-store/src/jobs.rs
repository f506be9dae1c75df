//! Discovery job lifecycle: pending → running → completed | failed.
//!
//! A job row is owned by exactly one discovery run; nothing else writes to
//! it. Terminal transitions guard on the current status so a completed or
//! failed job is never reopened.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::warn;
use uuid::Uuid;

use fundscout_common::{DiscoveryJob, JobKind, JobStatus};

use crate::error::{Result, StoreError};
use crate::PgStore;

#[derive(Debug, Clone, FromRow)]
struct JobRow {
    id: Uuid,
    kind: String,
    user_id: Option<Uuid>,
    query: String,
    status: String,
    result_count: i32,
    error: Option<String>,
    scheduled_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn into_domain(self) -> Result<DiscoveryJob> {
        let kind = JobKind::parse(&self.kind)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown job kind {}", self.kind)))?;
        let status = JobStatus::parse(&self.status)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown job status {}", self.status)))?;
        Ok(DiscoveryJob {
            id: self.id,
            kind,
            user_id: self.user_id,
            query: self.query,
            status,
            result_count: self.result_count,
            error: self.error,
            scheduled_at: self.scheduled_at,
            completed_at: self.completed_at,
        })
    }
}

impl PgStore {
    /// Create a pending job for a discovery run that is about to start.
    pub async fn create_job(
        &self,
        kind: JobKind,
        user_id: Option<Uuid>,
        query: &str,
    ) -> Result<DiscoveryJob> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO discovery_jobs (id, kind, user_id, query, status, scheduled_at)
            VALUES ($1, $2, $3, $4, 'pending', now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(kind.as_str())
        .bind(user_id)
        .bind(query)
        .fetch_one(self.pool())
        .await?;

        row.into_domain()
    }

    pub async fn mark_job_running(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE discovery_jobs SET status = 'running' WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            warn!(job_id = %id, "mark_job_running matched no pending job");
        }
        Ok(())
    }

    /// Terminal success. No-op if the job already reached a terminal state.
    pub async fn complete_job(&self, id: Uuid, result_count: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE discovery_jobs
            SET status = 'completed', result_count = $2, completed_at = now()
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id)
        .bind(result_count)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Terminal failure with message capture. No-op if already terminal.
    pub async fn fail_job(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE discovery_jobs
            SET status = 'failed', error = $2, completed_at = now()
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Option<DiscoveryJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM discovery_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        row.map(JobRow::into_domain).transpose()
    }
}
