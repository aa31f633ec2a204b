//! Persistence for submitted searches.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::search_record::{SearchRecord, SearchRow};
use crate::pipeline::progress::ProgressUpdate;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt search record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait SearchRepository: Send + Sync {
    async fn upsert(&self, record: &SearchRecord) -> Result<(), RepositoryError>;
    async fn get(&self, id: Uuid) -> Result<Option<SearchRecord>, RepositoryError>;
    /// Most recent first.
    async fn list(&self, limit: usize) -> Result<Vec<SearchRecord>, RepositoryError>;
    async fn record_progress(&self, id: Uuid, progress: &ProgressUpdate) -> Result<(), RepositoryError>;
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory
// ────────────────────────────────────────────────────────────────────────────

/// Used when no database is configured. Records are lost on restart.
#[derive(Default)]
pub struct InMemorySearchRepository {
    records: RwLock<HashMap<Uuid, SearchRecord>>,
}

#[async_trait]
impl SearchRepository for InMemorySearchRepository {
    async fn upsert(&self, record: &SearchRecord) -> Result<(), RepositoryError> {
        self.records.write().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SearchRecord>, RepositoryError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list(&self, limit: usize) -> Result<Vec<SearchRecord>, RepositoryError> {
        let mut records: Vec<SearchRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn record_progress(&self, id: Uuid, progress: &ProgressUpdate) -> Result<(), RepositoryError> {
        if let Some(record) = self.records.write().await.get_mut(&id) {
            record.progress = Some(progress.clone());
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PostgreSQL
// ────────────────────────────────────────────────────────────────────────────

pub const SEARCHES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS searches (
    id              UUID PRIMARY KEY,
    status          TEXT NOT NULL,
    parameters      JSONB NOT NULL,
    progress        JSONB,
    result          JSONB,
    error_message   TEXT,
    email_sent      BOOLEAN NOT NULL DEFAULT FALSE,
    created_at      TIMESTAMPTZ NOT NULL,
    started_at      TIMESTAMPTZ,
    completed_at    TIMESTAMPTZ
)
"#;

pub struct PgSearchRepository {
    pool: PgPool,
}

impl PgSearchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SearchRepository for PgSearchRepository {
    async fn upsert(&self, record: &SearchRecord) -> Result<(), RepositoryError> {
        let parameters = serde_json::to_value(&record.parameters)?;
        let progress = record.progress.as_ref().map(serde_json::to_value).transpose()?;
        let result = record.result.as_ref().map(serde_json::to_value).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO searches
                (id, status, parameters, progress, result, error_message,
                 email_sent, created_at, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                progress = EXCLUDED.progress,
                result = EXCLUDED.result,
                error_message = EXCLUDED.error_message,
                email_sent = EXCLUDED.email_sent,
                started_at = EXCLUDED.started_at,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(record.id)
        .bind(record.status.as_str())
        .bind(parameters)
        .bind(progress)
        .bind(result)
        .bind(&record.error_message)
        .bind(record.email_sent)
        .bind(record.created_at)
        .bind(record.started_at)
        .bind(record.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SearchRecord>, RepositoryError> {
        let row: Option<SearchRow> = sqlx::query_as("SELECT * FROM searches WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(SearchRecord::try_from)
            .transpose()
            .map_err(RepositoryError::Corrupt)
    }

    async fn list(&self, limit: usize) -> Result<Vec<SearchRecord>, RepositoryError> {
        let rows: Vec<SearchRow> =
            sqlx::query_as("SELECT * FROM searches ORDER BY created_at DESC LIMIT $1")
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|row| SearchRecord::try_from(row).map_err(RepositoryError::Corrupt))
            .collect()
    }

    async fn record_progress(&self, id: Uuid, progress: &ProgressUpdate) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE searches SET progress = $2 WHERE id = $1")
            .bind(id)
            .bind(serde_json::to_value(progress)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
