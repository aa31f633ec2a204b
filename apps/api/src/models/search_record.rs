use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use super::candidate::{PipelineResult, SearchRequest};
use crate::pipeline::progress::ProgressUpdate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// One submitted search and everything known about its execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchRecord {
    pub id: Uuid,
    pub status: JobStatus,
    pub parameters: SearchRequest,
    pub progress: Option<ProgressUpdate>,
    pub result: Option<PipelineResult>,
    pub error_message: Option<String>,
    pub email_sent: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SearchRecord {
    pub fn pending(parameters: SearchRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            parameters,
            progress: None,
            result: None,
            error_message: None,
            email_sent: false,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, result: PipelineResult, email_sent: bool) {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.email_sent = email_sent;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, message: String) {
        self.status = JobStatus::Failed;
        self.error_message = Some(message);
        self.completed_at = Some(Utc::now());
    }
}

/// Row shape of the `searches` table. JSON columns are decoded into
/// [`SearchRecord`] via `TryFrom`.
#[derive(Debug, Clone, FromRow)]
pub struct SearchRow {
    pub id: Uuid,
    pub status: String,
    pub parameters: Value,
    pub progress: Option<Value>,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub email_sent: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<SearchRow> for SearchRecord {
    type Error = String;

    fn try_from(row: SearchRow) -> Result<Self, Self::Error> {
        let parameters = serde_json::from_value(row.parameters)
            .map_err(|e| format!("invalid parameters for search {}: {e}", row.id))?;
        let progress = row
            .progress
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| format!("invalid progress for search {}: {e}", row.id))?;
        let result = row
            .result
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| format!("invalid result for search {}: {e}", row.id))?;

        Ok(SearchRecord {
            id: row.id,
            status: row.status.parse()?,
            parameters,
            progress,
            result,
            error_message: row.error_message,
            email_sent: row.email_sent,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}
