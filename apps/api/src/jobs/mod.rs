//! Background execution of submitted searches.
//!
//! Each submission is persisted as a pending [`SearchRecord`] and run on its
//! own task. A semaphore caps how many pipeline runs hold a browser at once;
//! excess submissions wait in `pending` until a permit frees up.

pub mod repository;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::candidate::{PipelineResult, SearchRequest};
use crate::models::search_record::SearchRecord;
use crate::notify::{render_shortlist_email, SearchMetadata, ShortlistNotifier};
use crate::pipeline::progress::{ProgressReporter, ProgressUpdate};
use crate::pipeline::Pipeline;
use repository::{RepositoryError, SearchRepository};

/// Writes every progress update through to the repository and remembers the
/// latest one so the final record carries it.
struct RepositoryProgress {
    repository: Arc<dyn SearchRepository>,
    id: Uuid,
    latest: Mutex<Option<ProgressUpdate>>,
}

impl RepositoryProgress {
    fn latest(&self) -> Option<ProgressUpdate> {
        self.latest.lock().ok().and_then(|latest| latest.clone())
    }
}

#[async_trait]
impl ProgressReporter for RepositoryProgress {
    async fn report(&self, update: ProgressUpdate) {
        if let Err(e) = self.repository.record_progress(self.id, &update).await {
            warn!(id = %self.id, "Could not persist progress: {e}");
        }
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(update);
        }
    }
}

#[derive(Clone)]
pub struct JobRunner {
    pipeline: Arc<Pipeline>,
    repository: Arc<dyn SearchRepository>,
    notifier: Option<Arc<dyn ShortlistNotifier>>,
    permits: Arc<Semaphore>,
}

impl JobRunner {
    pub fn new(
        pipeline: Arc<Pipeline>,
        repository: Arc<dyn SearchRepository>,
        notifier: Option<Arc<dyn ShortlistNotifier>>,
        max_concurrent_runs: usize,
    ) -> Self {
        Self {
            pipeline,
            repository,
            notifier,
            permits: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
        }
    }

    /// Persists a pending record and starts the run in the background.
    pub async fn submit(&self, request: SearchRequest) -> Result<SearchRecord, RepositoryError> {
        let record = SearchRecord::pending(request);
        self.repository.upsert(&record).await?;
        info!(id = %record.id, keywords = %record.parameters.search_keywords, "Search submitted");

        let runner = self.clone();
        let queued = record.clone();
        tokio::spawn(async move {
            runner.execute(queued).await;
        });
        Ok(record)
    }

    /// Runs one search to completion and returns its terminal record.
    pub async fn execute(&self, mut record: SearchRecord) -> SearchRecord {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                record.mark_failed("job runner is shutting down".to_string());
                self.persist(&record).await;
                return record;
            }
        };

        record.mark_running();
        self.persist(&record).await;

        let progress = RepositoryProgress {
            repository: self.repository.clone(),
            id: record.id,
            latest: Mutex::new(record.progress.clone()),
        };
        let outcome = self.pipeline.run(&record.parameters, &progress).await;
        record.progress = progress.latest();

        match outcome {
            Ok(result) => {
                let email_sent = self.send_shortlist(&record, &result).await;
                info!(
                    id = %record.id,
                    qualified = result.qualified_count,
                    email_sent,
                    "Search completed"
                );
                record.mark_completed(result, email_sent);
            }
            Err(e) => {
                error!(id = %record.id, "Search failed: {e}");
                record.mark_failed(e.to_string());
            }
        }
        self.persist(&record).await;
        record
    }

    async fn persist(&self, record: &SearchRecord) {
        if let Err(e) = self.repository.upsert(record).await {
            error!(id = %record.id, status = %record.status, "Could not persist search record: {e}");
        }
    }

    /// Sends the shortlist when there is someone to send it to and something
    /// to send. Delivery failures are logged and reported as not sent.
    async fn send_shortlist(&self, record: &SearchRecord, result: &PipelineResult) -> bool {
        let Some(notifier) = &self.notifier else {
            return false;
        };
        let Some(recipient) = record.parameters.recipient() else {
            return false;
        };
        if result.candidates.is_empty() {
            info!(id = %record.id, "No qualified candidates, skipping email");
            return false;
        }

        let params = &record.parameters;
        let meta = SearchMetadata {
            search_name: params.display_name().to_string(),
            keywords: params.search_keywords.clone(),
            location: params.location_or_empty().to_string(),
            max_radius_km: params.max_radius,
            resume_age_days: params.resume_last_updated_days,
            created_at: record.created_at,
        };
        let email = render_shortlist_email(result, &meta);
        match notifier.send(recipient, &email).await {
            Ok(()) => true,
            Err(e) => {
                warn!(id = %record.id, recipient, "Shortlist email failed: {e}");
                false
            }
        }
    }
}
