use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Initializing,
    Searching,
    Processing,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: PipelineStage,
    /// 0 to 100, never decreasing within a run.
    pub percent: f32,
    pub candidates_found: usize,
    pub qualified: usize,
    pub message: String,
}

#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, update: ProgressUpdate);
}

/// Discards every update.
pub struct NoopProgress;

#[async_trait]
impl ProgressReporter for NoopProgress {
    async fn report(&self, _update: ProgressUpdate) {}
}

/// Clamps reported percentages so they never go backwards.
pub(crate) struct ProgressTracker<'a> {
    reporter: &'a dyn ProgressReporter,
    last_percent: f32,
    pub candidates_found: usize,
    pub qualified: usize,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            reporter,
            last_percent: 0.0,
            candidates_found: 0,
            qualified: 0,
        }
    }

    pub async fn emit(&mut self, stage: PipelineStage, percent: f32, message: impl Into<String>) {
        let percent = percent.clamp(self.last_percent, 100.0);
        self.last_percent = percent;
        self.reporter
            .report(ProgressUpdate {
                stage,
                percent,
                candidates_found: self.candidates_found,
                qualified: self.qualified,
                message: message.into(),
            })
            .await;
    }
}
