//! The sourcing pipeline: search, fetch, extract, evaluate.

pub mod evaluator;
pub mod extractor;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod storage;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::browser::fetcher::FetchSettings;
use crate::browser::BrowserError;
use crate::llm_client::DEFAULT_MODEL;
use crate::retry::DelayRange;
use crate::search::pagination::PaginationPolicy;

pub use orchestrator::{Pipeline, PipelineDeps};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid search request: {0}")]
    InvalidRequest(String),

    #[error("Search unavailable: {0}")]
    SearchUnavailable(String),

    #[error("Browser unavailable: {0}")]
    Browser(#[from] BrowserError),

    #[error("Resume storage error: {0}")]
    Storage(#[from] std::io::Error),
}

/// Tunables for one pipeline instance. Defaults match production pacing.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub radius_increment_km: u32,
    pub pagination: PaginationPolicy,
    pub fetch: FetchSettings,
    pub headless: bool,
    pub page_load_timeout: Duration,
    /// Domain applied to cookies seeded into the browser, e.g. `.indeed.com`.
    pub cookie_domain: Option<String>,
    /// Pause between consecutive profile fetches.
    pub candidate_delay: DelayRange,
    pub extraction_model: String,
    pub evaluation_model: String,
    pub extraction_char_budget: usize,
    /// Parent of the per-run scratch directory. System temp dir when `None`.
    pub temp_root: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            radius_increment_km: 5,
            pagination: PaginationPolicy::default(),
            fetch: FetchSettings::default(),
            headless: true,
            page_load_timeout: Duration::from_secs(30),
            cookie_domain: Some(".indeed.com".to_string()),
            candidate_delay: DelayRange::between(Duration::from_secs(1), Duration::from_secs(3)),
            extraction_model: DEFAULT_MODEL.to_string(),
            evaluation_model: DEFAULT_MODEL.to_string(),
            extraction_char_budget: extractor::DEFAULT_CHAR_BUDGET,
            temp_root: None,
        }
    }
}
