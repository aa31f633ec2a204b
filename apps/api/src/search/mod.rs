//! Candidate discovery against the resume-search API.

pub mod client;
pub mod pagination;
pub mod radius;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::candidate::CandidateRef;
use crate::session::HeaderSet;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid search response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid request headers: {0}")]
    Headers(String),
}

/// Filters shared by every page request of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    pub keywords: String,
    pub location: String,
    /// Lower bound on resume modification time, epoch milliseconds as a string.
    pub modified_after_ms: String,
}

impl SearchCriteria {
    pub fn new(keywords: &str, location: &str, resume_age_days: u32) -> Self {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(resume_age_days));
        Self {
            keywords: keywords.trim().to_string(),
            location: location.trim().to_string(),
            modified_after_ms: cutoff.timestamp_millis().to_string(),
        }
    }

    pub fn page(&self, radius_km: u32, offset: u32, limit: u32) -> PageQuery<'_> {
        PageQuery {
            criteria: self,
            radius_km,
            offset,
            limit,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageQuery<'a> {
    pub criteria: &'a SearchCriteria,
    pub radius_km: u32,
    pub offset: u32,
    pub limit: u32,
}

/// One page of results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub candidates: Vec<CandidateRef>,
    /// `None` when the response omitted paging info.
    pub has_next_page: Option<bool>,
    pub total_matches: Option<u64>,
    /// Matches that carried a display name.
    pub named_matches: usize,
    /// Named matches whose name is demo data, a sign of an unauthenticated session.
    pub placeholder_matches: usize,
}

impl SearchPage {
    /// True when every named match on the page is a placeholder.
    pub fn looks_like_placeholder_data(&self) -> bool {
        self.named_matches > 0 && self.placeholder_matches == self.named_matches
    }
}

#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn search_page(&self, query: PageQuery<'_>, headers: &HeaderSet) -> Result<SearchPage, SearchError>;
}
