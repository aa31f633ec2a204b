//! Drives one sourcing run end to end.
//!
//! Stages: expand the search radius until the target is met, fetch every
//! shortlisted profile with a single browser session, then extract and
//! evaluate each stored page. Per-candidate failures only drop that
//! candidate; the run fails only when search or the browser cannot start.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::evaluator::CandidateEvaluator;
use super::extractor::CvExtractor;
use super::progress::{PipelineStage, ProgressReporter, ProgressTracker};
use super::storage::{ResumeStore, StoredResume};
use super::{PipelineError, PipelineSettings};
use crate::browser::challenge::ChallengeSolver;
use crate::browser::fetcher::ResumeFetcher;
use crate::browser::{BrowserLauncher, BrowserProfile, BrowserSession};
use crate::llm_client::CompletionModel;
use crate::models::candidate::{CandidateRef, PipelineResult, QualifiedCandidate, SearchRequest};
use crate::retry::Sleeper;
use crate::search::pagination::search_at_radius;
use crate::search::radius::{CandidateSet, RadiusPlan};
use crate::search::{SearchApi, SearchCriteria};
use crate::session::{HeaderSet, SessionProvider};

const INIT_PERCENT: f32 = 5.0;
const SEARCH_DONE_PERCENT: f32 = 40.0;
const FETCH_DONE_PERCENT: f32 = 65.0;
const ANALYSIS_DONE_PERCENT: f32 = 95.0;

/// External collaborators of a run.
#[derive(Clone)]
pub struct PipelineDeps {
    pub search: Arc<dyn SearchApi>,
    pub sessions: Arc<dyn SessionProvider>,
    pub browser: Arc<dyn BrowserLauncher>,
    pub solver: Option<Arc<dyn ChallengeSolver>>,
    pub llm: Arc<dyn CompletionModel>,
    pub sleeper: Arc<dyn Sleeper>,
}

pub struct Pipeline {
    deps: PipelineDeps,
    settings: PipelineSettings,
}

fn stage_percent(start: f32, end: f32, done: usize, total: usize) -> f32 {
    if total == 0 {
        return end;
    }
    start + (end - start) * done as f32 / total as f32
}

impl Pipeline {
    pub fn new(deps: PipelineDeps, settings: PipelineSettings) -> Self {
        Self { deps, settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn run(
        &self,
        request: &SearchRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineResult, PipelineError> {
        request.validate().map_err(PipelineError::InvalidRequest)?;
        let started_at = Utc::now();
        let mut tracker = ProgressTracker::new(progress);
        tracker
            .emit(PipelineStage::Initializing, INIT_PERCENT, "Initializing search")
            .await;
        info!(
            keywords = %request.search_keywords,
            location = %request.location_or_empty(),
            target = request.target_candidates,
            max_radius_km = request.max_radius,
            "Pipeline run started"
        );

        let store = ResumeStore::create(self.settings.temp_root.as_deref())?;
        let outcome = self.run_stages(request, &store, &mut tracker, started_at).await;
        if let Err(e) = store.purge() {
            warn!("Could not purge resume store: {e}");
        }
        let result = outcome?;

        info!(
            total_found = result.total_found,
            processed = result.processed_count,
            qualified = result.qualified_count,
            "Pipeline run completed"
        );
        tracker
            .emit(
                PipelineStage::Completed,
                100.0,
                format!(
                    "{} of {} candidates qualified",
                    result.qualified_count, result.processed_count
                ),
            )
            .await;
        Ok(result)
    }

    async fn run_stages(
        &self,
        request: &SearchRequest,
        store: &ResumeStore,
        tracker: &mut ProgressTracker<'_>,
        started_at: DateTime<Utc>,
    ) -> Result<PipelineResult, PipelineError> {
        let headers = self.deps.sessions.headers().await;

        let found = self.search_candidates(request, &headers, tracker).await?;
        let total_found = found.len();
        let shortlist: Vec<CandidateRef> = found
            .into_vec()
            .into_iter()
            .take(request.target_candidates as usize)
            .collect();
        tracker
            .emit(
                PipelineStage::Searching,
                SEARCH_DONE_PERCENT,
                format!("Found {total_found} unique candidates, processing {}", shortlist.len()),
            )
            .await;

        if shortlist.is_empty() {
            return Ok(PipelineResult::new(Vec::new(), total_found, 0, started_at));
        }

        let stored = self.fetch_shortlist(&shortlist, &headers, store, tracker).await?;
        let qualified = self.analyze_stored(stored, request, store, tracker).await;

        Ok(PipelineResult::new(qualified, total_found, shortlist.len(), started_at))
    }

    /// Searches at growing radii until the target count is met or the radius
    /// ceiling is passed. Candidates are deduplicated by profile URL.
    async fn search_candidates(
        &self,
        request: &SearchRequest,
        headers: &HeaderSet,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<CandidateSet, PipelineError> {
        let criteria = SearchCriteria::new(
            &request.search_keywords,
            request.location_or_empty(),
            request.resume_last_updated_days,
        );
        let target = request.target_candidates as usize;
        let mut radii: Vec<u32> = RadiusPlan::new(self.settings.radius_increment_km, request.max_radius)
            .radii()
            .collect();
        if radii.is_empty() {
            radii.push(request.max_radius);
        }

        let mut found = CandidateSet::default();
        for (index, &radius_km) in radii.iter().enumerate() {
            let search = search_at_radius(
                self.deps.search.as_ref(),
                headers,
                &criteria,
                radius_km,
                target,
                &self.settings.pagination,
                self.deps.sleeper.as_ref(),
            )
            .await;

            if index == 0 && search.failed_immediately() {
                let reason = match search.stop_reason {
                    crate::search::pagination::StopReason::Failed(reason) => reason,
                    other => format!("{other:?}"),
                };
                return Err(PipelineError::SearchUnavailable(reason));
            }

            let new = found.absorb(search.candidates);
            tracker.candidates_found = found.len();
            tracker
                .emit(
                    PipelineStage::Searching,
                    stage_percent(INIT_PERCENT, SEARCH_DONE_PERCENT, index + 1, radii.len()),
                    format!("Radius {radius_km} km: {new} new, {} total", found.len()),
                )
                .await;

            if found.len() >= target {
                info!(radius_km, found = found.len(), "Target candidate count reached");
                break;
            }
        }
        Ok(found)
    }

    fn browser_profile(&self, headers: &HeaderSet) -> BrowserProfile {
        BrowserProfile {
            user_agent: headers.profile.user_agent.clone(),
            accept_language: headers.profile.accept_language.clone(),
            headless: self.settings.headless,
            page_load_timeout: self.settings.page_load_timeout,
            cookie_origin: Some(format!("{}/", headers.origin)),
            cookie_domain: self.settings.cookie_domain.clone(),
            cookies: headers.cookie_pairs(),
        }
    }

    /// Fetches every shortlisted profile into the store. The browser session
    /// is closed before returning, whatever happened while fetching.
    async fn fetch_shortlist(
        &self,
        shortlist: &[CandidateRef],
        headers: &HeaderSet,
        store: &ResumeStore,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<Vec<StoredResume>, PipelineError> {
        let session = self.deps.browser.launch(&self.browser_profile(headers)).await?;
        let stored = self
            .fetch_with_session(session.as_ref(), shortlist, store, tracker)
            .await;
        if let Err(e) = session.close().await {
            warn!("Browser session close failed: {e}");
        }
        Ok(stored)
    }

    async fn fetch_with_session(
        &self,
        session: &dyn BrowserSession,
        shortlist: &[CandidateRef],
        store: &ResumeStore,
        tracker: &mut ProgressTracker<'_>,
    ) -> Vec<StoredResume> {
        let fetcher = ResumeFetcher::new(
            session,
            self.deps.solver.as_deref(),
            self.deps.sleeper.as_ref(),
            &self.settings.fetch,
        );

        let mut stored = Vec::with_capacity(shortlist.len());
        for (index, candidate) in shortlist.iter().enumerate() {
            if index > 0 {
                self.settings.candidate_delay.pause(self.deps.sleeper.as_ref()).await;
            }
            match fetcher.fetch(candidate).await {
                Ok(page) => match store.save(&page) {
                    Ok(saved) => stored.push(saved),
                    Err(e) => warn!(url = %candidate.profile_url, "Could not store resume: {e}"),
                },
                Err(e) => warn!(url = %candidate.profile_url, "Skipping candidate: {e}"),
            }
            tracker
                .emit(
                    PipelineStage::Processing,
                    stage_percent(SEARCH_DONE_PERCENT, FETCH_DONE_PERCENT, index + 1, shortlist.len()),
                    format!("Fetched {}/{} profiles", index + 1, shortlist.len()),
                )
                .await;
        }
        info!(fetched = stored.len(), attempted = shortlist.len(), "Profile fetch finished");
        stored
    }

    async fn analyze_stored(
        &self,
        stored: Vec<StoredResume>,
        request: &SearchRequest,
        store: &ResumeStore,
        tracker: &mut ProgressTracker<'_>,
    ) -> Vec<QualifiedCandidate> {
        let extractor = CvExtractor::new(
            self.deps.llm.clone(),
            self.settings.extraction_model.clone(),
            self.settings.extraction_char_budget,
        );
        let evaluator = CandidateEvaluator::new(self.deps.llm.clone(), self.settings.evaluation_model.clone());

        let total = stored.len();
        let mut qualified = Vec::new();
        for (index, resume) in stored.into_iter().enumerate() {
            if let Some(candidate) = self
                .analyze_one(resume, request, store, &extractor, &evaluator)
                .await
            {
                qualified.push(candidate);
            }
            tracker.qualified = qualified.len();
            tracker
                .emit(
                    PipelineStage::Processing,
                    stage_percent(FETCH_DONE_PERCENT, ANALYSIS_DONE_PERCENT, index + 1, total),
                    format!("Evaluated {}/{} candidates", index + 1, total),
                )
                .await;
        }
        qualified
    }

    async fn analyze_one(
        &self,
        resume: StoredResume,
        request: &SearchRequest,
        store: &ResumeStore,
        extractor: &CvExtractor,
        evaluator: &CandidateEvaluator,
    ) -> Option<QualifiedCandidate> {
        let page = match store.take(resume) {
            Ok(page) => page,
            Err(e) => {
                warn!("Could not read stored resume: {e}");
                return None;
            }
        };
        let url = page.candidate.profile_url.clone();

        let cv = extractor.extract(&page).await?;
        drop(page);

        let evaluation = evaluator
            .evaluate(&cv, &url, &request.system_prompt, &request.user_prompt)
            .await;
        if !evaluation.qualified {
            return None;
        }
        info!(url = %url, name = %cv.name, "Candidate qualified");
        Some(QualifiedCandidate::new(cv, evaluation))
    }
}
