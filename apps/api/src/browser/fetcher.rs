//! Fetches the rendered HTML of one candidate profile.
//!
//! Per candidate: navigate, settle, resolve any challenge, wait for the resume
//! container to hold real text, then capture the DOM. Any failure stops the
//! page load and yields a [`FetchFailure`] for that candidate only.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::challenge::{resolve_challenge, ChallengeOutcome, ChallengeSolver, TURNSTILE_INTERCEPTOR_SCRIPT};
use super::BrowserSession;
use crate::models::candidate::{CandidateRef, ResumePage};
use crate::retry::{retry_bounded, Sleeper};

pub const RESUME_CONTAINER_SELECTOR: &str = ".rdp-resume-container";
/// Loading placeholders shown by the profile page before the resume renders.
pub const LOADING_PLACEHOLDERS: &[&str] = &["Just a moment", "Nur einen Moment"];
pub const MIN_READY_TEXT_CHARS: usize = 100;
pub const MIN_CAPTURE_HTML_CHARS: usize = 1000;

const BODY_TEXT_SCRIPT: &str = "return document.body ? document.body.innerText : '';";
const DOCUMENT_HTML_SCRIPT: &str = "return document.documentElement.outerHTML;";
const BODY_HTML_SCRIPT: &str = "return document.body ? document.body.innerHTML : '';";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    MissingContainer,
    Loading,
    TooShort,
}

/// Classifies the visible text of a profile page.
pub fn content_readiness(text: &str) -> Readiness {
    let trimmed = text.trim();
    if LOADING_PLACEHOLDERS.iter().any(|p| trimmed.contains(p)) {
        return Readiness::Loading;
    }
    if trimmed.chars().count() < MIN_READY_TEXT_CHARS {
        return Readiness::TooShort;
    }
    Readiness::Ready
}

#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("resume content at {url} not ready after {attempts} attempts ({last:?})")]
    ContentTimeout {
        url: String,
        attempts: u32,
        last: Readiness,
    },

    #[error("could not capture HTML for {url}: {reason}")]
    Capture { url: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Pause after navigation before looking at the page.
    pub settle_delay: Duration,
    pub content_attempts: u32,
    pub attempt_delay: Duration,
    pub post_inject_wait: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(3),
            content_attempts: 3,
            attempt_delay: Duration::from_secs(5),
            post_inject_wait: Duration::from_secs(8),
        }
    }
}

pub struct ResumeFetcher<'a> {
    session: &'a dyn BrowserSession,
    solver: Option<&'a dyn ChallengeSolver>,
    sleeper: &'a dyn Sleeper,
    settings: &'a FetchSettings,
}

impl<'a> ResumeFetcher<'a> {
    pub fn new(
        session: &'a dyn BrowserSession,
        solver: Option<&'a dyn ChallengeSolver>,
        sleeper: &'a dyn Sleeper,
        settings: &'a FetchSettings,
    ) -> Self {
        Self {
            session,
            solver,
            sleeper,
            settings,
        }
    }

    pub async fn fetch(&self, candidate: &CandidateRef) -> Result<ResumePage, FetchFailure> {
        let result = self.fetch_inner(candidate).await;
        if result.is_err() {
            self.session.stop_loading().await;
        }
        result
    }

    async fn fetch_inner(&self, candidate: &CandidateRef) -> Result<ResumePage, FetchFailure> {
        let url = candidate.profile_url.as_str();

        self.session
            .goto(url)
            .await
            .map_err(|e| FetchFailure::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if let Err(e) = self.session.execute(TURNSTILE_INTERCEPTOR_SCRIPT, Vec::new()).await {
            debug!("Interceptor install failed: {e}");
        }
        self.sleeper.sleep(self.settings.settle_delay).await;

        match resolve_challenge(
            self.session,
            self.solver,
            self.sleeper,
            url,
            self.settings.post_inject_wait,
        )
        .await
        {
            ChallengeOutcome::NotPresent => {}
            ChallengeOutcome::Solved => info!(url, "Challenge solved"),
            ChallengeOutcome::Unsolved(reason) => {
                warn!(url, reason = %reason, "Challenge not solved, continuing best-effort")
            }
        }

        self.wait_for_content(url).await?;
        let html = self.capture(url).await?;

        Ok(ResumePage {
            candidate: candidate.clone(),
            html,
        })
    }

    async fn wait_for_content(&self, url: &str) -> Result<(), FetchFailure> {
        let session = self.session;
        let attempts = self.settings.content_attempts;

        retry_bounded(
            attempts,
            self.settings.attempt_delay,
            self.sleeper,
            |attempt| async move {
                if !session.has_element(RESUME_CONTAINER_SELECTOR).await.unwrap_or(false) {
                    debug!(url, attempt, "Resume container not present yet");
                    return Err(Readiness::MissingContainer);
                }
                let text = session.execute_string(BODY_TEXT_SCRIPT).await.unwrap_or_default();
                match content_readiness(&text) {
                    Readiness::Ready => Ok(()),
                    other => {
                        debug!(url, attempt, readiness = ?other, "Resume content not ready");
                        Err(other)
                    }
                }
            },
        )
        .await
        .map_err(|last| FetchFailure::ContentTimeout {
            url: url.to_string(),
            attempts: attempts.max(1),
            last,
        })
    }

    /// Full document HTML, falling back to the body and then to the raw page
    /// source when the rendered DOM looks truncated.
    async fn capture(&self, url: &str) -> Result<String, FetchFailure> {
        let html = self
            .session
            .execute_string(DOCUMENT_HTML_SCRIPT)
            .await
            .unwrap_or_default();
        if html.len() >= MIN_CAPTURE_HTML_CHARS {
            return Ok(html);
        }

        let body = self.session.execute_string(BODY_HTML_SCRIPT).await.unwrap_or_default();
        if body.len() >= MIN_CAPTURE_HTML_CHARS {
            return Ok(body);
        }

        let source = self
            .session
            .page_source()
            .await
            .map_err(|e| FetchFailure::Capture {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        let best = [source, body, html]
            .into_iter()
            .max_by_key(|s| s.len())
            .unwrap_or_default();
        if best.trim().is_empty() {
            return Err(FetchFailure::Capture {
                url: url.to_string(),
                reason: "page is empty".to_string(),
            });
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePage, FakeSession, FakeSolver, RecordingSleeper};

    fn candidate(url: &str) -> CandidateRef {
        CandidateRef {
            account_key: "k1".to_string(),
            profile_url: url.to_string(),
            display_name: None,
        }
    }

    fn settings() -> FetchSettings {
        FetchSettings::default()
    }

    #[test]
    fn test_readiness_predicate() {
        assert_eq!(content_readiness("Just a moment"), Readiness::Loading);
        assert_eq!(content_readiness("Nur einen Moment..."), Readiness::Loading);
        assert_eq!(content_readiness(&"a".repeat(40)), Readiness::TooShort);
        assert_eq!(content_readiness(&"a".repeat(99)), Readiness::TooShort);
        assert_eq!(content_readiness(&"a".repeat(150)), Readiness::Ready);
        // Placeholder wins even when the page is long
        let long_loading = format!("{} Just a moment", "a".repeat(300));
        assert_eq!(content_readiness(&long_loading), Readiness::Loading);
    }

    #[tokio::test]
    async fn test_fetch_ready_page() {
        let url = "https://x/resume/1";
        let session = FakeSession::with_page(url, FakePage::resume("Senior engineer ".repeat(20)));
        let sleeper = RecordingSleeper::default();
        let settings = settings();
        let fetcher = ResumeFetcher::new(&session, None, &sleeper, &settings);

        let page = fetcher.fetch(&candidate(url)).await.unwrap();

        assert!(page.html.contains("rdp-resume-container"));
        assert_eq!(page.candidate.profile_url, url);
        assert_eq!(session.visited(), vec![url.to_string()]);
        assert_eq!(session.stop_calls(), 0);
        // Only the settle delay
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(3)]);
    }

    #[tokio::test]
    async fn test_fetch_through_challenge() {
        let url = "https://x/resume/2";
        let session = FakeSession::with_page(
            url,
            FakePage::challenge("0x4AAA", FakePage::resume("Data scientist ".repeat(20))),
        );
        let solver = FakeSolver::succeeding("token");
        let sleeper = RecordingSleeper::default();
        let settings = settings();
        let fetcher = ResumeFetcher::new(&session, Some(&solver), &sleeper, &settings);

        let page = fetcher.fetch(&candidate(url)).await.unwrap();
        assert!(page.html.contains("Data scientist"));
        assert_eq!(session.injected_tokens(), vec!["token".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_times_out_when_content_never_loads() {
        let url = "https://x/resume/3";
        let session = FakeSession::with_page(url, FakePage::loading());
        let sleeper = RecordingSleeper::default();
        let settings = settings();
        let fetcher = ResumeFetcher::new(&session, None, &sleeper, &settings);

        let err = fetcher.fetch(&candidate(url)).await.unwrap_err();

        match err {
            FetchFailure::ContentTimeout { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(last, Readiness::Loading);
            }
            other => panic!("unexpected failure: {other}"),
        }
        assert_eq!(session.stop_calls(), 1);
        // settle + two waits between the three attempts
        assert_eq!(
            sleeper.calls(),
            vec![Duration::from_secs(3), Duration::from_secs(5), Duration::from_secs(5)]
        );
    }

    #[tokio::test]
    async fn test_navigation_failure_stops_loading() {
        let session = FakeSession::default();
        let sleeper = RecordingSleeper::default();
        let settings = settings();
        let fetcher = ResumeFetcher::new(&session, None, &sleeper, &settings);

        let err = fetcher.fetch(&candidate("https://x/resume/missing")).await.unwrap_err();
        assert!(matches!(err, FetchFailure::Navigation { .. }));
        assert_eq!(session.stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_capture_falls_back_when_document_html_is_short() {
        let url = "https://x/resume/4";
        let mut page = FakePage::resume("Backend developer ".repeat(20));
        page.document_html = "<html></html>".to_string();
        let session = FakeSession::with_page(url, page);
        let sleeper = RecordingSleeper::default();
        let settings = settings();
        let fetcher = ResumeFetcher::new(&session, None, &sleeper, &settings);

        let fetched = fetcher.fetch(&candidate(url)).await.unwrap();
        assert!(fetched.html.contains("Backend developer"));
        assert!(fetched.html.len() >= MIN_CAPTURE_HTML_CHARS);
    }
}
