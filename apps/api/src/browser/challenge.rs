//! Interstitial bot-check detection and third-party token solving.
//!
//! Solving is best-effort: every failure is reported as
//! [`ChallengeOutcome::Unsolved`] and the caller carries on with whatever the
//! page shows.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::BrowserSession;
use crate::retry::Sleeper;

pub const CHALLENGE_TITLE_MARKERS: &[&str] = &["just a moment"];
pub const CHALLENGE_SOURCE_MARKERS: &[&str] = &[
    "checking your browser",
    "cloudflare",
    "cf-turnstile",
    "turnstile",
    "challenge-platform",
    "ray id",
];
pub const CHALLENGE_HOST_PREFIX: &str = "https://challenges.cloudflare.com";

/// Installed after navigation. Captures widget parameters and the success
/// callback when the page renders a Turnstile widget.
pub const TURNSTILE_INTERCEPTOR_SCRIPT: &str = r#"
window.turnstileParams = window.turnstileParams || null;
const poll = setInterval(() => {
    if (window.turnstile) {
        clearInterval(poll);
        window.turnstile.render = (container, options) => {
            window.turnstileParams = {
                sitekey: options.sitekey,
                cData: options.cData,
                action: options.action,
                chlPageData: options.chlPageData
            };
            window.turnstileCallback = options.callback;
            return 'intercepted';
        };
    }
}, 50);
"#;

const EXTRACT_PARAMS_SCRIPT: &str = r#"
var p = window.turnstileParams;
if (p && p.sitekey) {
    return {sitekey: p.sitekey, data: p.cData || null, action: p.action || null, pagedata: p.chlPageData || null};
}
var el = document.querySelector('[data-sitekey]') || document.querySelector('.cf-turnstile');
if (!el || !el.getAttribute('data-sitekey')) { return null; }
return {
    sitekey: el.getAttribute('data-sitekey'),
    data: el.getAttribute('data-cdata'),
    action: el.getAttribute('data-action'),
    pagedata: null
};
"#;

/// Takes the token as `arguments[0]`.
pub const INJECT_TOKEN_SCRIPT: &str = r#"
var token = arguments[0];
var input = document.querySelector('[name="cf-turnstile-response"]');
if (input) { input.value = token; }
if (typeof window.turnstileCallback === 'function') { window.turnstileCallback(token); }
var form = document.querySelector('form');
if (form) { form.submit(); }
return true;
"#;

/// What the page looked like when we checked for a challenge.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub title: String,
    pub source: String,
    pub url: String,
}

pub fn is_challenge_page(snapshot: &PageSnapshot) -> bool {
    let title = snapshot.title.to_lowercase();
    let source = snapshot.source.to_lowercase();
    CHALLENGE_TITLE_MARKERS.iter().any(|m| title.contains(m))
        || CHALLENGE_SOURCE_MARKERS.iter().any(|m| source.contains(m))
        || snapshot.url.starts_with(CHALLENGE_HOST_PREFIX)
}

/// Parameters handed to the solving service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChallengeRequest {
    pub sitekey: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub pagedata: Option<String>,
}

/// Reads the result of the parameter extraction script. `None` when no widget
/// or no sitekey was found.
pub fn parse_challenge_params(value: &Value, page_url: &str) -> Option<ChallengeRequest> {
    if value.is_null() {
        return None;
    }
    let mut request: ChallengeRequest = serde_json::from_value(value.clone()).ok()?;
    if request.sitekey.trim().is_empty() {
        return None;
    }
    request.url = page_url.to_string();
    Some(request)
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Solver rejected the task: {0}")]
    Rejected(String),

    #[error("No solution after {polls} polls")]
    Timeout { polls: u32 },
}

#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    /// Returns the response token for the widget.
    async fn solve(&self, request: &ChallengeRequest) -> Result<String, SolverError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeOutcome {
    NotPresent,
    Solved,
    Unsolved(String),
}

/// Detects a challenge on the current page and, if a solver is available,
/// obtains and injects a token.
pub async fn resolve_challenge(
    session: &dyn BrowserSession,
    solver: Option<&dyn ChallengeSolver>,
    sleeper: &dyn Sleeper,
    target_url: &str,
    post_inject_wait: Duration,
) -> ChallengeOutcome {
    let snapshot = PageSnapshot {
        title: session.title().await.unwrap_or_default(),
        source: session.page_source().await.unwrap_or_default(),
        url: session.current_url().await.unwrap_or_default(),
    };
    if !is_challenge_page(&snapshot) {
        return ChallengeOutcome::NotPresent;
    }
    info!(url = %target_url, "Challenge page detected");

    let Some(solver) = solver else {
        return ChallengeOutcome::Unsolved("no solver configured".to_string());
    };

    let params = match session.execute(EXTRACT_PARAMS_SCRIPT, Vec::new()).await {
        Ok(value) => parse_challenge_params(&value, target_url),
        Err(e) => {
            debug!("Challenge parameter script failed: {e}");
            None
        }
    };
    let Some(params) = params else {
        return ChallengeOutcome::Unsolved("no challenge widget found".to_string());
    };

    let token = match solver.solve(&params).await {
        Ok(token) => token,
        Err(e) => return ChallengeOutcome::Unsolved(e.to_string()),
    };

    if let Err(e) = session
        .execute(INJECT_TOKEN_SCRIPT, vec![Value::String(token)])
        .await
    {
        return ChallengeOutcome::Unsolved(format!("token injection failed: {e}"));
    }
    sleeper.sleep(post_inject_wait).await;

    let still_challenged = session
        .current_url()
        .await
        .map(|u| u.starts_with(CHALLENGE_HOST_PREFIX))
        .unwrap_or(false);
    if still_challenged {
        debug!("Still on challenge host after injection, waiting once more");
        sleeper.sleep(post_inject_wait).await;
    }

    ChallengeOutcome::Solved
}

// ────────────────────────────────────────────────────────────────────────────
// 2Captcha-compatible solver
// ────────────────────────────────────────────────────────────────────────────

pub const DEFAULT_SOLVER_URL: &str = "https://2captcha.com";
const NOT_READY: &str = "CAPCHA_NOT_READY";

#[derive(Debug, Deserialize)]
struct SolverReply {
    #[serde(default)]
    status: u8,
    #[serde(default)]
    request: String,
}

/// Submits Turnstile tasks to a 2Captcha-style `in.php`/`res.php` API and polls
/// for the token.
pub struct TwoCaptchaSolver {
    client: Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    max_polls: u32,
    sleeper: Arc<dyn Sleeper>,
}

impl TwoCaptchaSolver {
    pub fn new(base_url: String, api_key: String, sleeper: Arc<dyn Sleeper>) -> Result<Self, SolverError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            poll_interval: Duration::from_secs(5),
            max_polls: 24,
            sleeper,
        })
    }

    async fn submit(&self, request: &ChallengeRequest) -> Result<String, SolverError> {
        let mut form = json!({
            "key": self.api_key,
            "method": "turnstile",
            "sitekey": request.sitekey,
            "pageurl": request.url,
            "json": 1,
        });
        for (key, value) in [
            ("data", &request.data),
            ("action", &request.action),
            ("pagedata", &request.pagedata),
        ] {
            if let Some(value) = value {
                form[key] = Value::String(value.clone());
            }
        }

        let reply: SolverReply = self
            .client
            .post(format!("{}/in.php", self.base_url))
            .form(&form)
            .send()
            .await?
            .json()
            .await?;
        if reply.status != 1 {
            return Err(SolverError::Rejected(reply.request));
        }
        Ok(reply.request)
    }

    async fn poll(&self, task_id: &str) -> Result<Option<String>, SolverError> {
        let reply: SolverReply = self
            .client
            .get(format!("{}/res.php", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("action", "get"),
                ("id", task_id),
                ("json", "1"),
            ])
            .send()
            .await?
            .json()
            .await?;
        if reply.status == 1 {
            return Ok(Some(reply.request));
        }
        if reply.request == NOT_READY {
            return Ok(None);
        }
        Err(SolverError::Rejected(reply.request))
    }
}

#[async_trait]
impl ChallengeSolver for TwoCaptchaSolver {
    async fn solve(&self, request: &ChallengeRequest) -> Result<String, SolverError> {
        let task_id = self.submit(request).await?;
        debug!(task_id = %task_id, "Challenge task submitted");

        for _ in 0..self.max_polls {
            self.sleeper.sleep(self.poll_interval).await;
            if let Some(token) = self.poll(&task_id).await? {
                info!("Challenge token received");
                return Ok(token);
            }
        }
        warn!(task_id = %task_id, "Challenge solver timed out");
        Err(SolverError::Timeout {
            polls: self.max_polls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePage, FakeSession, FakeSolver, RecordingSleeper};

    fn snapshot(title: &str, source: &str, url: &str) -> PageSnapshot {
        PageSnapshot {
            title: title.to_string(),
            source: source.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_detects_challenge_markers() {
        assert!(is_challenge_page(&snapshot("Just a moment...", "", "https://x")));
        assert!(is_challenge_page(&snapshot("", "<div class=\"cf-turnstile\">", "https://x")));
        assert!(is_challenge_page(&snapshot("", "Ray ID: 12ab", "https://x")));
        assert!(is_challenge_page(&snapshot(
            "",
            "",
            "https://challenges.cloudflare.com/cdn-cgi/challenge"
        )));
    }

    #[test]
    fn test_plain_page_is_not_challenge() {
        assert!(!is_challenge_page(&snapshot(
            "Anna Schmidt - Resume",
            "<div class=\"rdp-resume-container\">Senior Engineer</div>",
            "https://resumes.example.com/resume/abc"
        )));
    }

    #[test]
    fn test_parse_challenge_params() {
        let value = json!({"sitekey": "0x4AAA", "data": "cdata", "action": null, "pagedata": null});
        let req = parse_challenge_params(&value, "https://x/resume/1").unwrap();
        assert_eq!(req.sitekey, "0x4AAA");
        assert_eq!(req.url, "https://x/resume/1");
        assert_eq!(req.data.as_deref(), Some("cdata"));
        assert_eq!(req.action, None);

        assert!(parse_challenge_params(&Value::Null, "u").is_none());
        assert!(parse_challenge_params(&json!({"sitekey": ""}), "u").is_none());
    }

    #[tokio::test]
    async fn test_resolve_reports_not_present() {
        let session = FakeSession::with_page("https://x/resume/1", FakePage::resume("x".repeat(200)));
        let sleeper = RecordingSleeper::default();
        let outcome = resolve_challenge(&session, None, &sleeper, "https://x/resume/1", Duration::from_secs(8)).await;
        assert_eq!(outcome, ChallengeOutcome::NotPresent);
    }

    #[tokio::test]
    async fn test_resolve_injects_token_and_clears_challenge() {
        let url = "https://x/resume/1";
        let session = FakeSession::with_page(
            url,
            FakePage::challenge("0x4AAA", FakePage::resume("y".repeat(200))),
        );
        let solver = FakeSolver::succeeding("tok-123");
        let sleeper = RecordingSleeper::default();

        let outcome = resolve_challenge(&session, Some(&solver), &sleeper, url, Duration::from_secs(8)).await;

        assert_eq!(outcome, ChallengeOutcome::Solved);
        assert_eq!(solver.requests()[0].sitekey, "0x4AAA");
        assert_eq!(session.injected_tokens(), vec!["tok-123".to_string()]);
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(8)]);
    }

    #[tokio::test]
    async fn test_resolve_without_solver_is_unsolved() {
        let url = "https://x/resume/1";
        let session = FakeSession::with_page(url, FakePage::challenge("0x4AAA", FakePage::resume("y".repeat(200))));
        let sleeper = RecordingSleeper::default();
        let outcome = resolve_challenge(&session, None, &sleeper, url, Duration::from_secs(8)).await;
        assert!(matches!(outcome, ChallengeOutcome::Unsolved(_)));
    }

    #[tokio::test]
    async fn test_resolve_solver_failure_is_unsolved() {
        let url = "https://x/resume/1";
        let session = FakeSession::with_page(url, FakePage::challenge("0x4AAA", FakePage::resume("y".repeat(200))));
        let solver = FakeSolver::failing();
        let sleeper = RecordingSleeper::default();
        let outcome = resolve_challenge(&session, Some(&solver), &sleeper, url, Duration::from_secs(8)).await;
        assert!(matches!(outcome, ChallengeOutcome::Unsolved(_)));
        assert!(session.injected_tokens().is_empty());
    }
}
