//! In-process fakes for the pipeline's external seams.

use std::collections::{HashMap, VecDeque};
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::browser::challenge::{ChallengeRequest, ChallengeSolver, SolverError};
use crate::browser::fetcher::RESUME_CONTAINER_SELECTOR;
use crate::browser::{BrowserError, BrowserLauncher, BrowserProfile, BrowserSession};
use crate::llm_client::{CompletionModel, CompletionRequest, LlmError};
use crate::models::candidate::CandidateRef;
use crate::notify::{NotifyError, ShortlistEmail, ShortlistNotifier};
use crate::pipeline::progress::{ProgressReporter, ProgressUpdate};
use crate::pipeline::{PipelineDeps, PipelineSettings};
use crate::retry::{DelayRange, Sleeper};
use crate::search::pagination::PaginationPolicy;
use crate::search::{PageQuery, SearchApi, SearchError, SearchPage};
use crate::session::{HeaderProfile, HeaderSet, StaticSessionProvider, ACCEPT_LANGUAGES, USER_AGENTS};

pub const TEST_PROFILE_BASE: &str = "https://resumes.example.com/resume";

// ────────────────────────────────────────────────────────────────────────────
// Timing
// ────────────────────────────────────────────────────────────────────────────

/// Records requested sleeps and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    calls: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.calls.lock().unwrap().push(duration);
    }
}

#[derive(Default)]
pub struct RecordingProgress {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl RecordingProgress {
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressReporter for RecordingProgress {
    async fn report(&self, update: ProgressUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

/// Pipeline collaborators backed by fakes, with static headers and no solver.
pub fn fake_deps(search: ScriptedSearchApi, browser: FakeLauncher, llm: ScriptedModel) -> PipelineDeps {
    PipelineDeps {
        search: Arc::new(search),
        sessions: Arc::new(StaticSessionProvider::new(test_headers())),
        browser: Arc::new(browser),
        solver: None,
        llm: Arc::new(llm),
        sleeper: Arc::new(RecordingSleeper::default()),
    }
}

/// Production settings with every pause removed.
pub fn fast_settings(temp_root: &Path) -> PipelineSettings {
    PipelineSettings {
        pagination: PaginationPolicy {
            request_delay: DelayRange::ZERO,
            ..PaginationPolicy::default()
        },
        candidate_delay: DelayRange::ZERO,
        extraction_model: "test-model".to_string(),
        evaluation_model: "test-model".to_string(),
        temp_root: Some(temp_root.to_path_buf()),
        ..PipelineSettings::default()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Browser
// ────────────────────────────────────────────────────────────────────────────

/// What a fake browser shows for one URL.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub title: String,
    pub source: String,
    /// Visible body text.
    pub text: String,
    pub document_html: String,
    pub body_html: String,
    pub has_container: bool,
    /// Widget sitekey when the page is a challenge.
    pub sitekey: Option<String>,
    /// Page shown once a token has been injected.
    pub solved: Option<Box<FakePage>>,
}

impl FakePage {
    /// A rendered profile whose HTML is long enough to capture directly.
    pub fn resume(text: impl Into<String>) -> Self {
        let text = text.into();
        let body = format!(
            "<div class=\"rdp-resume-container\"><h1>Profile</h1><p>{text}</p></div>{}",
            "<div class=\"spacer\"></div>".repeat(40)
        );
        let document = format!("<html><head><title>Resume</title></head><body>{body}</body></html>");
        Self {
            title: "Resume".to_string(),
            source: document.clone(),
            text,
            document_html: document,
            body_html: body,
            has_container: true,
            sitekey: None,
            solved: None,
        }
    }

    /// The resume container is present but still shows the loading placeholder.
    pub fn loading() -> Self {
        let body = "<div class=\"rdp-resume-container\">Just a moment</div>".to_string();
        Self {
            title: "Resume".to_string(),
            source: format!("<html><body>{body}</body></html>"),
            text: "Just a moment".to_string(),
            document_html: format!("<html><body>{body}</body></html>"),
            body_html: body,
            has_container: true,
            sitekey: None,
            solved: None,
        }
    }

    pub fn challenge(sitekey: &str, solved: FakePage) -> Self {
        let body = format!("<div class=\"cf-turnstile\" data-sitekey=\"{sitekey}\"></div>");
        Self {
            title: "Just a moment...".to_string(),
            source: format!("<html><body>{body}</body></html>"),
            text: "Just a moment...".to_string(),
            document_html: format!("<html><body>{body}</body></html>"),
            body_html: body,
            has_container: false,
            sitekey: Some(sitekey.to_string()),
            solved: Some(Box::new(solved)),
        }
    }
}

/// Counters shared by a launcher and every session it creates.
#[derive(Default)]
struct SessionLog {
    visited: Mutex<Vec<String>>,
    injected: Mutex<Vec<String>>,
    stop_calls: AtomicUsize,
    closes: AtomicUsize,
}

/// Serves [`FakePage`]s by URL. Navigating to an unknown URL fails.
#[derive(Default)]
pub struct FakeSession {
    pages: HashMap<String, FakePage>,
    current: Mutex<Option<(String, FakePage)>>,
    cookies: Vec<(String, String)>,
    log: Arc<SessionLog>,
}

impl FakeSession {
    pub fn with_page(url: &str, page: FakePage) -> Self {
        Self::with_pages(vec![(url.to_string(), page)])
    }

    pub fn with_pages(pages: Vec<(String, FakePage)>) -> Self {
        Self {
            pages: pages.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn visited(&self) -> Vec<String> {
        self.log.visited.lock().unwrap().clone()
    }

    pub fn stop_calls(&self) -> usize {
        self.log.stop_calls.load(Ordering::SeqCst)
    }

    pub fn injected_tokens(&self) -> Vec<String> {
        self.log.injected.lock().unwrap().clone()
    }

    fn with_current<T>(&self, f: impl FnOnce(&str, &FakePage) -> T) -> Result<T, BrowserError> {
        let current = self.current.lock().unwrap();
        match current.as_ref() {
            Some((url, page)) => Ok(f(url, page)),
            None => Err(BrowserError::Command("no page loaded".to_string())),
        }
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.log.visited.lock().unwrap().push(url.to_string());
        let mut current = self.current.lock().unwrap();
        match self.pages.get(url) {
            Some(page) => {
                *current = Some((url.to_string(), page.clone()));
                Ok(())
            }
            None => {
                *current = None;
                Err(BrowserError::Command(format!("net::ERR_NAME_NOT_RESOLVED at {url}")))
            }
        }
    }

    async fn title(&self) -> Result<String, BrowserError> {
        self.with_current(|_, page| page.title.clone())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.with_current(|url, _| url.to_string())
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        self.with_current(|_, page| page.source.clone())
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError> {
        if script.contains("window.stop") {
            self.log.stop_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(Value::Null);
        }

        let mut current = self.current.lock().unwrap();
        let Some((_, page)) = current.as_mut() else {
            return Err(BrowserError::Command("no page loaded".to_string()));
        };

        if script.contains("cf-turnstile-response") {
            let token = args.first().and_then(Value::as_str).unwrap_or_default().to_string();
            self.log.injected.lock().unwrap().push(token);
            if let Some(solved) = page.solved.take() {
                *page = *solved;
            }
            return Ok(Value::Bool(true));
        }
        if script.contains("data-sitekey") {
            return Ok(match &page.sitekey {
                Some(sitekey) => json!({"sitekey": sitekey, "data": null, "action": null, "pagedata": null}),
                None => Value::Null,
            });
        }
        if script.contains("outerHTML") {
            return Ok(Value::String(page.document_html.clone()));
        }
        if script.contains("innerHTML") {
            return Ok(Value::String(page.body_html.clone()));
        }
        if script.contains("innerText") {
            return Ok(Value::String(page.text.clone()));
        }
        Ok(Value::Null)
    }

    async fn has_element(&self, css: &str) -> Result<bool, BrowserError> {
        let current = self.current.lock().unwrap();
        Ok(match current.as_ref() {
            Some((_, page)) if css == RESUME_CONTAINER_SELECTOR => page.has_container,
            Some(_) => true,
            None => false,
        })
    }

    async fn cookies(&self) -> Result<Vec<(String, String)>, BrowserError> {
        Ok(self.cookies.clone())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out [`FakeSession`]s over a fixed set of pages.
pub struct FakeLauncher {
    pages: Vec<(String, FakePage)>,
    fail: bool,
    cookies: Mutex<Vec<(String, String)>>,
    profiles: Mutex<Vec<BrowserProfile>>,
    launches: AtomicUsize,
    log: Arc<SessionLog>,
}

impl FakeLauncher {
    pub fn new(pages: Vec<(String, FakePage)>) -> Self {
        Self {
            pages,
            fail: false,
            cookies: Mutex::new(Vec::new()),
            profiles: Mutex::new(Vec::new()),
            launches: AtomicUsize::new(0),
            log: Arc::default(),
        }
    }

    /// Every launch fails as if the WebDriver endpoint were down.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn set_cookies(&self, cookies: Vec<(String, String)>) {
        *self.cookies.lock().unwrap() = cookies;
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.log.closes.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<String> {
        self.log.visited.lock().unwrap().clone()
    }

    pub fn profiles(&self) -> Vec<BrowserProfile> {
        self.profiles.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, profile: &BrowserProfile) -> Result<Box<dyn BrowserSession>, BrowserError> {
        if self.fail {
            return Err(BrowserError::Session("webdriver unreachable".to_string()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.profiles.lock().unwrap().push(profile.clone());
        Ok(Box::new(FakeSession {
            pages: self.pages.iter().cloned().collect(),
            current: Mutex::new(None),
            cookies: self.cookies.lock().unwrap().clone(),
            log: self.log.clone(),
        }))
    }
}

pub struct FakeSolver {
    token: Option<String>,
    requests: Mutex<Vec<ChallengeRequest>>,
}

impl FakeSolver {
    pub fn succeeding(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            token: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChallengeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChallengeSolver for FakeSolver {
    async fn solve(&self, request: &ChallengeRequest) -> Result<String, SolverError> {
        self.requests.lock().unwrap().push(request.clone());
        self.token
            .clone()
            .ok_or_else(|| SolverError::Rejected("ERROR_CAPTCHA_UNSOLVABLE".to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LLM
// ────────────────────────────────────────────────────────────────────────────

type ReplyHandler = Box<dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync>;

/// Returns queued replies in order, or computes them from the request.
/// An exhausted queue answers with [`LlmError::EmptyContent`].
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    handler: Option<ReplyHandler>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn replying(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            handler: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            replies: Mutex::new(VecDeque::new()),
            handler: Some(Box::new(handler)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(handler) = &self.handler {
            return handler(request);
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyContent))
    }
}

/// Extracts a fixed CV from any page and passes every candidate.
pub fn passing_model() -> ScriptedModel {
    ScriptedModel::with_handler(|request| {
        if request.system_text().contains("extraction specialist") {
            Ok(r#"{"name": "Anna Schmidt", "location": "Berlin", "skills": ["Rust"]}"#.to_string())
        } else {
            Ok("PASS".to_string())
        }
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Notification
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    fail: bool,
    sent: Mutex<Vec<(String, ShortlistEmail)>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, ShortlistEmail)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShortlistNotifier for RecordingNotifier {
    async fn send(&self, recipient: &str, email: &ShortlistEmail) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Address {
                address: recipient.to_string(),
                reason: "relay refused".to_string(),
            });
        }
        self.sent.lock().unwrap().push((recipient.to_string(), email.clone()));
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Search
// ────────────────────────────────────────────────────────────────────────────

/// Per-radius queues of search responses. An exhausted queue returns an
/// empty page.
#[derive(Default)]
pub struct ScriptedSearchApi {
    scripts: Mutex<HashMap<u32, VecDeque<Result<SearchPage, SearchError>>>>,
    calls: Mutex<Vec<(u32, u32)>>,
}

impl ScriptedSearchApi {
    pub fn push(&self, radius_km: u32, response: Result<SearchPage, SearchError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(radius_km)
            .or_default()
            .push_back(response);
    }

    /// `(radius_km, offset)` of every request, in order.
    pub fn calls(&self) -> Vec<(u32, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn radii_searched(&self) -> Vec<u32> {
        let mut radii: Vec<u32> = self.calls().into_iter().map(|(radius, _)| radius).collect();
        radii.dedup();
        radii
    }
}

#[async_trait]
impl SearchApi for ScriptedSearchApi {
    async fn search_page(&self, query: PageQuery<'_>, _headers: &HeaderSet) -> Result<SearchPage, SearchError> {
        self.calls.lock().unwrap().push((query.radius_km, query.offset));
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&query.radius_km)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(SearchPage::default()))
    }
}

/// Holds every request until the test releases it, then answers with an empty page.
#[derive(Default)]
pub struct GatedSearchApi {
    entered: Notify,
    release: Notify,
    calls: AtomicUsize,
}

impl GatedSearchApi {
    /// Resolves once a request is blocked inside the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Lets one blocked (or the next) request through.
    pub fn release_one(&self) {
        self.release.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchApi for GatedSearchApi {
    async fn search_page(&self, _query: PageQuery<'_>, _headers: &HeaderSet) -> Result<SearchPage, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(SearchPage::default())
    }
}

/// A search page holding candidates `{prefix}{i}` for every `i` in `range`.
pub fn page_of(prefix: &str, range: Range<u32>, has_next_page: Option<bool>) -> SearchPage {
    SearchPage {
        candidates: range
            .map(|i| CandidateRef::from_account_key(TEST_PROFILE_BASE, &format!("{prefix}{i}")))
            .collect(),
        has_next_page,
        total_matches: None,
        named_matches: 0,
        placeholder_matches: 0,
    }
}

pub fn test_headers() -> HeaderSet {
    HeaderSet::new(
        HeaderProfile {
            user_agent: USER_AGENTS[0].to_string(),
            accept_language: ACCEPT_LANGUAGES[0].to_string(),
            sec_ch_ua: None,
        },
        "CTK=test; INDEED_CSRF=token".to_string(),
        "test-api-key".to_string(),
        None,
        "https://resumes.example.com".to_string(),
    )
}
