//! Request headers that make search calls look like an authenticated browser.
//!
//! A [`HeaderSet`] is chosen once per run and reused for every search request
//! and for seeding the browser's cookies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE,
    COOKIE, ORIGIN, REFERER, USER_AGENT,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::browser::{BrowserError, BrowserLauncher, BrowserProfile, BrowserSession};
use crate::retry::{retry_bounded, Sleeper};

pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:140.0) Gecko/20100101 Firefox/140.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:139.0) Gecko/20100101 Firefox/139.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

pub const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9,de;q=0.8",
    "en-US,en;q=0.5",
    "de-DE,de;q=0.9,en;q=0.8",
    "en-GB,en;q=0.9,de;q=0.8",
];

pub const SEC_CH_UA_VALUES: &[&str] = &[
    r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#,
    r#""Not A(Brand";v="99", "Google Chrome";v="121", "Chromium";v="121""#,
    r#""Chromium";v="119", "Not?A_Brand";v="24""#,
];

const API_KEY_HEADER: &str = "indeed-api-key";
const CLIENT_TOKEN_HEADER: &str = "indeed-ctk";
const SUB_APP_HEADER: &str = "indeed-client-sub-app";
const SUB_APP_COMPONENT_HEADER: &str = "indeed-client-sub-app-component";

/// Browser identity presented on every request in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderProfile {
    pub user_agent: String,
    pub accept_language: String,
    /// Client hints, only sent alongside a Chrome user agent.
    pub sec_ch_ua: Option<String>,
}

impl HeaderProfile {
    pub fn random() -> Self {
        let user_agent = fastrand::choice(USER_AGENTS).copied().unwrap_or(USER_AGENTS[0]);
        let accept_language = fastrand::choice(ACCEPT_LANGUAGES)
            .copied()
            .unwrap_or(ACCEPT_LANGUAGES[0]);
        let sec_ch_ua = if user_agent.contains("Chrome") {
            fastrand::choice(SEC_CH_UA_VALUES).map(|s| s.to_string())
        } else {
            None
        };
        Self {
            user_agent: user_agent.to_string(),
            accept_language: accept_language.to_string(),
            sec_ch_ua,
        }
    }
}

/// Everything needed to authenticate against the search site for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSet {
    pub profile: HeaderProfile,
    /// Serialized `name=value; name=value` cookie header.
    pub cookie: String,
    pub api_key: String,
    pub client_token: Option<String>,
    /// Site origin, e.g. `https://resumes.indeed.com`.
    pub origin: String,
    trace_id: u64,
    parent_id: u64,
}

impl HeaderSet {
    pub fn new(
        profile: HeaderProfile,
        cookie: String,
        api_key: String,
        client_token: Option<String>,
        origin: String,
    ) -> Self {
        Self {
            profile,
            cookie,
            api_key,
            client_token,
            origin: origin.trim_end_matches('/').to_string(),
            trace_id: fastrand::u64(100_000_000_000_000_000..1_000_000_000_000_000_000),
            parent_id: fastrand::u64(1_000_000_000_000_000_000..u64::MAX),
        }
    }

    pub fn with_cookie(mut self, cookie: String) -> Self {
        self.cookie = cookie;
        self
    }

    /// Splits the cookie header into name/value pairs, skipping malformed entries.
    pub fn cookie_pairs(&self) -> Vec<(String, String)> {
        self.cookie
            .split(';')
            .filter_map(|part| part.trim().split_once('='))
            .filter(|(name, _)| !name.trim().is_empty())
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .collect()
    }

    pub fn to_header_map(&self) -> Result<HeaderMap, InvalidHeaderValue> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(&self.profile.user_agent)?);
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_str(&self.profile.accept_language)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ORIGIN, HeaderValue::from_str(&self.origin)?);
        headers.insert(REFERER, HeaderValue::from_str(&format!("{}/", self.origin))?);
        if !self.cookie.is_empty() {
            headers.insert(COOKIE, HeaderValue::from_str(&self.cookie)?);
        }

        headers.insert(HeaderName::from_static(API_KEY_HEADER), HeaderValue::from_str(&self.api_key)?);
        if let Some(token) = &self.client_token {
            headers.insert(HeaderName::from_static(CLIENT_TOKEN_HEADER), HeaderValue::from_str(token)?);
        }
        headers.insert(
            HeaderName::from_static(SUB_APP_HEADER),
            HeaderValue::from_static("rezemp-discovery"),
        );
        headers.insert(
            HeaderName::from_static(SUB_APP_COMPONENT_HEADER),
            HeaderValue::from_static("./Root"),
        );
        headers.insert(
            HeaderName::from_static("x-datadog-origin"),
            HeaderValue::from_static("rum"),
        );
        headers.insert(
            HeaderName::from_static("x-datadog-sampling-priority"),
            HeaderValue::from_static("0"),
        );
        headers.insert(
            HeaderName::from_static("x-datadog-trace-id"),
            HeaderValue::from(self.trace_id),
        );
        headers.insert(
            HeaderName::from_static("x-datadog-parent-id"),
            HeaderValue::from(self.parent_id),
        );
        headers.insert(HeaderName::from_static("sec-fetch-dest"), HeaderValue::from_static("empty"));
        headers.insert(HeaderName::from_static("sec-fetch-mode"), HeaderValue::from_static("cors"));
        headers.insert(HeaderName::from_static("sec-fetch-site"), HeaderValue::from_static("same-site"));

        if let Some(ch) = &self.profile.sec_ch_ua {
            headers.insert(HeaderName::from_static("sec-ch-ua"), HeaderValue::from_str(ch)?);
            headers.insert(HeaderName::from_static("sec-ch-ua-mobile"), HeaderValue::from_static("?0"));
            headers.insert(
                HeaderName::from_static("sec-ch-ua-platform"),
                HeaderValue::from_static("\"Windows\""),
            );
        }
        Ok(headers)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Providers
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Headers for a new run. Never fails; degraded providers return their
    /// last known headers.
    async fn headers(&self) -> HeaderSet;
}

/// Returns the same headers every time.
pub struct StaticSessionProvider {
    headers: HeaderSet,
}

impl StaticSessionProvider {
    pub fn new(headers: HeaderSet) -> Self {
        Self { headers }
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn headers(&self) -> HeaderSet {
        self.headers.clone()
    }
}

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub refresh_url: String,
    pub headless: bool,
    pub page_load_timeout: Duration,
    pub settle_delay: Duration,
    pub ready_attempts: u32,
}

/// Harvests fresh cookies from a throwaway browser session at the start of
/// every run. Keeps the last good headers and falls back to them on failure.
pub struct RefreshingSessionProvider {
    launcher: Arc<dyn BrowserLauncher>,
    sleeper: Arc<dyn Sleeper>,
    settings: RefreshSettings,
    last_good: Mutex<HeaderSet>,
}

impl RefreshingSessionProvider {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        sleeper: Arc<dyn Sleeper>,
        settings: RefreshSettings,
        fallback: HeaderSet,
    ) -> Self {
        Self {
            launcher,
            sleeper,
            settings,
            last_good: Mutex::new(fallback),
        }
    }

    async fn harvest_cookie(&self, profile: &HeaderProfile) -> Result<String, BrowserError> {
        let browser_profile = BrowserProfile {
            user_agent: profile.user_agent.clone(),
            accept_language: profile.accept_language.clone(),
            headless: self.settings.headless,
            page_load_timeout: self.settings.page_load_timeout,
            cookie_origin: None,
            cookie_domain: None,
            cookies: Vec::new(),
        };
        let session = self.launcher.launch(&browser_profile).await?;
        let page: &dyn BrowserSession = session.as_ref();

        let harvested = async {
            page.goto(&self.settings.refresh_url).await?;
            self.sleeper.sleep(self.settings.settle_delay).await;
            retry_bounded(
                self.settings.ready_attempts,
                self.settings.settle_delay,
                self.sleeper.as_ref(),
                move |_| async move {
                    match page.has_element("body").await {
                        Ok(true) => Ok(()),
                        Ok(false) => Err(BrowserError::Command("page body not ready".to_string())),
                        Err(e) => Err(e),
                    }
                },
            )
            .await?;
            let cookies = page.cookies().await?;
            Ok::<_, BrowserError>(
                cookies
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        }
        .await;

        if let Err(e) = session.close().await {
            warn!("Cookie refresh session did not close: {e}");
        }
        harvested
    }
}

#[async_trait]
impl SessionProvider for RefreshingSessionProvider {
    async fn headers(&self) -> HeaderSet {
        let profile = self.last_good.lock().await.profile.clone();
        match self.harvest_cookie(&profile).await {
            Ok(cookie) if !cookie.is_empty() => {
                let mut last_good = self.last_good.lock().await;
                *last_good = last_good.clone().with_cookie(cookie);
                info!(cookies = last_good.cookie_pairs().len(), "Session cookies refreshed");
                last_good.clone()
            }
            Ok(_) => {
                warn!("Cookie refresh returned no cookies, using previous session");
                self.last_good.lock().await.clone()
            }
            Err(e) => {
                warn!("Cookie refresh failed, using previous session: {e}");
                self.last_good.lock().await.clone()
            }
        }
    }
}
