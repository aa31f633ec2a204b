//! Browser automation behind a small trait seam.
//!
//! The pipeline only sees [`BrowserLauncher`] and [`BrowserSession`]. The
//! production implementation drives Chrome through a WebDriver endpoint with
//! `fantoccini`; tests substitute scripted fakes.

pub mod challenge;
pub mod fetcher;

use std::time::Duration;

use async_trait::async_trait;
use fantoccini::cookies::Cookie;
use fantoccini::wd::TimeoutConfiguration;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to start browser session: {0}")]
    Session(String),

    #[error("Browser command failed: {0}")]
    Command(String),
}

impl From<fantoccini::error::CmdError> for BrowserError {
    fn from(err: fantoccini::error::CmdError) -> Self {
        BrowserError::Command(err.to_string())
    }
}

/// How a session should present itself.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserProfile {
    pub user_agent: String,
    pub accept_language: String,
    pub headless: bool,
    pub page_load_timeout: Duration,
    /// Page to open before seeding cookies, since WebDriver only accepts
    /// cookies for the current document's domain.
    pub cookie_origin: Option<String>,
    pub cookie_domain: Option<String>,
    pub cookies: Vec<(String, String)>,
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;
    async fn title(&self) -> Result<String, BrowserError>;
    async fn current_url(&self) -> Result<String, BrowserError>;
    async fn page_source(&self) -> Result<String, BrowserError>;
    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError>;
    async fn has_element(&self, css: &str) -> Result<bool, BrowserError>;
    async fn cookies(&self) -> Result<Vec<(String, String)>, BrowserError>;
    async fn close(&self) -> Result<(), BrowserError>;

    /// Runs a script that returns a string. Non-string results become empty.
    async fn execute_string(&self, script: &str) -> Result<String, BrowserError> {
        let value = self.execute(script, Vec::new()).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Best-effort `window.stop()` so a hung load does not poison the next navigation.
    async fn stop_loading(&self) {
        if let Err(e) = self.execute("window.stop();", Vec::new()).await {
            debug!("window.stop() failed: {e}");
        }
    }
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, profile: &BrowserProfile) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

// ────────────────────────────────────────────────────────────────────────────
// WebDriver implementation
// ────────────────────────────────────────────────────────────────────────────

const HIDE_WEBDRIVER_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined});";

/// Connects to a running WebDriver server (chromedriver) for each session.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    webdriver_url: String,
}

impl WebDriverLauncher {
    pub fn new(webdriver_url: String) -> Self {
        Self { webdriver_url }
    }

    fn capabilities(profile: &BrowserProfile) -> serde_json::Map<String, Value> {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-extensions".to_string(),
            "--window-size=1920,1080".to_string(),
            format!("--user-agent={}", profile.user_agent),
        ];
        if profile.headless {
            args.insert(0, "--headless=new".to_string());
        }
        if let Some(lang) = profile.accept_language.split(',').next() {
            args.push(format!("--lang={}", lang.trim()));
        }

        let mut caps = serde_json::Map::new();
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({
                "args": args,
                "excludeSwitches": ["enable-automation"],
                "useAutomationExtension": false,
            }),
        );
        caps
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self, profile: &BrowserProfile) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let client = ClientBuilder::native()
            .capabilities(Self::capabilities(profile))
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| BrowserError::Session(e.to_string()))?;

        let session = WebDriverSession { client };
        if let Err(e) = session.prepare(profile).await {
            let _ = session.close().await;
            return Err(BrowserError::Session(e.to_string()));
        }

        info!(headless = profile.headless, "Browser session started");
        Ok(Box::new(session))
    }
}

pub struct WebDriverSession {
    client: Client,
}

impl WebDriverSession {
    async fn prepare(&self, profile: &BrowserProfile) -> Result<(), BrowserError> {
        self.client
            .update_timeouts(TimeoutConfiguration::new(
                None,
                Some(profile.page_load_timeout),
                None,
            ))
            .await?;

        if let Err(e) = self.client.execute(HIDE_WEBDRIVER_SCRIPT, Vec::new()).await {
            debug!("Could not mask navigator.webdriver: {e}");
        }

        let Some(origin) = profile.cookie_origin.as_deref() else {
            return Ok(());
        };
        if profile.cookies.is_empty() {
            return Ok(());
        }

        self.client.goto(origin).await?;
        let mut seeded = 0;
        for (name, value) in &profile.cookies {
            let mut cookie = Cookie::new(name.clone(), value.clone());
            if let Some(domain) = profile.cookie_domain.as_deref() {
                cookie.set_domain(domain.to_string());
            }
            cookie.set_path("/");
            match self.client.add_cookie(cookie).await {
                Ok(()) => seeded += 1,
                Err(e) => debug!(cookie = %name, "Could not seed cookie: {e}"),
            }
        }
        debug!(seeded, total = profile.cookies.len(), "Seeded session cookies");
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        Ok(self.client.goto(url).await?)
    }

    async fn title(&self) -> Result<String, BrowserError> {
        Ok(self.client.title().await?)
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        Ok(self.client.source().await?)
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError> {
        Ok(self.client.execute(script, args).await?)
    }

    async fn has_element(&self, css: &str) -> Result<bool, BrowserError> {
        let found = self.client.find_all(Locator::Css(css)).await?;
        Ok(!found.is_empty())
    }

    async fn cookies(&self) -> Result<Vec<(String, String)>, BrowserError> {
        let cookies = self.client.get_all_cookies().await?;
        Ok(cookies
            .iter()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        match self.client.clone().close().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Browser session did not close cleanly: {e}");
                Err(e.into())
            }
        }
    }
}
