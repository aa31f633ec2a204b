use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

use crate::browser::challenge::DEFAULT_SOLVER_URL;
use crate::llm_client::{DEFAULT_API_URL, DEFAULT_MODEL};
use crate::notify::SmtpSettings;
use crate::search::client::{DEFAULT_PROFILE_BASE, DEFAULT_SEARCH_URL};

const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
const DEFAULT_SESSION_ORIGIN: &str = "https://resumes.indeed.com";

/// Where a run's search headers come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPolicy {
    /// Configured cookie used as-is.
    Static,
    /// Cookies harvested from a browser visit before every run.
    Refreshed,
}

impl FromStr for SessionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(SessionPolicy::Static),
            "refreshed" => Ok(SessionPolicy::Refreshed),
            other => bail!("SESSION_POLICY must be 'static' or 'refreshed', got '{other}'"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm_api_key: String,
    pub llm_api_url: String,
    pub extraction_model: String,
    pub evaluation_model: String,
    pub search_api_url: String,
    pub search_api_key: String,
    pub search_client_token: Option<String>,
    pub profile_base_url: String,
    pub session_origin: String,
    pub session_cookie: String,
    pub session_policy: SessionPolicy,
    pub session_refresh_url: String,
    pub webdriver_url: String,
    pub browser_headless: bool,
    pub captcha_api_key: Option<String>,
    pub captcha_api_url: String,
    pub database_url: Option<String>,
    pub smtp: Option<SmtpSettings>,
    pub max_concurrent_runs: usize,
    pub resume_temp_dir: Option<PathBuf>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let session_origin = env_or("SESSION_ORIGIN", DEFAULT_SESSION_ORIGIN);
        Ok(Config {
            llm_api_key: require_env("LLM_API_KEY")?,
            llm_api_url: env_or("LLM_API_URL", DEFAULT_API_URL),
            extraction_model: env_or("EXTRACTION_MODEL", DEFAULT_MODEL),
            evaluation_model: env_or("EVALUATION_MODEL", DEFAULT_MODEL),
            search_api_url: env_or("SEARCH_API_URL", DEFAULT_SEARCH_URL),
            search_api_key: require_env("SEARCH_API_KEY")?,
            search_client_token: optional_env("SEARCH_CLIENT_TOKEN"),
            profile_base_url: env_or("PROFILE_BASE_URL", DEFAULT_PROFILE_BASE),
            session_cookie: optional_env("SESSION_COOKIE").unwrap_or_default(),
            session_policy: env_or("SESSION_POLICY", "static").parse()?,
            session_refresh_url: env_or("SESSION_REFRESH_URL", &format!("{session_origin}/")),
            session_origin,
            webdriver_url: env_or("WEBDRIVER_URL", DEFAULT_WEBDRIVER_URL),
            browser_headless: parse_env("BROWSER_HEADLESS", true)?,
            captcha_api_key: optional_env("CAPTCHA_API_KEY"),
            captcha_api_url: env_or("CAPTCHA_API_URL", DEFAULT_SOLVER_URL),
            database_url: optional_env("DATABASE_URL"),
            smtp: smtp_from_env()?,
            max_concurrent_runs: parse_env("MAX_CONCURRENT_RUNS", 2)?,
            resume_temp_dir: optional_env("RESUME_TEMP_DIR").map(PathBuf::from),
            port: parse_env("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }
}

/// Email is disabled unless `SMTP_HOST` is set.
fn smtp_from_env() -> Result<Option<SmtpSettings>> {
    let Some(host) = optional_env("SMTP_HOST") else {
        return Ok(None);
    };
    let username = optional_env("SMTP_USERNAME");
    let from = match optional_env("EMAIL_FROM").or_else(|| username.clone()) {
        Some(from) => from,
        None => bail!("EMAIL_FROM (or SMTP_USERNAME) is required when SMTP_HOST is set"),
    };
    Ok(Some(SmtpSettings {
        host,
        port: parse_env("SMTP_PORT", 587)?,
        username,
        password: optional_env("SMTP_PASSWORD"),
        from,
    }))
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank values both count as missing.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
