use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sourcing_api::browser::challenge::{ChallengeSolver, TwoCaptchaSolver};
use sourcing_api::browser::{BrowserLauncher, WebDriverLauncher};
use sourcing_api::config::{Config, SessionPolicy};
use sourcing_api::db::{create_pool, ensure_schema};
use sourcing_api::jobs::repository::{InMemorySearchRepository, PgSearchRepository, SearchRepository};
use sourcing_api::jobs::JobRunner;
use sourcing_api::llm_client::LlmClient;
use sourcing_api::notify::{ShortlistNotifier, SmtpNotifier};
use sourcing_api::pipeline::{Pipeline, PipelineDeps, PipelineSettings};
use sourcing_api::retry::{Sleeper, TokioSleeper};
use sourcing_api::routes::build_router;
use sourcing_api::search::client::GraphqlSearchClient;
use sourcing_api::session::{
    HeaderProfile, HeaderSet, RefreshSettings, RefreshingSessionProvider, SessionProvider,
    StaticSessionProvider,
};
use sourcing_api::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "sourcing_api={level},tower_http={level}",
                level = &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting sourcing API v{}", env!("CARGO_PKG_VERSION"));

    let repository: Arc<dyn SearchRepository> = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            ensure_schema(&pool).await?;
            Arc::new(PgSearchRepository::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, search records are kept in memory");
            Arc::new(InMemorySearchRepository::default())
        }
    };

    let pipeline = Arc::new(build_pipeline(&config)?);
    let notifier = build_notifier(&config)?;
    let runner = JobRunner::new(
        pipeline,
        repository.clone(),
        notifier,
        config.max_concurrent_runs,
    );
    info!(max_concurrent_runs = config.max_concurrent_runs, "Job runner ready");

    let state = AppState { runner, repository };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
    let browser: Arc<dyn BrowserLauncher> = Arc::new(WebDriverLauncher::new(config.webdriver_url.clone()));
    let settings = PipelineSettings {
        headless: config.browser_headless,
        extraction_model: config.extraction_model.clone(),
        evaluation_model: config.evaluation_model.clone(),
        temp_root: config.resume_temp_dir.clone(),
        ..PipelineSettings::default()
    };

    let profile = HeaderProfile::random();
    info!(user_agent = %profile.user_agent, "Header profile selected");
    let headers = HeaderSet::new(
        profile,
        config.session_cookie.clone(),
        config.search_api_key.clone(),
        config.search_client_token.clone(),
        config.session_origin.clone(),
    );
    let sessions: Arc<dyn SessionProvider> = match config.session_policy {
        SessionPolicy::Static => Arc::new(StaticSessionProvider::new(headers)),
        SessionPolicy::Refreshed => Arc::new(RefreshingSessionProvider::new(
            browser.clone(),
            sleeper.clone(),
            RefreshSettings {
                refresh_url: config.session_refresh_url.clone(),
                headless: config.browser_headless,
                page_load_timeout: settings.page_load_timeout,
                settle_delay: Duration::from_secs(3),
                ready_attempts: 3,
            },
            headers,
        )),
    };

    let solver: Option<Arc<dyn ChallengeSolver>> = match &config.captcha_api_key {
        Some(key) => Some(Arc::new(TwoCaptchaSolver::new(
            config.captcha_api_url.clone(),
            key.clone(),
            sleeper.clone(),
        )?)),
        None => {
            warn!("CAPTCHA_API_KEY not set, challenges must resolve on their own");
            None
        }
    };

    let search = GraphqlSearchClient::new(config.search_api_url.clone(), config.profile_base_url.clone())?;
    let llm = LlmClient::new(config.llm_api_url.clone(), config.llm_api_key.clone())?;
    info!(
        extraction_model = %settings.extraction_model,
        evaluation_model = %settings.evaluation_model,
        "LLM client initialized"
    );

    let deps = PipelineDeps {
        search: Arc::new(search),
        sessions,
        browser,
        solver,
        llm: Arc::new(llm),
        sleeper,
    };
    Ok(Pipeline::new(deps, settings))
}

fn build_notifier(config: &Config) -> Result<Option<Arc<dyn ShortlistNotifier>>> {
    let Some(smtp) = &config.smtp else {
        info!("SMTP_HOST not set, shortlist emails are disabled");
        return Ok(None);
    };
    let notifier = SmtpNotifier::new(smtp)?;
    info!(host = %smtp.host, port = smtp.port, "SMTP notifier initialized");
    Ok(Some(Arc::new(notifier)))
}
