use std::sync::Arc;

use crate::jobs::repository::SearchRepository;
use crate::jobs::JobRunner;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub runner: JobRunner,
    pub repository: Arc<dyn SearchRepository>,
}
