pub mod health;
pub mod searches;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/searches",
            post(searches::handle_submit).get(searches::handle_list),
        )
        .route("/api/v1/searches/:id", get(searches::handle_get))
        .with_state(state)
}
