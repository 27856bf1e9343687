pub mod jobs;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(jobs::root))
        .route("/generate", post(jobs::submit))
        .route("/status/{task_id}", get(jobs::poll))
        .with_state(state)
}
