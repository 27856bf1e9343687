use std::sync::Arc;

use crate::config::Config;
use crate::jobs::JobQueue;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jobs: JobQueue,
}

impl AppState {
    pub fn new(config: Arc<Config>, jobs: JobQueue) -> Self {
        Self { config, jobs }
    }
}
