use std::sync::Arc;

use crate::{config::Config, services::Platform};
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub platform: Arc<Platform>,
    pub config: Config,
}

impl FromRef<AppState> for Arc<Platform> {
    fn from_ref(state: &AppState) -> Self {
        state.platform.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
