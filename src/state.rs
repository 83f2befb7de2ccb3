use crate::config::Config;
use crate::db::SurveyStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SurveyStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn SurveyStore>, config: Config) -> Self {
        Self { store, config: Arc::new(config) }
    }
}

pub type SharedState = Arc<AppState>;
