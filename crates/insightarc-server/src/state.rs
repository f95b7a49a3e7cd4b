use insightarc::research::ResearchPipeline;
use insightarc::store::{report_key, DEFAULT_REPORT_NAME};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ResearchPipeline>,
    /// Where reports are written when a request carries no session id
    pub default_report_name: String,
    /// Path prefix persisted reports are served under
    pub url_prefix: String,
}

impl AppState {
    pub fn report_key(&self, session_id: Option<&str>) -> String {
        match report_key(session_id) {
            key if key == DEFAULT_REPORT_NAME => self.default_report_name.clone(),
            key => key,
        }
    }
}
