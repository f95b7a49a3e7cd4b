use anyhow::{anyhow, Result};
use async_trait::async_trait;
use insightarc::models::message::Message;
use insightarc::models::tool::Tool;
use insightarc::providers::base::{Provider, Usage};
use insightarc::research::{ResearchConfig, ResearchPipeline};
use insightarc::search::base::{SearchOptions, SearchProvider, SearchResponse};
use insightarc::store::{FsContentStore, DEFAULT_REPORT_NAME};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::state::AppState;

/// Answers each call with the next scripted message
pub struct ScriptedProvider {
    responses: Mutex<Vec<Message>>,
    tool_counts: Mutex<Vec<usize>>,
    fail: bool,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Mutex::new(responses),
            tool_counts: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    /// How many tools were offered on each call
    pub fn tool_counts(&self) -> Vec<usize> {
        self.tool_counts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(
        &self,
        _system: &str,
        _messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        self.tool_counts.lock().unwrap().push(tools.len());
        if self.fail {
            return Err(anyhow!("backend unavailable"));
        }
        let mut responses = self.responses.lock().unwrap();
        let message = if responses.is_empty() {
            Message::assistant().with_text("")
        } else {
            responses.remove(0)
        };
        Ok((message, Usage::default()))
    }
}

struct EmptySearch;

#[async_trait]
impl SearchProvider for EmptySearch {
    fn name(&self) -> &str {
        "empty"
    }

    async fn search(&self, _query: &str, _options: &SearchOptions) -> Result<SearchResponse> {
        Ok(SearchResponse {
            answer: None,
            results: Vec::new(),
        })
    }
}

/// App state backed by `provider` and a throwaway report directory
pub fn test_state(provider: Arc<dyn Provider>) -> (AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with_store_dir(provider, dir.path().to_path_buf());
    (state, dir)
}

/// App state whose report directory path is occupied by a plain file, so every write fails
pub fn blocked_store_state(provider: Arc<dyn Provider>) -> (AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, "file").unwrap();
    let state = state_with_store_dir(provider, blocker);
    (state, dir)
}

fn state_with_store_dir(provider: Arc<dyn Provider>, store_dir: PathBuf) -> AppState {
    let store = Arc::new(FsContentStore::new(store_dir, "/generated"));
    let pipeline = ResearchPipeline::new(
        provider,
        Arc::new(EmptySearch),
        store,
        ResearchConfig::default(),
    );
    AppState {
        pipeline: Arc::new(pipeline),
        default_report_name: DEFAULT_REPORT_NAME.to_string(),
        url_prefix: "/generated".to_string(),
    }
}
