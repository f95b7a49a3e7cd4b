use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Mutex;

use super::base::{SearchOptions, SearchProvider, SearchResponse, SearchResult};

/// A search provider that records queries and answers from a fixed snippet
pub struct MockSearchProvider {
    snippet: String,
    fail: bool,
    queries: Mutex<Vec<(String, SearchOptions)>>,
}

impl MockSearchProvider {
    pub fn new<S: Into<String>>(snippet: S) -> Self {
        Self {
            snippet: snippet.into(),
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        let mut provider = Self::new("");
        provider.fail = true;
        provider
    }

    pub fn queries(&self) -> Vec<(String, SearchOptions)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchResponse> {
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), options.clone()));
        if self.fail {
            return Err(anyhow!("search backend unavailable"));
        }
        Ok(SearchResponse {
            answer: None,
            results: vec![SearchResult {
                title: format!("Result for {}", query),
                url: "https://example.org".to_string(),
                content: self.snippet.clone(),
                score: 1.0,
            }],
        })
    }
}
