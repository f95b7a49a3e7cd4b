use async_trait::async_trait;
use indoc::indoc;
use serde_json::json;
use std::sync::Arc;

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::search::base::{SearchOptions, SearchProvider};
use crate::systems::System;

/// Exposes the web search capability as a single tool
pub struct WebSearchSystem {
    tools: Vec<Tool>,
    search: Arc<dyn SearchProvider>,
    options: SearchOptions,
}

impl WebSearchSystem {
    pub fn new(search: Arc<dyn SearchProvider>, options: SearchOptions) -> Self {
        let web_search = Tool::new(
            "web_search",
            "Search the internet and return ranked results with snippets and a short answer.",
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {"type": "string", "description": "The search query."}
                }
            }),
            json!({
                "type": "string",
                "description": "Numbered results with title, url and snippet."
            }),
        );

        Self {
            tools: vec![web_search],
            search,
            options,
        }
    }

    async fn web_search(&self, query: &str) -> AgentResult<Vec<Content>> {
        tracing::info!(provider = self.search.name(), query, "web search");
        let response = self
            .search
            .search(query, &self.options)
            .await
            .map_err(|e| AgentError::Capability(e.to_string()))?;
        Ok(vec![Content::text(response.to_text())])
    }
}

#[async_trait]
impl System for WebSearchSystem {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Live web search."
    }

    fn instructions(&self) -> &str {
        indoc! {"
            Use web_search once with a query that covers every topic you were given.
            After reading the results, answer with the consolidated findings and their source URLs.
        "}
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        match tool_call.name.as_str() {
            "web_search" => {
                let query = tool_call
                    .arguments
                    .get("query")
                    .and_then(|q| q.as_str())
                    .filter(|q| !q.trim().is_empty())
                    .ok_or_else(|| {
                        AgentError::InvalidParameters("'query' must be a non-empty string".into())
                    })?;
                self.web_search(query).await
            }
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}
