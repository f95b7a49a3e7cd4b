use async_trait::async_trait;
use indoc::indoc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::Agent;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::Message;
use crate::models::research::{ReportDocument, ResearchTopicSet, SearchFindings, ToolInvocation};
use crate::models::tool::{Tool, ToolCall};
use crate::prompt_template::load_prompt_file;
use crate::providers::base::Provider;
use crate::research::ResearchConfig;
use crate::search::base::SearchProvider;
use crate::systems::web_search::WebSearchSystem;
use crate::systems::System;

pub const SYSTEM_NAME: &str = "research";
pub const DECOMPOSE_TOOL: &str = "decompose_topics";
pub const GATHER_TOOL: &str = "gather_web_research";
pub const SYNTHESIZE_TOOL: &str = "synthesize_report";
pub const REFINE_TOOL: &str = "refine_report";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecomposeInput {
    user_prompt: String,
}

#[derive(Debug, Deserialize)]
struct GatherInput {
    topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeInput {
    search_results: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefineInput {
    html_content: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeOutput {
    research_html: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefineOutput {
    formatted_html: String,
}

/// The four research pipeline stages, offered to the planner as tools
pub struct ResearchSystem {
    tools: Vec<Tool>,
    provider: Arc<dyn Provider>,
    search: Arc<dyn SearchProvider>,
    config: ResearchConfig,
}

impl ResearchSystem {
    pub fn new(
        provider: Arc<dyn Provider>,
        search: Arc<dyn SearchProvider>,
        config: ResearchConfig,
    ) -> Self {
        let decompose = Tool::new(
            DECOMPOSE_TOOL,
            format!(
                "Get a list of {} topics based on what the prompt wants to research.",
                config.topic_count
            ),
            json!({
                "type": "object",
                "required": ["userPrompt"],
                "properties": {
                    "userPrompt": {"type": "string", "description": "The prompt inserted by the user."}
                }
            }),
            json!({
                "type": "object",
                "properties": {"topics": {"type": "array", "items": {"type": "string"}}}
            }),
        );

        let gather = Tool::new(
            GATHER_TOOL,
            "Use this tool to get relevant web search data for the given research topics.",
            json!({
                "type": "object",
                "required": ["topics"],
                "properties": {
                    "topics": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "The list of research topics to search for."
                    }
                }
            }),
            json!({
                "type": "object",
                "properties": {"searchResults": {"type": "array", "items": {"type": "string"}}}
            }),
        );

        let synthesize = Tool::new(
            SYNTHESIZE_TOOL,
            "Synthesize a comprehensive research response based on the web search data gathered and return it as an HTML formatted report.",
            json!({
                "type": "object",
                "required": ["searchResults"],
                "properties": {
                    "searchResults": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "The web search results for the given topics."
                    }
                }
            }),
            json!({
                "type": "object",
                "properties": {"researchHtml": {"type": "string"}}
            }),
        );

        let refine = Tool::new(
            REFINE_TOOL,
            "Format the given HTML content to be more readable and visually appealing.",
            json!({
                "type": "object",
                "required": ["htmlContent"],
                "properties": {
                    "htmlContent": {"type": "string", "description": "The raw HTML content to be formatted."}
                }
            }),
            json!({
                "type": "object",
                "properties": {"formattedHtml": {"type": "string"}}
            }),
        );

        Self {
            tools: vec![decompose, gather, synthesize, refine],
            provider,
            search,
            config,
        }
    }

    /// One tool-less generation returning the model's text
    async fn generate(&self, prompt: String) -> AgentResult<String> {
        let (message, _) = self
            .provider
            .complete("", &[Message::user().with_text(prompt)], &[])
            .await
            .map_err(|e| AgentError::Capability(e.to_string()))?;
        Ok(message.text())
    }

    fn render(&self, template: &str, context: &HashMap<&str, Value>) -> AgentResult<String> {
        load_prompt_file(template, context).map_err(|e| AgentError::Internal(e.to_string()))
    }

    async fn decompose_topics(&self, input: DecomposeInput) -> AgentResult<ResearchTopicSet> {
        if input.user_prompt.trim().is_empty() {
            return Err(AgentError::InvalidParameters(
                "'userPrompt' must not be empty".into(),
            ));
        }
        let mut context = HashMap::new();
        context.insert("prompt", json!(input.user_prompt));
        context.insert("topic_count", json!(self.config.topic_count));
        let text = self.generate(self.render("topics.md", &context)?).await?;

        let topics = ResearchTopicSet::parse(&text, self.config.topic_count);
        if topics.len() != self.config.topic_count {
            tracing::warn!(
                expected = self.config.topic_count,
                actual = topics.len(),
                "topic count mismatch"
            );
        }
        tracing::info!(topics = ?topics.topics, "decomposed prompt");
        Ok(topics)
    }

    /// Search all topics jointly in a sub-loop bounded by `search_max_steps`
    async fn gather_web_research(&self, input: GatherInput) -> AgentResult<SearchFindings> {
        let mut agent = Agent::new(self.provider.clone()).with_max_steps(self.config.search_max_steps);
        agent.add_system(Box::new(WebSearchSystem::new(
            self.search.clone(),
            self.config.search_options(),
        )));

        let mut context = HashMap::new();
        context.insert("topics", json!(input.topics));
        let prompt = self.render("web_search.md", &context)?;

        let text = agent
            .reply_text(&[Message::user().with_text(prompt)])
            .await
            .map_err(|e| AgentError::Capability(e.to_string()))?;
        tracing::info!(steps = agent.summary().steps, "gathered web research");

        Ok(SearchFindings {
            search_results: vec![text],
        })
    }

    async fn synthesize_report(&self, input: SynthesizeInput) -> AgentResult<ReportDocument> {
        let mut context = HashMap::new();
        context.insert("search_results", json!(input.search_results.join("\n---\n")));
        let html = self.generate(self.render("synthesize.md", &context)?).await?;
        Ok(ReportDocument::structured(html))
    }

    async fn refine_report(&self, input: RefineInput) -> AgentResult<ReportDocument> {
        let mut context = HashMap::new();
        context.insert("html", json!(input.html_content));
        let html = self.generate(self.render("refine.md", &context)?).await?;
        Ok(ReportDocument::refined(html))
    }

    /// The report a research tool invocation produced, if it was a successful
    /// synthesis or refinement
    pub fn report_from_invocation(invocation: &ToolInvocation) -> Option<ReportDocument> {
        let output = invocation.output.as_ref()?;
        let tool = invocation
            .tool_name
            .strip_prefix(SYSTEM_NAME)?
            .strip_prefix("__")?;
        match tool {
            SYNTHESIZE_TOOL => serde_json::from_value::<SynthesizeOutput>(output.clone())
                .ok()
                .map(|o| ReportDocument::structured(o.research_html)),
            REFINE_TOOL => serde_json::from_value::<RefineOutput>(output.clone())
                .ok()
                .map(|o| ReportDocument::refined(o.formatted_html)),
            _ => None,
        }
    }
}

fn parse_input<T: DeserializeOwned>(arguments: Value) -> AgentResult<T> {
    serde_json::from_value(arguments).map_err(|e| AgentError::InvalidParameters(e.to_string()))
}

fn to_content<T: Serialize>(output: &T) -> AgentResult<Vec<Content>> {
    let text = serde_json::to_string(output).map_err(|e| AgentError::Internal(e.to_string()))?;
    Ok(vec![Content::text(text)])
}

#[async_trait]
impl System for ResearchSystem {
    fn name(&self) -> &str {
        SYSTEM_NAME
    }

    fn description(&self) -> &str {
        "Turns a research prompt into a styled HTML report built from web search results."
    }

    fn instructions(&self) -> &str {
        indoc! {"
            The usual order is decompose_topics, then gather_web_research with those topics,
            then synthesize_report with the search results, then refine_report with the report.
            Skip stages only when the request plainly does not need them.
            When the report is refined, answer with the final HTML only.
        "}
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        match tool_call.name.as_str() {
            DECOMPOSE_TOOL => {
                let topics = self.decompose_topics(parse_input(tool_call.arguments)?).await?;
                to_content(&topics)
            }
            GATHER_TOOL => {
                let findings = self
                    .gather_web_research(parse_input(tool_call.arguments)?)
                    .await?;
                to_content(&findings)
            }
            SYNTHESIZE_TOOL => {
                let report = self
                    .synthesize_report(parse_input(tool_call.arguments)?)
                    .await?;
                to_content(&SynthesizeOutput {
                    research_html: report.content,
                })
            }
            REFINE_TOOL => {
                let report = self.refine_report(parse_input(tool_call.arguments)?).await?;
                to_content(&RefineOutput {
                    formatted_html: report.content,
                })
            }
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use crate::search::mock::MockSearchProvider;

    fn system_with(provider: Arc<MockProvider>, search: Arc<MockSearchProvider>) -> ResearchSystem {
        ResearchSystem::new(provider, search, ResearchConfig::default())
    }

    fn output_of(contents: Vec<Content>) -> Value {
        serde_json::from_str(contents[0].as_text().unwrap()).unwrap()
    }

    fn web_search_request(id: &str) -> Message {
        Message::assistant().with_tool_request(
            id,
            Ok(ToolCall::new("search__web_search", json!({"query": "all topics"}))),
        )
    }

    #[tokio::test]
    async fn test_decompose_topics_strips_numbering() {
        let provider = Arc::new(MockProvider::new(vec![Message::assistant().with_text(
            "1. Ocean acidification\n2. Coral bleaching\n3. Deep-sea mining\n4. Marine protected areas",
        )]));
        let system = system_with(provider.clone(), Arc::new(MockSearchProvider::new("")));

        let result = system
            .call(ToolCall::new(DECOMPOSE_TOOL, json!({"userPrompt": "ocean health"})))
            .await
            .unwrap();

        assert_eq!(
            output_of(result),
            json!({"topics": ["Ocean acidification", "Coral bleaching", "Deep-sea mining", "Marine protected areas"]})
        );
        assert_eq!(provider.calls(), 1);
        assert!(provider.seen_tools()[0].is_empty());
    }

    #[tokio::test]
    async fn test_decompose_rejects_empty_prompt() {
        let system = system_with(
            Arc::new(MockProvider::new(vec![])),
            Arc::new(MockSearchProvider::new("")),
        );
        let err = system
            .call(ToolCall::new(DECOMPOSE_TOOL, json!({"userPrompt": "  "})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_gather_returns_single_combined_finding() {
        let provider = Arc::new(MockProvider::new(vec![
            web_search_request("s1"),
            Message::assistant().with_text("Combined findings with sources."),
        ]));
        let search = Arc::new(MockSearchProvider::new("snippet"));
        let system = system_with(provider.clone(), search.clone());

        let result = system
            .call(ToolCall::new(GATHER_TOOL, json!({"topics": ["a", "b"]})))
            .await
            .unwrap();

        assert_eq!(
            output_of(result),
            json!({"searchResults": ["Combined findings with sources."]})
        );
        let queries = search.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].1.max_results, 4);
        assert_eq!(provider.seen_tools()[0], vec!["search__web_search".to_string()]);
    }

    #[tokio::test]
    async fn test_gather_is_bounded_to_two_steps() {
        for topic_count in [1usize, 8] {
            let provider = Arc::new(MockProvider::repeating(web_search_request("again")));
            let system = system_with(provider.clone(), Arc::new(MockSearchProvider::new("s")));
            let topics: Vec<String> = (0..topic_count).map(|i| format!("topic {}", i)).collect();

            system
                .call(ToolCall::new(GATHER_TOOL, json!({"topics": topics})))
                .await
                .unwrap();

            assert_eq!(provider.calls(), 2, "topic count {}", topic_count);
        }
    }

    #[tokio::test]
    async fn test_gather_search_failure_is_capability_error() {
        let provider = Arc::new(MockProvider::new(vec![web_search_request("s1")]));
        let system = system_with(provider, Arc::new(MockSearchProvider::failing()));

        let err = system
            .call(ToolCall::new(GATHER_TOOL, json!({"topics": ["a"]})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Capability(_)));
    }

    #[tokio::test]
    async fn test_synthesize_passes_prose_through() {
        let provider = Arc::new(MockProvider::new(vec![Message::assistant()
            .with_text("Here is your report:\n<header><h1>Tides</h1></header>")]));
        let system = system_with(provider, Arc::new(MockSearchProvider::new("")));

        let result = system
            .call(ToolCall::new(SYNTHESIZE_TOOL, json!({"searchResults": ["Tides rise."]})))
            .await
            .unwrap();

        assert_eq!(
            output_of(result),
            json!({"researchHtml": "Here is your report:\n<header><h1>Tides</h1></header>"})
        );
    }

    #[tokio::test]
    async fn test_refine_prompt_carries_the_input_markup() {
        let provider = Arc::new(MockProvider::new(vec![
            Message::assistant().with_text("<header class=\"p-4\"><h1>Tides</h1></header>"),
        ]));
        let system = system_with(provider.clone(), Arc::new(MockSearchProvider::new("")));

        let result = system
            .call(ToolCall::new(REFINE_TOOL, json!({"htmlContent": "<header><h1>Tides</h1></header>"})))
            .await
            .unwrap();

        assert_eq!(
            output_of(result),
            json!({"formattedHtml": "<header class=\"p-4\"><h1>Tides</h1></header>"})
        );
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_wrong_arguments_are_invalid_parameters() {
        let system = system_with(
            Arc::new(MockProvider::new(vec![])),
            Arc::new(MockSearchProvider::new("")),
        );
        let err = system
            .call(ToolCall::new(SYNTHESIZE_TOOL, json!({"searchResults": "not a list"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(_)));
    }

    #[test]
    fn test_report_from_invocation() {
        let refined = ToolInvocation {
            tool_name: "research__refine_report".to_string(),
            input: json!({}),
            output: Some(json!({"formattedHtml": "<h1>x</h1>"})),
            step: 4,
        };
        assert_eq!(
            ResearchSystem::report_from_invocation(&refined),
            Some(ReportDocument::refined("<h1>x</h1>"))
        );

        let failed = ToolInvocation {
            output: None,
            ..refined.clone()
        };
        assert_eq!(ResearchSystem::report_from_invocation(&failed), None);

        let topics = ToolInvocation {
            tool_name: "research__decompose_topics".to_string(),
            output: Some(json!({"topics": []})),
            ..refined
        };
        assert_eq!(ResearchSystem::report_from_invocation(&topics), None);
    }
}
