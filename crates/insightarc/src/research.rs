//! The research pipeline: one opening prompt in, a streamed and persisted report out
use anyhow::Result;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::{final_text_of, Agent, DEFAULT_MAX_STEPS};
use crate::models::message::Message;
use crate::models::research::{ReportDocument, ResearchOutcome};
use crate::prompt_template::load_prompt_file;
use crate::providers::base::Provider;
use crate::search::base::{SearchDepth, SearchOptions, SearchProvider};
use crate::session::{ReplyMode, ResearchSession};
use crate::store::{wrap_document, ContentStore};
use crate::systems::research::ResearchSystem;

#[derive(Debug, Clone, PartialEq)]
pub struct ResearchConfig {
    /// How many topics a prompt is decomposed into
    pub topic_count: usize,
    /// Step ceiling of the planning loop
    pub max_steps: usize,
    /// Step ceiling of the web search sub-loop
    pub search_max_steps: usize,
    pub search_depth: SearchDepth,
    pub include_answer: bool,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            topic_count: 4,
            max_steps: DEFAULT_MAX_STEPS,
            search_max_steps: 2,
            search_depth: SearchDepth::Advanced,
            include_answer: true,
        }
    }
}

impl ResearchConfig {
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            depth: self.search_depth,
            max_results: self.topic_count,
            include_answer: self.include_answer,
            topic: "general".to_string(),
        }
    }
}

/// What a reply stream carries to the caller, in generation order
#[derive(Debug, Clone, PartialEq)]
pub enum ResearchEvent {
    Message(Message),
    ReportSaved { path: String },
}

pub struct ResearchPipeline {
    provider: Arc<dyn Provider>,
    search: Arc<dyn SearchProvider>,
    store: Arc<dyn ContentStore>,
    config: ResearchConfig,
}

impl ResearchPipeline {
    pub fn new(
        provider: Arc<dyn Provider>,
        search: Arc<dyn SearchProvider>,
        store: Arc<dyn ContentStore>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            provider,
            search,
            store,
            config,
        }
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// The planner with all four research tools
    pub fn research_agent(&self) -> Agent {
        let mut agent = Agent::new(self.provider.clone()).with_max_steps(self.config.max_steps);
        agent.add_system(Box::new(ResearchSystem::new(
            self.provider.clone(),
            self.search.clone(),
            self.config.clone(),
        )));
        agent
    }

    /// A single tool-less generation in the report style
    pub fn followup_agent(&self) -> Result<Agent> {
        let system = load_prompt_file("followup.md", &HashMap::<String, String>::new())?;
        Ok(Agent::new(self.provider.clone())
            .with_max_steps(1)
            .with_system_prompt(system))
    }

    /// A bare single generation with no system prompt
    pub fn completion_agent(&self) -> Agent {
        Agent::new(self.provider.clone())
            .with_max_steps(1)
            .with_system_prompt("")
    }

    /// The planner's opening instruction, embedding the user's prompt
    pub fn opening_message(&self, prompt: &str) -> Result<Message> {
        let mut context = HashMap::new();
        context.insert("prompt", json!(prompt));
        context.insert("topic_count", json!(self.config.topic_count));
        Ok(Message::user().with_text(load_prompt_file("research.md", &context)?))
    }

    /// Answer the latest turn of `session`.
    ///
    /// The opening turn runs the planner; later turns get a direct reply with the
    /// whole history as context and never touch the research tools. A research run
    /// that produced a report writes it under `report_key`; a failed write is logged
    /// and does not end the stream with an error.
    pub async fn reply<'a>(
        &'a self,
        session: &'a ResearchSession,
        report_key: String,
    ) -> Result<BoxStream<'a, Result<ResearchEvent>>> {
        let mode = session.mode();
        let (agent, messages) = match mode {
            ReplyMode::Research => {
                tracing::info!(session = session.id(), "starting research run");
                (
                    self.research_agent(),
                    vec![self.opening_message(session.opening_prompt())?],
                )
            }
            ReplyMode::FollowUp => {
                tracing::info!(
                    session = session.id(),
                    turns = session.turns().len(),
                    "answering follow-up"
                );
                (self.followup_agent()?, session.turns().to_vec())
            }
        };

        Ok(Box::pin(async_stream::try_stream! {
            let mut final_text = String::new();
            {
                let mut stream = agent.reply(&messages).await?;
                while let Some(message) = stream.try_next().await? {
                    if let Some(text) = final_text_of(&message) {
                        final_text = text;
                    }
                    yield ResearchEvent::Message(message);
                }
            }

            if mode == ReplyMode::Research {
                let reports: Vec<ReportDocument> = agent
                    .invocations()
                    .iter()
                    .filter_map(ResearchSystem::report_from_invocation)
                    .collect();
                let outcome = ResearchOutcome::from_run(&final_text, &reports);
                if let Some(path) = self.persist(&outcome, &report_key).await {
                    yield ResearchEvent::ReportSaved { path };
                }
            }
        }))
    }

    /// Stream a plain completion of `prompt`: no tools, no persistence
    pub async fn complete(&self, prompt: String) -> Result<BoxStream<'_, Result<ResearchEvent>>> {
        let agent = self.completion_agent();
        let messages = vec![Message::user().with_text(prompt)];
        Ok(Box::pin(async_stream::try_stream! {
            let mut stream = agent.reply(&messages).await?;
            while let Some(message) = stream.try_next().await? {
                yield ResearchEvent::Message(message);
            }
        }))
    }

    /// Best-effort write of a report outcome; returns its path when written
    pub async fn persist(&self, outcome: &ResearchOutcome, key: &str) -> Option<String> {
        if !outcome.is_report() {
            tracing::info!("run produced no report, skipping persistence");
            return None;
        }
        match self.store.put(key, &wrap_document(outcome.content())).await {
            Ok(path) => {
                tracing::info!(path = %path, "report saved");
                Some(path)
            }
            Err(e) => {
                tracing::error!("Error saving report {}: {}", key, e);
                None
            }
        }
    }
}
