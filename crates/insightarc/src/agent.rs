use anyhow::{anyhow, Result};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::{Message, ToolRequest};
use crate::models::research::ToolInvocation;
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};
use crate::prompt_template::load_prompt_file;
use crate::providers::base::Provider;
use crate::systems::System;

pub const DEFAULT_MAX_STEPS: usize = 22;

#[derive(Clone, Debug, Serialize)]
struct SystemInfo {
    name: String,
    description: String,
    instructions: String,
}

impl SystemInfo {
    fn new(name: &str, description: &str, instructions: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            instructions: instructions.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model answered without requesting another tool
    Finished,
    /// The step ceiling was reached
    StepLimit,
}

/// Counters for the most recent run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub steps: usize,
    pub max_steps: usize,
    pub stop_reason: Option<StopReason>,
    pub tool_calls: BTreeMap<String, usize>,
}

/// Agent integrates a foundational LLM with the systems it needs to pilot
pub struct Agent {
    systems: Vec<Box<dyn System>>,
    provider: Arc<dyn Provider>,
    system_prompt: Option<String>,
    max_steps: usize,
    invocations: Mutex<Vec<ToolInvocation>>,
    summary: Mutex<RunSummary>,
}

impl Agent {
    /// Create a new Agent with the specified provider
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            systems: Vec::new(),
            provider,
            system_prompt: None,
            max_steps: DEFAULT_MAX_STEPS,
            invocations: Mutex::new(Vec::new()),
            summary: Mutex::new(RunSummary::default()),
        }
    }

    /// Cap the number of model turns in one reply. A ceiling of zero is treated as one.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Use a fixed system prompt instead of the one rendered from the systems
    pub fn with_system_prompt<S: Into<String>>(mut self, system_prompt: S) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Add a system to the agent
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.systems.push(system);
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Tool calls made during the most recent reply
    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations
            .lock()
            .map(|invocations| invocations.clone())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
            .lock()
            .map(|summary| summary.clone())
            .unwrap_or_default()
    }

    /// Get all tools from all systems with proper system prefixing
    fn get_prefixed_tools(&self) -> Vec<Tool> {
        let mut tools = Vec::new();
        for system in &self.systems {
            for tool in system.tools() {
                tools.push(Tool::new(
                    format!("{}__{}", system.name(), tool.name),
                    &tool.description,
                    tool.input_schema.clone(),
                    tool.output_schema.clone(),
                ));
            }
        }
        tools
    }

    /// Find the appropriate system for a tool call based on the prefixed name
    fn get_system_for_tool(&self, prefixed_name: &str) -> Option<&dyn System> {
        let parts: Vec<&str> = prefixed_name.split("__").collect();
        if parts.len() != 2 {
            return None;
        }
        let system_name = parts[0];
        self.systems
            .iter()
            .find(|sys| sys.name() == system_name)
            .map(|v| &**v)
    }

    /// Dispatch a single tool call to the appropriate system
    async fn dispatch_tool_call(&self, call: ToolCall) -> AgentResult<Vec<Content>> {
        let system = self
            .get_system_for_tool(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        let tool_name = call
            .name
            .split("__")
            .nth(1)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
        let system_tool_call = ToolCall::new(tool_name, call.arguments);

        system.call(system_tool_call).await
    }

    fn get_system_prompt(&self) -> AgentResult<String> {
        if let Some(prompt) = &self.system_prompt {
            return Ok(prompt.clone());
        }
        if self.systems.is_empty() {
            return Ok(String::new());
        }

        let mut context = HashMap::new();
        let systems_info: Vec<SystemInfo> = self
            .systems
            .iter()
            .map(|system| {
                SystemInfo::new(system.name(), system.description(), system.instructions())
            })
            .collect();

        context.insert("systems", systems_info);
        load_prompt_file("system.md", &context).map_err(|e| AgentError::Internal(e.to_string()))
    }

    fn record_invocation(&self, call: &ToolCall, output: &AgentResult<Vec<Content>>, step: usize) {
        let output = output.as_ref().ok().map(|contents| {
            let text: String = contents.iter().filter_map(|c| c.as_text()).collect();
            serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text))
        });
        if let Ok(mut invocations) = self.invocations.lock() {
            invocations.push(ToolInvocation {
                tool_name: call.name.clone(),
                input: call.arguments.clone(),
                output,
                step,
            });
        }
        if let Ok(mut summary) = self.summary.lock() {
            *summary.tool_calls.entry(call.name.clone()).or_insert(0) += 1;
        }
    }

    fn begin_run(&self) {
        if let Ok(mut invocations) = self.invocations.lock() {
            invocations.clear();
        }
        if let Ok(mut summary) = self.summary.lock() {
            *summary = RunSummary {
                max_steps: self.max_steps,
                ..Default::default()
            };
        }
    }

    fn record_step(&self, step: usize) {
        if let Ok(mut summary) = self.summary.lock() {
            summary.steps = step;
        }
    }

    fn end_run(&self, reason: StopReason) {
        if let Ok(mut summary) = self.summary.lock() {
            summary.stop_reason = Some(reason);
            tracing::info!(
                steps = summary.steps,
                max_steps = summary.max_steps,
                stop_reason = ?reason,
                tool_calls = ?summary.tool_calls,
                "agent run complete"
            );
        }
    }

    /// Create a stream that yields each message as it's generated by the agent.
    /// This includes both the assistant's responses and any tool responses.
    ///
    /// Each step is one provider call. Requested tools run one after another in the
    /// order the model asked for them. The run ends when the model stops requesting
    /// tools or when `max_steps` steps have been taken.
    pub async fn reply(&self, messages: &[Message]) -> Result<BoxStream<'_, Result<Message>>> {
        let mut messages = messages.to_vec();
        let tools = self.get_prefixed_tools();
        let system_prompt = self.get_system_prompt()?;
        self.begin_run();

        Ok(Box::pin(async_stream::try_stream! {
            let mut step = 0;
            loop {
                step += 1;
                tracing::debug!(step, max_steps = self.max_steps, "agent step");

                let (response, _) = self.provider.complete(
                    &system_prompt,
                    &messages,
                    &tools,
                ).await?;
                self.record_step(step);

                yield response.clone();

                // Ensures the message above is yielded before long-running tools start
                tokio::task::yield_now().await;

                let tool_requests: Vec<ToolRequest> = response
                    .tool_requests()
                    .into_iter()
                    .cloned()
                    .collect();

                if tool_requests.is_empty() {
                    self.end_run(StopReason::Finished);
                    break;
                }

                let mut message_tool_response = Message::user();
                for request in tool_requests {
                    let output = match request.tool_call.clone() {
                        Ok(call) => {
                            tracing::info!(tool = %call.name, step, "invoking tool");
                            let output = self.dispatch_tool_call(call.clone()).await;
                            self.record_invocation(&call, &output, step);
                            abort_on_capability_failure(&call, &output, step)?;
                            output
                        }
                        Err(e) => Err(e),
                    };
                    message_tool_response =
                        message_tool_response.with_tool_response(request.id.clone(), output);
                }

                yield message_tool_response.clone();

                messages.push(response);
                messages.push(message_tool_response);

                if step >= self.max_steps {
                    tracing::warn!(step, "step ceiling reached");
                    self.end_run(StopReason::StepLimit);
                    break;
                }
            }
        }))
    }

    /// Run a reply to completion and return its final text: the text of the last
    /// assistant step that produced any.
    pub async fn reply_text(&self, messages: &[Message]) -> Result<String> {
        let mut stream = self.reply(messages).await?;
        let mut final_text = String::new();
        while let Some(message) = stream.try_next().await? {
            if let Some(text) = final_text_of(&message) {
                final_text = text;
            }
        }
        Ok(final_text)
    }
}

/// A backend failure inside a tool ends the run; any other tool error goes back to the model
fn abort_on_capability_failure(
    call: &ToolCall,
    output: &AgentResult<Vec<Content>>,
    step: usize,
) -> Result<()> {
    match output {
        Err(AgentError::Capability(reason)) => {
            tracing::error!(tool = %call.name, step, "tool backend failed: {}", reason);
            Err(anyhow!("Tool {} failed: {}", call.name, reason))
        }
        _ => Ok(()),
    }
}

/// The text an assistant message contributes to a run's final answer, if any
pub fn final_text_of(message: &Message) -> Option<String> {
    if message.role != Role::Assistant {
        return None;
    }
    let text = message.text();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
