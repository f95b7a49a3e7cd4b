use async_trait::async_trait;

use crate::errors::AgentResult;
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

/// A bundle of tools the agent can offer to the model
#[async_trait]
pub trait System: Send + Sync {
    /// Get the name of the system, used to prefix its tool names
    fn name(&self) -> &str;

    /// Get the system description
    fn description(&self) -> &str;

    /// Get system instructions, rendered into the agent's system prompt
    fn instructions(&self) -> &str;

    /// Get available tools
    fn tools(&self) -> &[Tool];

    /// Call a tool with the given parameters.
    ///
    /// Each call must depend only on its arguments and the capabilities the system
    /// was built with, never on conversation state.
    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>>;
}
