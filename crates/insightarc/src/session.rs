use serde::Serialize;

use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::models::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Finished,
    Errored,
}

/// How a request for this session is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    /// The opening turn: run the full research pipeline
    Research,
    /// Any later turn: answer directly from the conversation so far
    FollowUp,
}

/// One research topic and the turns exchanged about it
#[derive(Debug, Clone, Serialize)]
pub struct ResearchSession {
    id: String,
    opening_prompt: String,
    turns: Vec<Message>,
    state: SessionState,
}

impl ResearchSession {
    /// Start a session for a new topic
    pub fn new<S: Into<String>>(prompt: S) -> Self {
        let prompt = prompt.into();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            turns: vec![Message::user().with_text(prompt.clone())],
            opening_prompt: prompt,
            state: SessionState::Idle,
        }
    }

    /// Rebuild a session from the turn history a client sent
    pub fn from_history(id: Option<String>, turns: Vec<Message>) -> AgentResult<Self> {
        let first = turns
            .first()
            .ok_or_else(|| AgentError::InvalidParameters("no messages".into()))?;
        if first.role != Role::User {
            return Err(AgentError::InvalidParameters(
                "the first message must come from the user".into(),
            ));
        }
        Ok(Self {
            id: id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()),
            opening_prompt: first.text(),
            turns,
            state: SessionState::Idle,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn opening_prompt(&self) -> &str {
        &self.opening_prompt
    }

    pub fn turns(&self) -> &[Message] {
        &self.turns
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> ReplyMode {
        if self.turns.len() > 1 {
            ReplyMode::FollowUp
        } else {
            ReplyMode::Research
        }
    }

    pub fn push_turn(&mut self, message: Message) {
        self.turns.push(message);
    }

    /// Discard everything and begin again with a new topic.
    ///
    /// For the client-side controller that owns a session across turns; the HTTP
    /// server rebuilds a session from the submitted history on every request instead.
    pub fn reset<S: Into<String>>(&mut self, prompt: S) {
        *self = Self::new(prompt);
    }

    pub fn start(&mut self) -> AgentResult<()> {
        if self.state == SessionState::Running {
            return Err(AgentError::InvalidState("session is already running".into()));
        }
        self.state = SessionState::Running;
        Ok(())
    }

    pub fn finish(&mut self) -> AgentResult<()> {
        self.transition_from_running(SessionState::Finished)
    }

    pub fn fail(&mut self) -> AgentResult<()> {
        self.transition_from_running(SessionState::Errored)
    }

    fn transition_from_running(&mut self, next: SessionState) -> AgentResult<()> {
        if self.state != SessionState::Running {
            return Err(AgentError::InvalidState(format!(
                "cannot move from {:?} to {:?}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}
