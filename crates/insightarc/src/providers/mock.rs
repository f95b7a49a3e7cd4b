use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Provider, Usage};

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Message>>>,
    fallback: Option<Message>,
    fail: bool,
    calls: AtomicUsize,
    seen_tools: Mutex<Vec<Vec<String>>>,
    seen_systems: Mutex<Vec<String>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            fallback: None,
            fail: false,
            calls: AtomicUsize::new(0),
            seen_tools: Mutex::new(Vec::new()),
            seen_systems: Mutex::new(Vec::new()),
        }
    }

    /// A provider that answers every call with the same message
    pub fn repeating(response: Message) -> Self {
        let mut provider = Self::new(Vec::new());
        provider.fallback = Some(response);
        provider
    }

    /// A provider whose every call fails
    pub fn failing() -> Self {
        let mut provider = Self::new(Vec::new());
        provider.fail = true;
        provider
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Names of the tools offered on each call, in call order
    pub fn seen_tools(&self) -> Vec<Vec<String>> {
        self.seen_tools.lock().unwrap().clone()
    }

    pub fn seen_systems(&self) -> Vec<String> {
        self.seen_systems.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        system: &str,
        _messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_tools
            .lock()
            .unwrap()
            .push(tools.iter().map(|tool| tool.name.clone()).collect());
        self.seen_systems.lock().unwrap().push(system.to_string());

        if self.fail {
            return Err(anyhow!("mock backend unavailable"));
        }

        let mut responses = self.responses.lock().unwrap();
        if !responses.is_empty() {
            return Ok((responses.remove(0), Usage::default()));
        }
        match &self.fallback {
            Some(message) => Ok((message.clone(), Usage::default())),
            // Return empty response if no more pre-configured responses
            None => Ok((Message::assistant().with_text(""), Usage::default())),
        }
    }
}
