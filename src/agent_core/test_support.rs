//! Fake model clients shared by the agent core tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::inference::types::{Role, ToolCall, ToolDefinition};
use crate::inference::{InferenceError, ModelClient};

use super::types::Message;

pub(crate) fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

/// Text of the last user message in a request.
pub(crate) fn last_user_text(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content_str().to_string())
        .unwrap_or_default()
}

/// Replays a fixed sequence of responses, then answers "script exhausted".
pub(crate) struct ScriptedClient {
    script: Mutex<VecDeque<Result<Message, InferenceError>>>,
    requests: Mutex<Vec<(Vec<Message>, Vec<String>)>>,
}

impl ScriptedClient {
    pub(crate) fn new(script: Vec<Result<Message, InferenceError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request seen: the conversation and the offered tool names.
    pub(crate) fn requests(&self) -> Vec<(Vec<Message>, Vec<String>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Message, InferenceError> {
        self.requests.lock().unwrap().push((
            messages.to_vec(),
            tools.iter().map(|t| t.name().to_string()).collect(),
        ));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Message::assistant("script exhausted")))
    }
}

type Responder = dyn Fn(&[Message]) -> Result<Message, InferenceError> + Send + Sync;

/// One model call as observed by [`FnClient`].
#[derive(Debug, Clone)]
pub(crate) struct CallRecord {
    pub user_text: String,
    pub started: Instant,
    pub finished: Instant,
}

/// Answers each request with a closure after an optional simulated latency.
pub(crate) struct FnClient {
    delay: Duration,
    respond: Box<Responder>,
    calls: Mutex<Vec<CallRecord>>,
}

impl FnClient {
    pub(crate) fn new<F>(respond: F) -> Self
    where
        F: Fn(&[Message]) -> Result<Message, InferenceError> + Send + Sync + 'static,
    {
        Self {
            delay: Duration::ZERO,
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for FnClient {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<Message, InferenceError> {
        let started = Instant::now();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let response = (self.respond)(messages);
        self.calls.lock().unwrap().push(CallRecord {
            user_text: last_user_text(messages),
            started,
            finished: Instant::now(),
        });
        response
    }
}
