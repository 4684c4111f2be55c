//! Conversation state: structural validation and the reset policy.
//!
//! - `validate` trims a suffix that holds an assistant turn with an
//!   unanswered tool call, so the model never sees a call without its result
//! - `ResetPolicy` decides when a session's history is thrown away before the
//!   next user turn
//! - `ConversationManager` is the append-only log a loop writes into

use std::collections::HashSet;

use crate::inference::types::Role;

use super::types::Message;

// ─── Validation ─────────────────────────────────────────────────────────────

/// Ids of tool calls issued by assistant turns that no tool turn answers.
pub fn unanswered_tool_call_ids(messages: &[Message]) -> HashSet<String> {
    let issued: HashSet<&str> = messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .flat_map(|m| m.requested_calls().iter().map(|c| c.id.as_str()))
        .collect();

    let answered: HashSet<&str> = messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();

    issued
        .difference(&answered)
        .map(|id| (*id).to_string())
        .collect()
}

/// Drop the suffix starting at the latest assistant turn with an unanswered
/// call, plus the user turn right before it.
///
/// Repeats until no unanswered call remains, so an orphan buried earlier in
/// the history is removed as well. Already-valid input comes back unchanged.
pub fn validate(messages: &[Message]) -> Vec<Message> {
    let mut end = messages.len();

    loop {
        let current = &messages[..end];
        let unanswered = unanswered_tool_call_ids(current);
        if unanswered.is_empty() {
            break;
        }

        let cut = current.iter().rposition(|m| {
            m.role == Role::Assistant
                && m.requested_calls().iter().any(|c| unanswered.contains(&c.id))
        });

        // Unanswered ids always come from an assistant turn.
        let Some(mut cut) = cut else { break };
        if cut > 0 && current[cut - 1].role == Role::User {
            cut -= 1;
        }

        tracing::debug!(
            removed = end - cut,
            unanswered = unanswered.len(),
            "trimming conversation with unanswered tool calls"
        );
        end = cut;
    }

    messages[..end].to_vec()
}

// ─── Reset Policy ───────────────────────────────────────────────────────────

/// Why a conversation is reset before the next turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    /// The latest assistant text carries the error marker.
    ErrorMarker,
    /// Some assistant tool call was never answered.
    UnansweredToolCall,
    /// The history exceeds the configured maximum.
    TooLong,
}

/// Blunt recovery: history in a bad state is dropped, keeping only the
/// leading system prompt.
#[derive(Debug, Clone)]
pub struct ResetPolicy {
    pub error_marker: String,
    pub max_messages: usize,
}

impl ResetPolicy {
    pub fn new(error_marker: impl Into<String>, max_messages: usize) -> Self {
        Self {
            error_marker: error_marker.into(),
            max_messages,
        }
    }

    pub fn reset_reason(&self, history: &[Message]) -> Option<ResetReason> {
        let last_assistant = history.iter().rev().find(|m| m.role == Role::Assistant);
        if let Some(msg) = last_assistant {
            if !self.error_marker.is_empty() && msg.content_str().contains(&self.error_marker) {
                return Some(ResetReason::ErrorMarker);
            }
        }

        if !unanswered_tool_call_ids(history).is_empty() {
            return Some(ResetReason::UnansweredToolCall);
        }

        if history.len() > self.max_messages {
            return Some(ResetReason::TooLong);
        }

        None
    }

    /// Build the conversation for a new user turn: reset if needed, append
    /// the user message, then validate.
    pub fn prepare(&self, history: &[Message], user_input: &str) -> Vec<Message> {
        let mut conversation = match self.reset_reason(history) {
            Some(reason) => {
                tracing::info!(
                    ?reason,
                    dropped = history.len(),
                    "resetting conversation before new turn"
                );
                history
                    .first()
                    .filter(|m| m.role == Role::System)
                    .cloned()
                    .into_iter()
                    .collect()
            }
            None => history.to_vec(),
        };

        conversation.push(Message::user(user_input));
        validate(&conversation)
    }
}

// ─── ConversationManager ────────────────────────────────────────────────────

/// Append-only message log owned by one loop invocation.
#[derive(Debug, Clone, Default)]
pub struct ConversationManager {
    messages: Vec<Message>,
}

impl ConversationManager {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
