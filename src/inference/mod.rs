//! Inference Client: OpenAI-compatible API client for the language model.
//!
//! The orchestration layer only sees the [`ModelClient`] trait: a conversation
//! plus a tool catalog goes in, one assistant message comes out.
//!
//! - `client`: `ModelClient` trait and the HTTP `InferenceClient`
//! - `config`: YAML configuration with `${VAR}` interpolation
//! - `response`: non-streaming response parsing
//! - `types`: wire types for the Chat Completions API

pub mod client;
pub mod config;
pub mod errors;
pub mod response;
pub mod types;

pub use client::{InferenceClient, ModelClient};
pub use config::{AgentsConfig, AppConfig, ModelConfig};
pub use errors::InferenceError;
pub use types::{ChatMessage, Role, ToolCall, ToolDefinition};
