//! Configuration loading and validation.
//!
//! Reads `coworker.yaml` and resolves environment variables. The file holds
//! the model endpoint and the agent limits used by the orchestrator.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::errors::InferenceError;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "COWORKER_CONFIG";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
}

/// The model endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API, e.g. `http://localhost:11434/v1`.
    pub base_url: String,
    pub model_name: String,
    /// Bearer token. Usually supplied via `${OPENAI_API_KEY}` interpolation.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Limits and policy knobs for the agent loops and the delegation engine.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentsConfig {
    /// Round-trip cap for the planning coordinator.
    #[serde(default = "default_coordinator_max_iterations")]
    pub coordinator_max_iterations: usize,
    /// Round-trip cap for the general-purpose agent.
    #[serde(default = "default_agent_max_iterations")]
    pub agent_max_iterations: usize,
    /// Round-trip cap for each delegated sub-agent.
    #[serde(default = "default_sub_agent_max_iterations")]
    pub sub_agent_max_iterations: usize,
    /// A conversation longer than this is reset before the next request.
    #[serde(default = "default_max_conversation_messages")]
    pub max_conversation_messages: usize,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_max_tool_result_chars")]
    pub max_tool_result_chars: usize,
    /// Upper bound on sub-agents in flight at once. `0` means unbounded.
    #[serde(default = "default_max_concurrent_agents")]
    pub max_concurrent_agents: usize,
    /// Text that marks an assistant message as a failed turn.
    #[serde(default = "default_error_marker")]
    pub error_marker: String,
    /// Minimum number of discovered items (exclusive) that justifies a fan-out.
    #[serde(default = "default_bulk_threshold")]
    pub bulk_threshold: usize,
    /// Phrases the model may emit to request a fan-out.
    #[serde(default = "default_bulk_markers")]
    pub bulk_markers: Vec<String>,
    /// Tools whose results are mined for bulk items.
    #[serde(default = "default_discovery_tools")]
    pub discovery_tools: Vec<String>,
    /// Tools the coordinator may call while planning.
    #[serde(default = "default_planning_tools")]
    pub planning_tools: Vec<String>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            coordinator_max_iterations: default_coordinator_max_iterations(),
            agent_max_iterations: default_agent_max_iterations(),
            sub_agent_max_iterations: default_sub_agent_max_iterations(),
            max_conversation_messages: default_max_conversation_messages(),
            tool_timeout_secs: default_tool_timeout_secs(),
            max_tool_result_chars: default_max_tool_result_chars(),
            max_concurrent_agents: default_max_concurrent_agents(),
            error_marker: default_error_marker(),
            bulk_threshold: default_bulk_threshold(),
            bulk_markers: default_bulk_markers(),
            discovery_tools: default_discovery_tools(),
            planning_tools: default_planning_tools(),
        }
    }
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_coordinator_max_iterations() -> usize {
    5
}

fn default_agent_max_iterations() -> usize {
    15
}

fn default_sub_agent_max_iterations() -> usize {
    10
}

fn default_max_conversation_messages() -> usize {
    50
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_max_tool_result_chars() -> usize {
    6_000
}

fn default_max_concurrent_agents() -> usize {
    8
}

fn default_error_marker() -> String {
    "Error:".to_string()
}

fn default_bulk_threshold() -> usize {
    3
}

fn default_bulk_markers() -> Vec<String> {
    vec!["BULK_OPERATION_DETECTED".to_string()]
}

fn default_discovery_tools() -> Vec<String> {
    ["list_files", "list_directory", "search_files", "web_search", "find_urls"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_planning_tools() -> Vec<String> {
    vec!["think".to_string()]
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Resolve the config path: `$COWORKER_CONFIG`, else `<config_dir>/coworker/coworker.yaml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(expand_tilde(&path));
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("coworker")
        .join("coworker.yaml")
}

/// Load and validate the config file at `path`.
pub fn load_config(path: &Path) -> Result<AppConfig, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    parse_config(&raw)
}

/// Parse config YAML after `${VAR}` interpolation.
pub fn parse_config(raw: &str) -> Result<AppConfig, InferenceError> {
    let interpolated = interpolate_env_vars(raw);
    let config: AppConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| InferenceError::ConfigError {
            reason: format!("invalid config: {e}"),
        })?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> Result<(), InferenceError> {
    if config.model.base_url.trim().is_empty() {
        return Err(InferenceError::ConfigError {
            reason: "model.base_url must not be empty".into(),
        });
    }
    let agents = &config.agents;
    if agents.coordinator_max_iterations == 0
        || agents.agent_max_iterations == 0
        || agents.sub_agent_max_iterations == 0
    {
        return Err(InferenceError::ConfigError {
            reason: "iteration limits must be at least 1".into(),
        });
    }
    Ok(())
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
