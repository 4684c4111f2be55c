use std::sync::Arc;

use anyhow::{bail, Context, Result};

use coworker::agent_core::fs_tools::register_fs_tools;
use coworker::agent_core::{EventContext, Orchestrator, ThreadSink, ThreadStore, ToolRegistry};
use coworker::inference::config::{default_config_path, load_config};
use coworker::inference::InferenceClient;

/// When set, the conversation is loaded from and saved to this thread.
const THREAD_ENV: &str = "COWORKER_THREAD";

#[tokio::main]
async fn main() -> Result<()> {
    let request = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if request.trim().is_empty() {
        bail!("usage: coworker \"<request>\"");
    }

    let log_path = coworker::init_tracing();

    let config_path = default_config_path();
    let config = load_config(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let mut registry = ToolRegistry::with_builtins();
    register_fs_tools(&mut registry);

    let mut ctx = EventContext::new().with_progress(Arc::new(|label: &str, message: &str| {
        eprintln!("[{label}] {message}");
    }));

    let mut history = Vec::new();
    if let Ok(thread_id) = std::env::var(THREAD_ENV) {
        let db_path = coworker::default_db_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let store = Arc::new(ThreadStore::open(&db_path.to_string_lossy())?);
        store.create_thread_with_id(&thread_id)?;
        history = store.load_messages(&thread_id)?;
        tracing::info!(thread_id = %thread_id, messages = history.len(), "thread loaded");
        ctx = ctx.with_persistence(Arc::new(ThreadSink::new(Arc::clone(&store), thread_id)));
    }

    let client = InferenceClient::from_config(config.model.clone())?;
    if !client.health_check().await {
        tracing::warn!(endpoint = %config.model.base_url, "model endpoint is not reachable");
        eprintln!("warning: model endpoint {} is not reachable", config.model.base_url);
    }
    tracing::info!(
        model = %client.model_name(),
        tools = registry.len(),
        "orchestrator ready"
    );

    let orchestrator =
        Orchestrator::new(Arc::new(client), registry, config.agents.clone()).with_context(ctx);
    let result = orchestrator.handle_request(&history, &request).await;

    tracing::info!(
        route = ?result.route,
        log_file = %log_path.display(),
        "request handled"
    );
    println!("{}", result.text);
    Ok(())
}
