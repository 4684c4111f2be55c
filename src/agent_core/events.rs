//! Observer boundaries for a running request.
//!
//! Progress notifications and message persistence are optional collaborators.
//! They travel through every loop as an [`EventContext`] value that the caller
//! builds per request, so concurrent requests never share a listener.

use std::sync::Arc;

use super::types::Message;

// ─── Sinks ──────────────────────────────────────────────────────────────────

/// Receives `(agent_label, message)` notifications around tool execution.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, agent_label: &str, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn notify(&self, agent_label: &str, message: &str) {
        self(agent_label, message)
    }
}

/// Receives every message appended by a loop.
///
/// Fire-and-forget: implementations log their own failures and must not
/// block the loop.
pub trait MessageSink: Send + Sync {
    fn append(&self, message: &Message);

    /// The session history was reset. Earlier messages must not be offered
    /// as history again.
    fn mark_reset(&self) {}
}

// ─── EventContext ───────────────────────────────────────────────────────────

/// Per-request listeners. A missing sink is a no-op.
#[derive(Clone, Default)]
pub struct EventContext {
    progress: Option<Arc<dyn ProgressSink>>,
    persistence: Option<Arc<dyn MessageSink>>,
}

impl EventContext {
    /// A context with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn with_persistence(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.persistence = Some(sink);
        self
    }

    /// Same progress listener, no persistence. Used for sub-agents and the
    /// coordinator, whose private conversations are not part of the thread.
    pub fn without_persistence(&self) -> Self {
        Self {
            progress: self.progress.clone(),
            persistence: None,
        }
    }

    pub fn notify(&self, agent_label: &str, message: &str) {
        if let Some(sink) = &self.progress {
            sink.notify(agent_label, message);
        }
    }

    pub fn persist(&self, message: &Message) {
        if let Some(sink) = &self.persistence {
            sink.append(message);
        }
    }

    pub fn mark_reset(&self) {
        if let Some(sink) = &self.persistence {
            sink.mark_reset();
        }
    }

    pub fn has_persistence(&self) -> bool {
        self.persistence.is_some()
    }
}

impl std::fmt::Debug for EventContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventContext")
            .field("progress", &self.progress.is_some())
            .field("persistence", &self.persistence.is_some())
            .finish()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Message>>);

    impl MessageSink for Recorder {
        fn append(&self, message: &Message) {
            self.0.lock().unwrap().push(message.clone());
        }
    }

    #[test]
    fn test_empty_context_is_noop() {
        let ctx = EventContext::new();
        ctx.notify("agent", "hello");
        ctx.persist(&Message::user("hi"));
        assert!(!ctx.has_persistence());
    }

    #[test]
    fn test_closure_progress_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let ctx = EventContext::new().with_progress(Arc::new(move |label: &str, msg: &str| {
            seen_clone.lock().unwrap().push(format!("{label}: {msg}"));
        }));
        ctx.notify("Smart Agent", "calling list_files");
        assert_eq!(seen.lock().unwrap().as_slice(), ["Smart Agent: calling list_files"]);
    }

    #[test]
    fn test_without_persistence_keeps_progress() {
        let recorder = Arc::new(Recorder::default());
        let count = Arc::new(Mutex::new(0));
        let count_clone = Arc::clone(&count);
        let ctx = EventContext::new()
            .with_persistence(recorder.clone())
            .with_progress(Arc::new(move |_: &str, _: &str| {
                *count_clone.lock().unwrap() += 1;
            }));

        let sub = ctx.without_persistence();
        sub.persist(&Message::user("private"));
        sub.notify("sub", "working");

        assert!(recorder.0.lock().unwrap().is_empty());
        assert_eq!(*count.lock().unwrap(), 1);

        ctx.persist(&Message::user("public"));
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }
}
