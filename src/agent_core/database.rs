//! SQLite thread store for session conversations.
//!
//! Uses `rusqlite` synchronously behind a mutex; appends are small and the
//! loop never waits on anything but the insert itself. WAL mode is enabled
//! so a second process can read a thread while it is being written.
//!
//! The log is append-only. A reset moves the thread's `reset_after` mark to
//! its latest row, and [`ThreadStore::load_messages`] only returns rows past
//! the mark.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::errors::AgentError;
use super::events::MessageSink;
use super::types::Message;
use crate::inference::types::{Role, ToolCall};

// ─── ThreadStore ────────────────────────────────────────────────────────────

/// Persistent message log, one thread per session.
pub struct ThreadStore {
    conn: Mutex<Connection>,
}

impl ThreadStore {
    /// Open (or create) the store at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, AgentError> {
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AgentError> {
        self.conn.lock().map_err(|e| AgentError::DatabaseError {
            reason: format!("connection lock poisoned: {e}"),
        })
    }

    fn create_tables(&self) -> Result<(), AgentError> {
        self.lock()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS threads (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                reset_after INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS thread_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT,
                tool_calls TEXT,
                tool_call_id TEXT,
                name TEXT,
                FOREIGN KEY (thread_id) REFERENCES threads(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_thread_messages_thread
                ON thread_messages(thread_id, id);
            ",
        )?;
        Ok(())
    }

    // ─── Threads ────────────────────────────────────────────────────────

    /// Create a thread with a fresh id and return it.
    pub fn create_thread(&self) -> Result<String, AgentError> {
        let id = Uuid::new_v4().to_string();
        self.create_thread_with_id(&id)?;
        Ok(id)
    }

    /// Create a thread with a caller-chosen id. Existing threads are kept.
    pub fn create_thread_with_id(&self, thread_id: &str) -> Result<(), AgentError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.lock()?.execute(
            "INSERT OR IGNORE INTO threads (id, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![thread_id, now],
        )?;
        Ok(())
    }

    pub fn thread_exists(&self, thread_id: &str) -> Result<bool, AgentError> {
        let found = self
            .lock()?
            .query_row(
                "SELECT 1 FROM threads WHERE id = ?1",
                params![thread_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Hide every message stored so far from [`Self::load_messages`].
    pub fn mark_reset(&self, thread_id: &str) -> Result<(), AgentError> {
        let now = chrono::Utc::now().to_rfc3339();
        let updated = self.lock()?.execute(
            "UPDATE threads
             SET reset_after = COALESCE(
                     (SELECT MAX(id) FROM thread_messages WHERE thread_id = ?1), 0),
                 updated_at = ?2
             WHERE id = ?1",
            params![thread_id, now],
        )?;
        if updated == 0 {
            return Err(AgentError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            });
        }
        Ok(())
    }

    // ─── Messages ───────────────────────────────────────────────────────

    /// Append one message to a thread. Returns the row id.
    pub fn append_message(&self, thread_id: &str, msg: &Message) -> Result<i64, AgentError> {
        if !self.thread_exists(thread_id)? {
            return Err(AgentError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            });
        }

        let tool_calls_json = msg
            .tool_calls
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = chrono::Utc::now().to_rfc3339();

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO thread_messages
             (thread_id, created_at, role, content, tool_calls, tool_call_id, name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                thread_id,
                now,
                msg.role.as_str(),
                msg.content,
                tool_calls_json,
                msg.tool_call_id,
                msg.name,
            ],
        )?;
        conn.execute(
            "UPDATE threads SET updated_at = ?1 WHERE id = ?2",
            params![now, thread_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Messages of a thread since its last reset, in append order.
    pub fn load_messages(&self, thread_id: &str) -> Result<Vec<Message>, AgentError> {
        if !self.thread_exists(thread_id)? {
            return Err(AgentError::ThreadNotFound {
                thread_id: thread_id.to_string(),
            });
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT role, content, tool_calls, tool_call_id, name
             FROM thread_messages
             WHERE thread_id = ?1
               AND id > (SELECT reset_after FROM threads WHERE id = ?1)
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![thread_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (role, content, tool_calls, tool_call_id, name) = row?;
            let tool_calls = tool_calls
                .map(|json| serde_json::from_str::<Vec<ToolCall>>(&json))
                .transpose()?;
            messages.push(Message {
                role: Role::parse(&role),
                content,
                tool_calls,
                tool_call_id,
                name,
            });
        }
        Ok(messages)
    }

    /// Every stored message of a thread, including those before a reset.
    pub fn message_count(&self, thread_id: &str) -> Result<usize, AgentError> {
        let count: i64 = self.lock()?.query_row(
            "SELECT COUNT(*) FROM thread_messages WHERE thread_id = ?1",
            params![thread_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

// ─── ThreadSink ─────────────────────────────────────────────────────────────

/// Persistence sink writing into one thread. Failures are logged, never
/// propagated to the loop.
pub struct ThreadSink {
    store: Arc<ThreadStore>,
    thread_id: String,
}

impl ThreadSink {
    pub fn new(store: Arc<ThreadStore>, thread_id: impl Into<String>) -> Self {
        Self {
            store,
            thread_id: thread_id.into(),
        }
    }
}

impl MessageSink for ThreadSink {
    fn append(&self, message: &Message) {
        if let Err(e) = self.store.append_message(&self.thread_id, message) {
            tracing::warn!(
                thread_id = %self.thread_id,
                role = message.role.as_str(),
                error = %e,
                "failed to persist message"
            );
        }
    }

    fn mark_reset(&self) {
        if let Err(e) = self.store.mark_reset(&self.thread_id) {
            tracing::warn!(
                thread_id = %self.thread_id,
                error = %e,
                "failed to record conversation reset"
            );
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> ThreadStore {
        ThreadStore::open(":memory:").unwrap()
    }

    fn sample_conversation() -> Vec<Message> {
        vec![
            Message::user("list files"),
            Message::assistant_tool_calls(
                Some("Let me look.".into()),
                vec![ToolCall {
                    id: "call_1".into(),
                    name: "list_files".into(),
                    arguments: r#"{"path": "."}"#.into(),
                }],
            ),
            Message::tool_result("call_1", "list_files", r#"["a.txt"]"#),
            Message::assistant("One file: a.txt"),
        ]
    }

    #[test]
    fn test_append_and_load_round_trip() {
        let store = test_store();
        let thread = store.create_thread().unwrap();
        for msg in sample_conversation() {
            store.append_message(&thread, &msg).unwrap();
        }

        let loaded = store.load_messages(&thread).unwrap();
        assert_eq!(loaded, sample_conversation());
        assert_eq!(store.message_count(&thread).unwrap(), 4);
    }

    #[test]
    fn test_unknown_thread() {
        let store = test_store();
        let err = store.load_messages("nope").unwrap_err();
        assert!(matches!(err, AgentError::ThreadNotFound { .. }));
        assert!(store.append_message("nope", &Message::user("x")).is_err());
        assert!(store.mark_reset("nope").is_err());
    }

    #[test]
    fn test_threads_are_isolated() {
        let store = test_store();
        let a = store.create_thread().unwrap();
        let b = store.create_thread().unwrap();
        store.append_message(&a, &Message::user("in a")).unwrap();

        assert_eq!(store.load_messages(&a).unwrap().len(), 1);
        assert!(store.load_messages(&b).unwrap().is_empty());
    }

    #[test]
    fn test_create_with_id_is_idempotent() {
        let store = test_store();
        store.create_thread_with_id("main").unwrap();
        store.append_message("main", &Message::user("hi")).unwrap();
        store.create_thread_with_id("main").unwrap();
        assert_eq!(store.message_count("main").unwrap(), 1);
    }

    #[test]
    fn test_reset_hides_earlier_messages() {
        let store = test_store();
        let thread = store.create_thread().unwrap();
        for msg in sample_conversation() {
            store.append_message(&thread, &msg).unwrap();
        }

        store.mark_reset(&thread).unwrap();
        assert!(store.load_messages(&thread).unwrap().is_empty());

        store.append_message(&thread, &Message::user("fresh start")).unwrap();
        assert_eq!(
            store.load_messages(&thread).unwrap(),
            vec![Message::user("fresh start")]
        );
        assert_eq!(store.message_count(&thread).unwrap(), 5);
    }

    #[test]
    fn test_reset_on_empty_thread() {
        let store = test_store();
        store.create_thread_with_id("t").unwrap();
        store.mark_reset("t").unwrap();
        store.append_message("t", &Message::user("first")).unwrap();
        assert_eq!(store.load_messages("t").unwrap(), vec![Message::user("first")]);
    }

    #[test]
    fn test_reset_does_not_touch_other_threads() {
        let store = test_store();
        store.create_thread_with_id("a").unwrap();
        store.create_thread_with_id("b").unwrap();
        store.append_message("a", &Message::user("a1")).unwrap();
        store.append_message("b", &Message::user("b1")).unwrap();
        store.mark_reset("a").unwrap();
        store.append_message("b", &Message::user("b2")).unwrap();

        assert!(store.load_messages("a").unwrap().is_empty());
        assert_eq!(store.load_messages("b").unwrap().len(), 2);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threads.db");
        let path = path.to_str().unwrap();

        {
            let store = ThreadStore::open(path).unwrap();
            store.create_thread_with_id("t").unwrap();
            store.append_message("t", &Message::user("remember me")).unwrap();
        }

        let store = ThreadStore::open(path).unwrap();
        assert_eq!(store.load_messages("t").unwrap(), vec![Message::user("remember me")]);
    }

    #[test]
    fn test_sink_writes_and_swallows_errors() {
        let store = Arc::new(test_store());
        store.create_thread_with_id("t").unwrap();

        ThreadSink::new(Arc::clone(&store), "t").append(&Message::user("saved"));
        // Missing thread: logged, not panicked.
        ThreadSink::new(Arc::clone(&store), "missing").append(&Message::user("lost"));
        ThreadSink::new(Arc::clone(&store), "missing").mark_reset();

        assert_eq!(store.message_count("t").unwrap(), 1);

        ThreadSink::new(Arc::clone(&store), "t").mark_reset();
        assert!(store.load_messages("t").unwrap().is_empty());
    }
}
