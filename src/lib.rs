pub mod agent_core;
pub mod inference;

use std::path::{Path, PathBuf};

/// Environment variable selecting JSON log lines instead of plain text.
pub const LOG_JSON_ENV: &str = "COWORKER_LOG_JSON";

/// Return the platform-standard data directory for Coworker.
///
/// - macOS: `~/Library/Application Support/com.coworker.app/`
/// - Windows: `{FOLDERID_RoamingAppData}\com.coworker.app\`
/// - Linux: `$XDG_DATA_HOME/com.coworker.app/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.coworker/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("com.coworker.app");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".coworker")
}

/// Path of the thread store database inside the data directory.
pub fn default_db_path() -> PathBuf {
    data_dir().join("threads.db")
}

/// Initialize the tracing subscriber, writing to `<data_dir>/agent.log`.
///
/// On each startup the previous logs are rotated (keeps the last 3) and a
/// fresh file is opened behind a line-flushing writer. If the file can't be
/// opened, logs go to stderr. Returns the log file path.
pub fn init_tracing() -> PathBuf {
    use tracing_subscriber::EnvFilter;

    let log_dir = data_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    let log_path = log_dir.join("agent.log");

    rotate_log_file(&log_path, 3);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("coworker=info,warn"));
    let json = std::env::var_os(LOG_JSON_ENV).is_some();

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);

    let (init, file_error) = match file {
        Ok(file) => {
            let writer = FlushingWriter::new(file);
            let init = if json {
                builder.json().with_writer(writer).try_init()
            } else {
                builder.with_writer(writer).try_init()
            };
            (init, None)
        }
        Err(e) => {
            let init = if json {
                builder.json().with_writer(std::io::stderr).try_init()
            } else {
                builder.with_writer(std::io::stderr).try_init()
            };
            (init, Some(e))
        }
    };

    if init.is_err() {
        // A subscriber is already installed (tests, embedding apps).
        return log_path;
    }

    if let Some(e) = file_error {
        tracing::warn!(path = %log_path.display(), error = %e, "failed to open log file, logging to stderr");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %log_dir.display(),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== Coworker starting ==="
    );

    log_path
}

/// Rotate log files: `agent.log` → `agent.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write, so a
/// crash never loses the last log lines.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
