//! In-process filesystem tools: `list_directory` and `read_file`.
//!
//! Small enough to run without a tool server; they give the binary a
//! discovery tool for the dynamic switch to mine.

use std::path::PathBuf;

use anyhow::Context;
use serde_json::{json, Value};

use super::tool_registry::{FnTool, ToolRegistry};

/// Cap on `read_file` output before the executor's own result cap.
const MAX_READ_BYTES: usize = 64 * 1024;

/// Register `list_directory` and `read_file`.
pub fn register_fs_tools(registry: &mut ToolRegistry) {
    registry.register(FnTool::new(
        "list_directory",
        "List the entries of a directory. Returns name, path, type and size per entry.",
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory path; defaults to the current directory"}
            }
        }),
        list_directory,
    ));
    registry.register(FnTool::new(
        "read_file",
        "Read a UTF-8 text file.",
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path"}
            },
            "required": ["path"]
        }),
        read_file,
    ));
}

fn resolve_path(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(raw)
}

async fn list_directory(args: Value) -> anyhow::Result<Value> {
    let raw = args.get("path").and_then(Value::as_str).unwrap_or(".");
    let dir = resolve_path(raw);

    let mut reader = tokio::fs::read_dir(&dir)
        .await
        .with_context(|| format!("cannot list {}", dir.display()))?;

    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let meta = entry.metadata().await?;
        entries.push(json!({
            "name": entry.file_name().to_string_lossy(),
            "path": entry.path().to_string_lossy(),
            "type": if meta.is_dir() { "dir" } else { "file" },
            "size": meta.len(),
        }));
    }
    entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

    Ok(json!({ "path": dir.to_string_lossy(), "entries": entries }))
}

async fn read_file(args: Value) -> anyhow::Result<Value> {
    let raw = args
        .get("path")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .context("'path' is required")?;
    let path = resolve_path(raw);

    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;

    if content.len() <= MAX_READ_BYTES {
        return Ok(Value::String(content));
    }
    let mut end = MAX_READ_BYTES;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    Ok(Value::String(format!(
        "{}\n\n[... truncated, showing first {end} of {} bytes]",
        &content[..end],
        content.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_directory_sorted_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "bb").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let out = list_directory(json!({"path": dir.path().to_str().unwrap()}))
            .await
            .unwrap();
        let entries = out["entries"].as_array().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(entries[1]["size"], 2);
        assert_eq!(entries[2]["type"], "dir");
    }

    #[tokio::test]
    async fn test_read_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.md");
        std::fs::write(&path, "# hello").unwrap();

        let out = read_file(json!({"path": path.to_str().unwrap()})).await.unwrap();
        assert_eq!(out, json!("# hello"));

        let err = read_file(json!({"path": dir.path().join("nope").to_str().unwrap()}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot read"));
        assert!(read_file(json!({})).await.is_err());
    }

    #[test]
    fn test_register_fs_tools() {
        let mut registry = ToolRegistry::new();
        register_fs_tools(&mut registry);
        assert_eq!(registry.tool_names(), vec!["list_directory", "read_file"]);
    }
}
