//! Discovery of past Claude conversations, grouped by project folder.
//!
//! Claude stores each project's history under `~/.claude/projects/<encoded path>/`
//! as one `*.jsonl` file per session. The encoded folder name is the project path
//! with separators (and the drive colon) replaced by `-`.

use crate::config::home_dir;
use crate::log_debug;
use crate::utf8_safe::safe_prefix;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const SUMMARY_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub file: String,
    pub size: u64,
    /// Milliseconds since the Unix epoch.
    pub modified: u64,
    pub message_count: usize,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextFolder {
    pub encoded_name: String,
    pub path: String,
    pub name: String,
    pub path_exists: bool,
    pub has_claude: bool,
    pub has_gemini: bool,
    pub is_home: bool,
    pub claude_sessions: Vec<SessionSummary>,
    pub total_sessions: usize,
    pub last_modified: u64,
}

/// Turn an encoded folder name back into the project path.
///
/// `D--projects-app` becomes `D:\projects\app`; `-home-me-app` becomes `/home/me/app`.
/// Hyphens inside the original names cannot be told apart from separators.
pub fn decode_project_path(encoded: &str) -> String {
    let parts: Vec<&str> = encoded.split('-').collect();
    let first = parts.first().copied().unwrap_or("");
    let is_drive = first.len() == 1 && first.chars().all(|c| c.is_ascii_alphabetic());
    if is_drive {
        let rest: Vec<&str> = parts[1..].iter().copied().filter(|p| !p.is_empty()).collect();
        return format!("{}:\\{}", first.to_ascii_uppercase(), rest.join("\\"));
    }
    let segments: Vec<&str> = parts.into_iter().filter(|p| !p.is_empty()).collect();
    if encoded.starts_with('-') {
        format!("/{}", segments.join("/"))
    } else {
        segments.join("/")
    }
}

/// Scan `projects_dir` and list every folder with at least one session, newest first.
///
/// A missing projects directory yields an empty list. `root_path` keeps only
/// folders whose decoded path starts with it.
pub fn scan_context_folders(projects_dir: &Path, root_path: Option<&str>) -> Result<Vec<ContextFolder>> {
    if !projects_dir.is_dir() {
        log_debug(&format!(
            "context scan: {} does not exist",
            projects_dir.display()
        ));
        return Ok(Vec::new());
    }
    let home = home_dir();
    let root_filter = root_path.map(str::trim).filter(|r| !r.is_empty());

    let mut folders = Vec::new();
    let entries = fs::read_dir(projects_dir)
        .with_context(|| format!("failed to read {}", projects_dir.display()))?;
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        let encoded_name = entry.file_name().to_string_lossy().to_string();
        let decoded = decode_project_path(&encoded_name);
        if let Some(root) = root_filter {
            if !decoded.starts_with(root) {
                continue;
            }
        }
        let sessions = sessions_for_project(&entry.path());
        if sessions.is_empty() {
            continue;
        }
        let last_modified = entry
            .metadata()
            .ok()
            .and_then(|meta| meta.modified().ok())
            .map(epoch_millis)
            .unwrap_or(0);
        folders.push(describe_folder(encoded_name, decoded, sessions, last_modified, &home));
    }

    folders.sort_by(|a, b| newest_activity(b).cmp(&newest_activity(a)));
    Ok(folders)
}

fn describe_folder(
    encoded_name: String,
    path: String,
    sessions: Vec<SessionSummary>,
    last_modified: u64,
    home: &Path,
) -> ContextFolder {
    let actual = Path::new(&path);
    let path_exists = actual.exists();
    let has_claude = path_exists && actual.join(".claude").exists();
    let has_gemini = path_exists && actual.join(".gemini").exists();
    let is_home = same_path(actual, home);

    let base = path.rsplit(['/', '\\']).find(|s| !s.is_empty()).unwrap_or("");
    let is_bare_drive = base.len() == 2 && base.ends_with(':');
    let name = if is_home {
        "~ (Home)".to_string()
    } else if base.is_empty() || is_bare_drive {
        path.clone()
    } else {
        base.to_string()
    };

    ContextFolder {
        encoded_name,
        name,
        path_exists,
        has_claude,
        has_gemini,
        is_home,
        total_sessions: sessions.len(),
        claude_sessions: sessions,
        last_modified,
        path,
    }
}

fn newest_activity(folder: &ContextFolder) -> u64 {
    folder
        .claude_sessions
        .first()
        .map(|s| s.modified)
        .unwrap_or(folder.last_modified)
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Non-empty `*.jsonl` sessions in a project folder, newest first. Sub-agent
/// transcripts (`agent-*.jsonl`) are skipped.
pub fn sessions_for_project(project_dir: &Path) -> Vec<SessionSummary> {
    let entries = match fs::read_dir(project_dir) {
        Ok(entries) => entries,
        Err(err) => {
            log_debug(&format!(
                "context scan: cannot read {}: {err}",
                project_dir.display()
            ));
            return Vec::new();
        }
    };

    let mut sessions: Vec<SessionSummary> = entries
        .flatten()
        .filter_map(|entry| {
            let file = entry.file_name().to_string_lossy().to_string();
            let id = file.strip_suffix(".jsonl")?.to_string();
            if file.starts_with("agent-") {
                return None;
            }
            let meta = entry.metadata().ok()?;
            if !meta.is_file() || meta.len() == 0 {
                return None;
            }
            let (message_count, summary) = summarize_session(&entry.path());
            Some(SessionSummary {
                id,
                file,
                size: meta.len(),
                modified: meta.modified().map(epoch_millis).unwrap_or(0),
                message_count,
                summary,
            })
        })
        .collect();
    sessions.sort_by(|a, b| b.modified.cmp(&a.modified));
    sessions
}

fn summarize_session(path: &Path) -> (usize, String) {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return (0, "No summary".to_string()),
    };
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();

    let mut first_message: Option<String> = None;
    for line in &lines {
        let Ok(record) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        match record.get("type").and_then(Value::as_str) {
            Some("summary") => {
                if let Some(summary) = record.get("summary").and_then(Value::as_str) {
                    return (lines.len(), summary.to_string());
                }
            }
            Some("user") if first_message.is_none() => {
                first_message = record
                    .get("message")
                    .and_then(|m| m.get("content"))
                    .and_then(message_text)
                    .map(|text| safe_prefix(&text, SUMMARY_PREVIEW_CHARS).to_string());
            }
            _ => {}
        }
    }
    (
        lines.len(),
        first_message.unwrap_or_else(|| "No summary".to_string()),
    )
}

/// User content is either a plain string or a list of content blocks.
fn message_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .find(|text| !text.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
