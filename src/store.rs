//! Reading the previous export back as a cache, and writing the new one.

use crate::model::SessionRecord;
use eyre::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Previously exported records, indexed by `chat_session.id`.
#[derive(Debug, Default)]
pub struct SyncState {
    records: HashMap<String, SessionRecord>,
}

impl SyncState {
    /// Index `records` by session id. Records without one are ignored;
    /// on duplicate ids the later record wins.
    pub fn from_records(records: impl IntoIterator<Item = SessionRecord>) -> Self {
        let mut map = HashMap::new();
        for record in records {
            if let Some(id) = record.session_id() {
                map.insert(id.to_string(), record);
            }
        }
        Self { records: map }
    }

    pub fn get(&self, session_id: &str) -> Option<&SessionRecord> {
        self.records.get(session_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Load the previous export at `path`.
///
/// Never fails: a missing file is an empty cache, and an unreadable or
/// malformed one is logged and treated as empty.
pub fn load_sync_state(path: &Path) -> SyncState {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no previous export, starting from scratch");
        return SyncState::default();
    }

    let state = match read_records(path) {
        Ok(records) => SyncState::from_records(records),
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring previous export: {e:#}");
            return SyncState::default();
        }
    };
    tracing::info!(path = %path.display(), cached = state.len(), "loaded previous export");
    state
}

fn read_records(path: &Path) -> Result<Vec<SessionRecord>> {
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content).wrap_err("Invalid JSON")?;
    match value {
        Value::Array(items) => Ok(items.into_iter().map(SessionRecord::new).collect()),
        _ => Err(eyre::eyre!("Top-level value is not an array")),
    }
}

/// Write `records` to `path` as one pretty-printed JSON array.
///
/// The data goes to a temporary file next to `path` first and is renamed over
/// it, so readers never observe a half-written export.
pub fn save_output(path: &Path, records: &[SessionRecord]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
        .wrap_err_with(|| format!("Failed to create output directory: {}", dir.display()))?;

    let tmp = NamedTempFile::new_in(dir).wrap_err("Failed to create temporary file")?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, records)
            .wrap_err("Failed to serialize export")?;
        writer.flush().wrap_err("Failed to flush export")?;
    }
    // Keep the mode of the file being replaced; the temp file starts out 0600.
    if let Ok(existing) = fs::metadata(path) {
        tmp.as_file()
            .set_permissions(existing.permissions())
            .wrap_err("Failed to copy permissions of the previous export")?;
    }
    tmp.persist(path)
        .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
