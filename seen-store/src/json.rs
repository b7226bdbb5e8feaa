use crate::SeenStore;
use async_trait::async_trait;
use chrono::Utc;
use monitor_core::{CoreError, Listing, SeenRecord, StorageError};
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Ledger kept as one JSON object, `{id: {"data": …, "timestamp": …}}`.
///
/// Every `record` rewrites the whole file through a temporary sibling that is
/// fsynced and renamed over the ledger, so a crash leaves either the old or the
/// new file on disk.
#[derive(Debug)]
pub struct JsonLedger {
    path: PathBuf,
    // Raw entries: any key present counts as seen, even if its payload no
    // longer matches the current listing schema.
    entries: Map<String, Value>,
}

impl JsonLedger {
    /// Load the ledger at `path`. A missing or empty file starts an empty
    /// ledger; unparseable content is an error.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref().to_path_buf();
        let shown = path.display().to_string();

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No ledger at {}, starting empty", shown);
                String::new()
            }
            Err(e) => {
                return Err(StorageError::ReadFailed {
                    path: shown,
                    reason: e.to_string(),
                }
                .into())
            }
        };

        let entries = if raw.trim().is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(entries)) => entries,
                Ok(other) => {
                    return Err(StorageError::CorruptLedger {
                        path: shown,
                        details: format!("expected a JSON object, found {}", json_kind(&other)),
                    }
                    .into())
                }
                Err(e) => {
                    return Err(StorageError::CorruptLedger {
                        path: shown,
                        details: e.to_string(),
                    }
                    .into())
                }
            }
        };

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry_for(&self, listing: &Listing) -> Result<Value, CoreError> {
        // Keep the first-seen time of an existing entry
        let timestamp = self
            .get(&listing.id)
            .map(|record| record.timestamp)
            .unwrap_or_else(Utc::now);

        Ok(json!({
            "data": serde_json::to_value(listing)?,
            "timestamp": timestamp.to_rfc3339(),
        }))
    }
}

#[async_trait]
impl SeenStore for JsonLedger {
    fn is_seen(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    async fn record(&mut self, listing: &Listing) -> Result<(), CoreError> {
        let entry = self.entry_for(listing)?;

        let mut next = self.entries.clone();
        next.insert(listing.id.clone(), entry);
        let bytes = serde_json::to_vec_pretty(&next)?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| CoreError::Internal {
                message: format!("ledger writer task failed: {}", e),
            })??;

        self.entries = next;
        debug!(id = %listing.id, total = self.entries.len(), "Recorded listing");
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, id: &str) -> Option<SeenRecord> {
        let value = self.entries.get(id)?;
        match serde_json::from_value(value.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(id, error = %e, "Ledger entry does not match the listing schema");
                None
            }
        }
    }
}

/// Replace `path` with `bytes` via a fsynced temporary file in the same
/// directory.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let shown = path.display().to_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StorageError::from_io(&shown, &e))?;
    tmp.write_all(bytes)
        .map_err(|e| StorageError::from_io(&shown, &e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StorageError::from_io(&shown, &e))?;
    tmp.persist(path)
        .map_err(|e| StorageError::from_io(&shown, &e.error))?;
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
