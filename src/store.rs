//! Signal store
//!
//! A durable mapping from signal id to signal, behind a small repository
//! trait so the engine never touches file mechanics. The run loads the
//! whole map once, mutates it in memory, then writes it back; the JSON
//! implementation replaces the file atomically so an interrupted save never
//! leaves a half-written store behind.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::types::Signal;

pub trait SignalStore {
    /// Load all signals. An absent or empty store yields an empty map; a
    /// corrupt one is recovered to an empty map rather than failing the run.
    fn load(&self) -> Result<HashMap<String, Signal>>;

    /// Persist the full map, replacing whatever was stored before.
    fn save(&self, signals: &HashMap<String, Signal>) -> Result<()>;
}

/// JSON-file backed store
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        JsonFileStore {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SignalStore for JsonFileStore {
    fn load(&self) -> Result<HashMap<String, Signal>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no signal store yet, starting empty");
            return Ok(HashMap::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read signal store {}", self.path.display()))?;

        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }

        match serde_json::from_str(&contents) {
            Ok(signals) => Ok(signals),
            Err(e) => {
                // Accepted data loss: a corrupt store resets rather than
                // wedging every subsequent run
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "signal store is corrupt, recovering to empty"
                );
                Ok(HashMap::new())
            }
        }
    }

    fn save(&self, signals: &HashMap<String, Signal>) -> Result<()> {
        let json =
            serde_json::to_string_pretty(signals).context("Failed to serialize signal store")?;

        // Write-then-rename so readers never observe a partial file
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(
            path = %self.path.display(),
            signals = signals.len(),
            "signal store saved"
        );
        Ok(())
    }
}

/// In-memory store for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    signals: Mutex<HashMap<String, Signal>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalStore for MemoryStore {
    fn load(&self) -> Result<HashMap<String, Signal>> {
        Ok(self.signals.lock().expect("store lock poisoned").clone())
    }

    fn save(&self, signals: &HashMap<String, Signal>) -> Result<()> {
        *self.signals.lock().expect("store lock poisoned") = signals.clone();
        Ok(())
    }
}
