use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tkl_store::{StoreError, StoreResult};

/// Flush/sync strategy for the journal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every committed batch.
    EveryWrite,
    /// Flush to the OS and rely on page-cache write-back.
    #[default]
    OsDefault,
}

/// Configuration of a journaled transaction store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Journal file. Parent directories are created on open.
    pub path: PathBuf,
    pub sync_mode: SyncMode,
    /// Rewrite the journal as a single batch after replaying it.
    pub compact_on_open: bool,
}

impl JournalConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        toml::from_str(s).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tkl.journal"),
            sync_mode: SyncMode::default(),
            compact_on_open: false,
        }
    }
}
