//! Persisted sign-in state
//!
//! Stores the last token pair and, when the user opted in, the credentials
//! used for silent login at the next start. Stored as plain TOML.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use chatlink_core::prelude::*;
use chatlink_core::{AuthTokens, Credentials};

/// File name under the config directory.
pub const SESSION_FILENAME: &str = "session.toml";

/// What survives a restart.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoredSession {
    pub tokens: AuthTokens,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

/// Storage backend for [`StoredSession`].
pub trait TokenStore: Send + Sync {
    /// Returns `None` when nothing is stored or the stored data is unreadable.
    fn load(&self) -> Option<StoredSession>;

    fn save(&self, session: &StoredSession) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

// ─────────────────────────────────────────────────────────
// MemoryTokenStore
// ─────────────────────────────────────────────────────────

/// Process-local store; clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    inner: Arc<Mutex<Option<StoredSession>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<StoredSession> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// FileTokenStore
// ─────────────────────────────────────────────────────────

/// TOML file store, written atomically (temp file + rename).
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<dir>/session.toml`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(SESSION_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<StoredSession> {
        if !self.path.exists() {
            debug!("No stored session at {:?}", self.path);
            return None;
        }

        match std::fs::read_to_string(&self.path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!("Failed to parse {:?}: {}", self.path, e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read {:?}: {}", self.path, e);
                None
            }
        }
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::config(format!("Failed to create {:?}: {}", parent, e)))?;
        }

        let content = toml::to_string_pretty(session)
            .map_err(|e| Error::config(format!("Failed to serialize session: {}", e)))?;

        let temp_path = self.path.with_extension("toml.tmp");
        std::fs::write(&temp_path, content)
            .map_err(|e| Error::config(format!("Failed to write temp file: {}", e)))?;
        std::fs::rename(&temp_path, &self.path)
            .map_err(|e| Error::config(format!("Failed to rename temp file: {}", e)))?;

        debug!("Saved session to {:?}", self.path);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
