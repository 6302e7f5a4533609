//! Persisted breakpoints.
//!
//! The persisted form is [`Breakpoint`], which has no id field, so a
//! backend id can never reach disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tether_core::{Breakpoint, SessionKey};
use tether_platform::paths::project_dir;
use tracing::debug;

use crate::error::BridgeError;

/// File name of the breakpoint list inside `<project>/.tether`.
pub const BREAKPOINTS_FILE: &str = "breakpoints.toml";

/// Where a session's persisted breakpoints live.
pub trait BreakpointStore: Send + Sync {
    /// The persisted list for `session`, empty if nothing was saved.
    fn load(&self, session: &SessionKey) -> Result<Vec<Breakpoint>, BridgeError>;

    /// Replace the persisted list for `session`.
    fn save(&self, session: &SessionKey, breakpoints: &[Breakpoint]) -> Result<(), BridgeError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BreakpointFile {
    #[serde(default)]
    breakpoints: Vec<Breakpoint>,
}

/// One project's breakpoints in `<project>/.tether/breakpoints.toml`.
///
/// A project has a single list; the session key only shows up in logs.
#[derive(Debug, Clone)]
pub struct TomlBreakpointStore {
    path: PathBuf,
}

impl TomlBreakpointStore {
    /// The store of the project rooted at `project`.
    pub fn for_project(project: &Path) -> Self {
        Self::at(project_dir(project).join(BREAKPOINTS_FILE))
    }

    /// A store backed by an explicit file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn store_error(&self, message: impl ToString) -> BridgeError {
        BridgeError::Store {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }
}

impl BreakpointStore for TomlBreakpointStore {
    fn load(&self, session: &SessionKey) -> Result<Vec<Breakpoint>, BridgeError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let file: BreakpointFile = toml::from_str(&content).map_err(|e| self.store_error(e))?;
        debug!(%session, count = file.breakpoints.len(), "loaded breakpoints");
        Ok(file.breakpoints)
    }

    fn save(&self, session: &SessionKey, breakpoints: &[Breakpoint]) -> Result<(), BridgeError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = BreakpointFile {
            breakpoints: breakpoints.to_vec(),
        };
        let content = toml::to_string_pretty(&file).map_err(|e| self.store_error(e))?;
        // Write then rename so a crash never leaves a truncated list.
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(%session, count = breakpoints.len(), "saved breakpoints");
        Ok(())
    }
}

/// Breakpoint lists held in memory, per session.
#[derive(Debug, Default)]
pub struct MemoryBreakpointStore {
    lists: Mutex<HashMap<SessionKey, Vec<Breakpoint>>>,
}

impl MemoryBreakpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BreakpointStore for MemoryBreakpointStore {
    fn load(&self, session: &SessionKey) -> Result<Vec<Breakpoint>, BridgeError> {
        let lists = self.lists.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(lists.get(session).cloned().unwrap_or_default())
    }

    fn save(&self, session: &SessionKey, breakpoints: &[Breakpoint]) -> Result<(), BridgeError> {
        self.lists
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.clone(), breakpoints.to_vec());
        Ok(())
    }
}
