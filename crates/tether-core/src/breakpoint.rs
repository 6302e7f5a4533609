//! Breakpoints in their persisted and live forms.
//!
//! A persisted [`Breakpoint`] is identified by `(file, line)` and never
//! carries a backend id. A [`LiveBreakpoint`] adds the id the backend
//! assigned, valid only for the lifetime of one backend connection.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A breakpoint as stored in project configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    /// Absolute source file path.
    pub file: PathBuf,
    /// Zero-based line number (editor row).
    pub line: u32,
    /// Whether the debugger should stop here.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Optional condition expression evaluated by the debugger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Number of hits to skip before stopping.
    #[serde(default)]
    pub ignore_count: u32,
}

fn default_enabled() -> bool {
    true
}

impl Breakpoint {
    /// An enabled, unconditional breakpoint at `file:line`.
    pub fn new(file: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
            enabled: true,
            condition: None,
            ignore_count: 0,
        }
    }

    /// Attach a condition expression.
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Skip the first `count` hits.
    pub fn with_ignore_count(mut self, count: u32) -> Self {
        self.ignore_count = count;
        self
    }

    /// Set the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether this breakpoint sits at `file:line`.
    pub fn is_at(&self, file: &Path, line: u32) -> bool {
        self.line == line && self.file == file
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)?;
        if !self.enabled {
            f.write_str(" (disabled)")?;
        }
        Ok(())
    }
}

/// Backend-assigned breakpoint id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BreakpointId(pub u32);

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A breakpoint known to the running backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveBreakpoint {
    /// Id assigned by the backend.
    pub id: BreakpointId,
    /// Location and settings.
    #[serde(flatten)]
    pub spec: Breakpoint,
}

impl LiveBreakpoint {
    /// Drop the backend id, producing the form that may be persisted.
    pub fn into_persisted(self) -> Breakpoint {
        self.spec
    }

    /// Whether this live breakpoint corresponds to `file:line`.
    pub fn is_at(&self, file: &Path, line: u32) -> bool {
        self.spec.is_at(file, line)
    }
}
