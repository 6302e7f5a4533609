//! Session keys and launch parameters.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Opaque, stable identifier of one editor workspace's debug session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Wrap an editor-provided identifier.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Everything `prepare` needs to create a target and launch the debuggee.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LaunchRequest {
    /// Path of the executable to debug.
    pub executable: PathBuf,
    /// Command-line arguments for the debuggee.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment for the debuggee; `None` inherits the backend's.
    #[serde(default)]
    pub env: Option<BTreeMap<String, String>>,
    /// Extra directory searched for modules and symbols.
    #[serde(default)]
    pub module_search_path: Option<PathBuf>,
    /// Working directory of the debuggee.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl LaunchRequest {
    /// A request for `executable` with no arguments and an inherited environment.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            ..Self::default()
        }
    }
}
