//! Spawning of backend processes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::PlatformError;

/// A command line for a detached helper process.
///
/// The child gets no standard streams and is killed if its [`Child`]
/// handle is dropped without being reaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCommand {
    program: PathBuf,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
}

impl BackendCommand {
    /// A command running `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// A command re-running the current executable.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Path` if the running executable's path is
    /// unavailable.
    pub fn current_exe() -> Result<Self, PlatformError> {
        let exe = std::env::current_exe()
            .map_err(|e| PlatformError::Path(format!("current executable: {e}")))?;
        Ok(Self::new(exe))
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Program path.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments in order.
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Start the process.
    pub fn spawn(&self) -> Result<Child, PlatformError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        let child = command.spawn()?;
        debug!(program = %self.program.display(), pid = ?child.id(), "spawned backend process");
        Ok(child)
    }
}
