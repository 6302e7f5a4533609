//! Backend error types and their fault codes.

use tether_dap::DapError;
use tether_rpc::message::NOT_READY;
use tether_rpc::Fault;
use thiserror::Error;

/// Fault code: a command needs a running debuggee.
pub const NO_PROCESS: i32 = 1;
/// Fault code: a command needs a debug target.
pub const NO_TARGET: i32 = 2;
/// Fault code: the debug target could not be created.
pub const TARGET_CREATION: i32 = 3;
/// Fault code: the debuggee failed to launch.
pub const LAUNCH: i32 = 4;
/// Fault code: the debugger reported an error.
pub const ENGINE: i32 = 5;

/// Errors raised by the debug backend session.
#[derive(Debug, Error)]
pub enum BackendError {
    /// No debuggee is running.
    #[error("no process to {0}")]
    NoProcess(&'static str),

    /// No debug target has been created.
    #[error("no target")]
    NoTarget,

    /// The debugger could not create a target for the executable.
    #[error("could not create target: {0}")]
    TargetCreation(String),

    /// The debuggee failed to launch.
    #[error("could not launch target: {0}")]
    Launch(String),

    /// Another command is still running.
    #[error("session busy")]
    Busy,

    /// The debugger cannot do this.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// The debug adapter reported an error.
    #[error("debugger error: {0}")]
    Dap(#[from] DapError),

    /// Any other engine failure.
    #[error("{0}")]
    Engine(String),
}

impl BackendError {
    /// Fault code sent to the client.
    pub fn code(&self) -> i32 {
        match self {
            Self::NoProcess(_) => NO_PROCESS,
            Self::NoTarget => NO_TARGET,
            Self::TargetCreation(_) => TARGET_CREATION,
            Self::Launch(_) => LAUNCH,
            Self::Busy => NOT_READY,
            Self::Unsupported(_) | Self::Dap(_) | Self::Engine(_) => ENGINE,
        }
    }
}

impl From<BackendError> for Fault {
    fn from(err: BackendError) -> Self {
        Fault::new(err.code(), err.to_string())
    }
}
