//! tether-backend — the debug backend served over JSON-RPC.
//!
//! A [`BackendSession`] owns one debuggee through a [`DebugEngine`] and
//! keeps its status, output and breakpoint table. [`BackendHandler`]
//! exposes the session as RPC methods. [`DapEngine`] drives `lldb-dap`.

pub mod breakpoints;
pub mod dap_engine;
pub mod engine;
pub mod error;
pub mod handler;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod simulated;

pub use breakpoints::BreakpointTable;
pub use dap_engine::{DapEngine, DEFAULT_ADAPTER};
pub use engine::{
    DebugEngine, EngineEvents, OutputChunk, OutputStream, StateChange, StepKind, VariableScope,
};
pub use error::BackendError;
pub use handler::{BackendHandler, METHODS};
pub use session::{BackendSession, DEFAULT_EXIT_GRACE};
