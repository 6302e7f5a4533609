//! The seam between the session state machine and a native debugger.

use std::future::Future;
use std::path::Path;

use tether_core::{
    Breakpoint, CommandOutput, Frame, LaunchRequest, Status, ThreadId, ThreadInfo, VariableMap,
};
use tokio::sync::mpsc;

use crate::error::BackendError;

/// Which way to step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Step into calls.
    Into,
    /// Step over calls.
    Over,
    /// Run to the caller.
    Out,
}

/// Which variables of a frame to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableScope {
    /// Function arguments.
    Arguments,
    /// Locals and function statics.
    Locals,
    /// Everything visible in the frame.
    All,
}

/// Debuggee output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// A debuggee state transition observed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    /// New status.
    pub status: Status,
    /// Thread that caused a stop, if the debugger said.
    pub thread: Option<ThreadId>,
}

impl StateChange {
    /// A transition with no associated thread.
    pub fn new(status: Status) -> Self {
        Self {
            status,
            thread: None,
        }
    }
}

/// A chunk of debuggee output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    /// Stream the text was written to.
    pub stream: OutputStream,
    /// The text.
    pub text: String,
}

/// Asynchronous feeds from a launched debuggee.
///
/// Both channels close when the debuggee or the debugger goes away.
#[derive(Debug)]
pub struct EngineEvents {
    /// State transitions.
    pub state: mpsc::UnboundedReceiver<StateChange>,
    /// Output chunks.
    pub output: mpsc::UnboundedReceiver<OutputChunk>,
}

/// A native debugger controlling at most one debuggee.
///
/// Calls are serialized by the session; implementations need not guard
/// against concurrent commands.
pub trait DebugEngine: Send + Sync + 'static {
    /// Create the target for `request.executable` and launch it stopped
    /// at its entry point.
    fn launch(
        &self,
        request: &LaunchRequest,
    ) -> impl Future<Output = Result<EngineEvents, BackendError>> + Send;

    /// Continue all threads.
    fn resume(&self) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Interrupt the debuggee.
    fn pause(
        &self,
        thread: Option<ThreadId>,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Step `thread`.
    fn step(
        &self,
        thread: ThreadId,
        kind: StepKind,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Kill the debuggee.
    fn kill(&self) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Write to the debuggee's standard input.
    fn write_stdin(&self, data: &str) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Replace every breakpoint in `file` with `breakpoints`.
    ///
    /// Lines are zero-based; only enabled breakpoints are passed.
    fn set_file_breakpoints(
        &self,
        file: &Path,
        breakpoints: &[Breakpoint],
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Threads of the debuggee. `selected` is left false.
    fn threads(&self) -> impl Future<Output = Result<Vec<ThreadInfo>, BackendError>> + Send;

    /// Frames of `thread`, innermost first.
    fn backtrace(
        &self,
        thread: ThreadId,
    ) -> impl Future<Output = Result<Vec<Frame>, BackendError>> + Send;

    /// Variables of frame `frame` in `thread`.
    fn variables(
        &self,
        thread: ThreadId,
        frame: u32,
        scope: VariableScope,
    ) -> impl Future<Output = Result<VariableMap, BackendError>> + Send;

    /// Run a debugger console command.
    fn execute(
        &self,
        command: &str,
    ) -> impl Future<Output = Result<CommandOutput, BackendError>> + Send;

    /// Tear down the debugger instance.
    fn terminate(&self) -> impl Future<Output = ()> + Send;
}
