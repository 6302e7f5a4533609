//! tether-core — shared domain and wire types for the tether debug bridge.
//!
//! Everything that crosses the RPC boundary between the editor-side bridge
//! and the debug backend lives here: execution status, breakpoints in their
//! persisted and live forms, thread/frame snapshots, and the decimal-string
//! codec used for 64-bit addresses.

pub mod backtrace;
pub mod breakpoint;
pub mod error;
pub mod logging;
pub mod session;
pub mod status;
pub mod wire;

pub use backtrace::{BareFrame, CommandOutput, Frame, SymbolicatedFrame, ThreadBacktrace, ThreadId, ThreadInfo, VariableMap};
pub use breakpoint::{Breakpoint, BreakpointId, LiveBreakpoint};
pub use error::CoreError;
pub use session::{LaunchRequest, SessionKey};
pub use status::{Status, StopReason};
