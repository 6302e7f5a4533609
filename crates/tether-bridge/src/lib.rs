//! tether-bridge — the editor side of a debug session.
//!
//! Everything here talks to a backend through a [`BackendProxy`], which
//! retries the transport's transient errors until the call goes through.
//! A [`SessionRegistry`] owns per-session state; pollers, the breakpoint
//! synchronizer and the session actions all work through it.

pub mod actions;
pub mod error;
pub mod launcher;
pub mod poller;
pub mod proxy;
pub mod registry;
pub mod retry;
pub mod store;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use actions::{perform, stop_debugger, SessionAction};
pub use error::BridgeError;
pub use launcher::Launcher;
pub use poller::{spawn_poller, Poller, DEFAULT_POLL_INTERVAL};
pub use proxy::BackendProxy;
pub use registry::{Detached, OutputCallback, SessionRegistry, StatusCallback};
pub use retry::{RetryPolicy, DEFAULT_RETRY_INTERVAL};
pub use store::{BreakpointStore, MemoryBreakpointStore, TomlBreakpointStore, BREAKPOINTS_FILE};
pub use sync::{load_into_backend, read_from_backend, BreakpointSync, Toggled};
