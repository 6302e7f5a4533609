//! tether-dap — Debug Adapter Protocol client used by the backend.
//!
//! Protocol types, Content-Length framing, capability tracking and an
//! async connection to a debug adapter process (`lldb-dap` by default).

pub mod capabilities;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod transport;

pub use capabilities::DapCapabilities;
pub use connection::{DapConnection, EventReceiver};
pub use error::DapError;
pub use protocol::*;
