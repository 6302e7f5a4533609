//! tether-rpc — JSON-RPC 2.0 over HTTP/1.1 on a localhost port.
//!
//! The server is an axum router and the client wraps reqwest. The client
//! has a single call slot and refuses concurrent calls with
//! [`RpcError::ConnectionBusy`] instead of queueing them; callers are
//! expected to retry transient errors (see `tether-bridge`). The server
//! dispatches each request to a [`Handler`] and can be stopped from inside
//! a handler once the in-flight response has been written.

pub mod client;
pub mod error;
pub mod message;
pub mod server;

pub use client::{RpcClient, Transport};
pub use error::RpcError;
pub use message::{Fault, Params};
pub use server::{Handler, RpcServer, ShutdownHandle, RPC_PATH};
