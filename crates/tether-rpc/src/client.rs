//! Single-slot RPC client over reqwest.
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};

use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::error::RpcError;
use crate::message::{next_request_id, parse_response, serialize_request};
use crate::server::RPC_PATH;

/// Something that can carry a remote call.
///
/// `params` is a JSON array of positional arguments (or `null`).
pub trait Transport: Send + Sync {
    /// Issue `method` and wait for its result.
    fn call(
        &self,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, RpcError>> + Send;
}

/// A client for one server with a single call slot.
///
/// Calls are not queued: a call issued while another is in flight fails
/// immediately with [`RpcError::ConnectionBusy`].
#[derive(Debug)]
pub struct RpcClient {
    addr: SocketAddr,
    url: String,
    http: reqwest::Client,
    slot: Mutex<()>,
}

impl RpcClient {
    /// A client for `addr`. No connection is made until the first call.
    pub fn new(addr: SocketAddr) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .tcp_nodelay(true)
            .pool_max_idle_per_host(1)
            .build()?;
        Ok(Self {
            addr,
            url: format!("http://{addr}{RPC_PATH}"),
            http,
            slot: Mutex::new(()),
        })
    }

    /// A client for `localhost:<port>`.
    pub fn localhost(port: u16) -> Result<Self, RpcError> {
        Self::new(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    /// Server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Issue `method` with positional `params` and wait for the result.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let _slot = self.slot.try_lock().map_err(|_| RpcError::ConnectionBusy)?;

        let id = next_request_id();
        trace!(id, method, "rpc call");
        let response = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(serialize_request(id, method, params))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(RpcError::InvalidResponse(format!(
                "HTTP status {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(&body)
            )));
        }
        parse_response(&body, id)
    }

    fn classify(&self, err: reqwest::Error) -> RpcError {
        if err.is_connect() {
            debug!(addr = %self.addr, "rpc connect failed: {err}");
            RpcError::ConnectionRefused(self.addr)
        } else {
            RpcError::Http(err)
        }
    }
}

impl Transport for RpcClient {
    fn call(
        &self,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, RpcError>> + Send {
        RpcClient::call(self, method, params)
    }
}
