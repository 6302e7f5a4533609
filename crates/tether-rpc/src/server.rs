//! RPC server: an axum router with one `POST` route, plus shutdown.
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde_json::Value;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::error::RpcError;
use crate::message::{parse_request, serialize_error_response, serialize_response, Fault, Params};

/// Path requests are posted to.
pub const RPC_PATH: &str = "/RPC2";

/// Serves method calls.
pub trait Handler: Send + Sync + 'static {
    /// Run `method` with positional `params`.
    fn handle(
        &self,
        method: &str,
        params: Params,
    ) -> impl Future<Output = Result<Value, Fault>> + Send;
}

/// Stops a running [`RpcServer`].
///
/// Connections finish writing the response they are working on before
/// they close, so a handler may trigger shutdown and still answer.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    /// Ask the server to stop accepting and close its connections.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }
}

/// A bound JSON-RPC server.
pub struct RpcServer {
    listener: TcpListener,
    shutdown: ShutdownHandle,
}

impl RpcServer {
    /// Bind to `addr`.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, RpcError> {
        let listener = TcpListener::bind(addr).await?;
        let (tx, _rx) = watch::channel(false);
        Ok(Self {
            listener,
            shutdown: ShutdownHandle(Arc::new(tx)),
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, RpcError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle for stopping the server.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serve until shut down. Returns once every connection has closed.
    pub async fn serve<H: Handler>(self, handler: Arc<H>) -> Result<(), RpcError> {
        let Self { listener, shutdown } = self;
        let mut stop = shutdown.0.subscribe();
        let app = Router::new()
            .route(RPC_PATH, post(dispatch::<H>))
            .with_state(handler);

        info!(addr = ?listener.local_addr().ok(), "rpc server listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.wait_for(|stopped| *stopped).await;
            })
            .await?;
        info!("rpc server stopped");
        Ok(())
    }
}

/// Malformed JSON is answered with a JSON-RPC parse error, not an HTTP rejection.
async fn dispatch<H: Handler>(State(handler): State<Arc<H>>, body: Bytes) -> Response {
    let reply = match parse_request(&body) {
        Ok(request) => {
            trace!(method = %request.method, "rpc request");
            match handler.handle(&request.method, request.params).await {
                Ok(result) => serialize_response(&request.id, result),
                Err(fault) => {
                    debug!(method = %request.method, code = fault.code, "fault: {}", fault.message);
                    serialize_error_response(&request.id, &fault)
                }
            }
        }
        Err(fault) => serialize_error_response(&Value::Null, &fault),
    };
    ([(header::CONTENT_TYPE, "application/json")], reply).into_response()
}
