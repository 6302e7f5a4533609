//! Transports for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tether_backend::simulated::{SimulatedEngine, SimulatedProgram};
use tether_backend::{BackendHandler, BackendSession};
use tether_rpc::{Handler, Params, RpcError, Transport};

/// Replays queued results per method, then falls back to a fixed value.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Result<Value, RpcError>>>>,
    fallback: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next unanswered `method` call.
    pub(crate) fn reply(&self, method: &str, result: Result<Value, RpcError>) {
        self.replies
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(result);
    }

    /// Answer `method` with `value` once its queue is empty.
    pub(crate) fn fallback(&self, method: &str, value: Value) {
        self.fallback
            .lock()
            .unwrap()
            .insert(method.to_string(), value);
    }

    /// Methods called so far, in order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }

    /// Params of every `method` call so far.
    pub(crate) fn params(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

impl Transport for ScriptedTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));
        let queued = self
            .replies
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        match queued {
            Some(result) => result,
            None => Ok(self
                .fallback
                .lock()
                .unwrap()
                .get(method)
                .cloned()
                .unwrap_or(Value::Null)),
        }
    }
}

/// Dispatches straight into an in-process backend.
pub(crate) struct LocalTransport {
    handler: BackendHandler<SimulatedEngine>,
}

impl LocalTransport {
    pub(crate) fn new(program: SimulatedProgram) -> Self {
        let session =
            BackendSession::with_exit_grace(SimulatedEngine::new(program), Duration::from_secs(60));
        Self {
            handler: BackendHandler::new(session),
        }
    }

    pub(crate) fn engine(&self) -> &SimulatedEngine {
        self.handler.session().engine()
    }
}

impl Transport for LocalTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let params = match params {
            Value::Array(values) => Params::new(values),
            _ => Params::default(),
        };
        self.handler
            .handle(method, params)
            .await
            .map_err(RpcError::from)
    }
}
