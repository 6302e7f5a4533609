//! Typed client for the backend's RPC surface.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tether_core::{
    Breakpoint, BreakpointId, CommandOutput, LaunchRequest, LiveBreakpoint, Status,
    ThreadBacktrace, ThreadId, ThreadInfo, VariableMap,
};
use tether_rpc::{RpcClient, RpcError, Transport};

use crate::retry::RetryPolicy;

/// One backend, reached through `T`. Every call runs under the retry
/// policy, so transient transport errors never reach the caller.
pub struct BackendProxy<T = RpcClient> {
    transport: T,
    retry: RetryPolicy,
}

impl BackendProxy<RpcClient> {
    /// A proxy for a backend listening on `localhost:<port>`.
    pub fn localhost(port: u16, retry: RetryPolicy) -> Result<Self, RpcError> {
        Ok(Self::new(RpcClient::localhost(port)?, retry))
    }
}

impl<T: Transport> BackendProxy<T> {
    pub fn new(transport: T, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, RpcError> {
        let transport = &self.transport;
        let params = &params;
        let value = self
            .retry
            .run(move || transport.call(method, params.clone()))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn command(&self, method: &str, params: Value) -> Result<(), RpcError> {
        self.call::<Value>(method, params).await.map(drop)
    }

    // ---- lifecycle ----

    /// Create or reuse the target and launch the debuggee stopped at entry.
    pub async fn prepare(&self, request: &LaunchRequest) -> Result<(), RpcError> {
        let params = json!([
            request.executable,
            request.args,
            request.env,
            request.module_search_path,
            request.working_dir,
        ]);
        self.command("prepare", params).await
    }

    pub async fn start(&self) -> Result<(), RpcError> {
        self.command("start", Value::Null).await
    }

    pub async fn pause(&self) -> Result<(), RpcError> {
        self.command("pause", Value::Null).await
    }

    pub async fn step_into(&self) -> Result<(), RpcError> {
        self.command("step_into", Value::Null).await
    }

    pub async fn step_over(&self) -> Result<(), RpcError> {
        self.command("step_over", Value::Null).await
    }

    pub async fn step_out(&self) -> Result<(), RpcError> {
        self.command("step_out", Value::Null).await
    }

    /// Kill the debuggee.
    pub async fn stop(&self) -> Result<(), RpcError> {
        self.command("stop", Value::Null).await
    }

    /// Stop the debuggee and the backend process.
    pub async fn shutdown_server(&self) -> Result<(), RpcError> {
        self.command("shutdown_server", Value::Null).await
    }

    // ---- status and streams ----

    pub async fn status(&self) -> Result<Status, RpcError> {
        self.call("get_status", Value::Null).await
    }

    /// Drain buffered debuggee stdout.
    pub async fn stdout(&self) -> Result<String, RpcError> {
        self.call("get_stdout", Value::Null).await
    }

    /// Drain buffered debuggee stderr.
    pub async fn stderr(&self) -> Result<String, RpcError> {
        self.call("get_stderr", Value::Null).await
    }

    pub async fn push_stdin(&self, data: &str) -> Result<(), RpcError> {
        self.command("push_stdin", json!([data])).await
    }

    // ---- inspection ----

    pub async fn threads(&self) -> Result<Vec<ThreadInfo>, RpcError> {
        self.call("get_threads", Value::Null).await
    }

    /// Select a thread; `false` if no thread has that id.
    pub async fn select_thread(&self, id: ThreadId) -> Result<bool, RpcError> {
        self.call("select_thread", json!([id])).await
    }

    pub async fn selected_thread(&self) -> Result<ThreadInfo, RpcError> {
        self.call("selected_thread", Value::Null).await
    }

    /// Backtraces of every thread, selected thread first.
    pub async fn backtrace(&self) -> Result<Vec<ThreadBacktrace>, RpcError> {
        self.call("get_backtrace", Value::Null).await
    }

    pub async fn selected_backtrace(&self) -> Result<ThreadBacktrace, RpcError> {
        self.call("get_backtrace_for_selected_thread", Value::Null)
            .await
    }

    pub async fn arguments(&self, thread: ThreadId, frame: u32) -> Result<VariableMap, RpcError> {
        self.call("get_arguments", json!([thread, frame])).await
    }

    pub async fn local_variables(
        &self,
        thread: ThreadId,
        frame: u32,
    ) -> Result<VariableMap, RpcError> {
        self.call("get_local_variables", json!([thread, frame]))
            .await
    }

    pub async fn all_variables(
        &self,
        thread: ThreadId,
        frame: u32,
    ) -> Result<VariableMap, RpcError> {
        self.call("get_all_variables", json!([thread, frame])).await
    }

    /// Run a raw debugger console command.
    pub async fn execute(&self, command: &str) -> Result<CommandOutput, RpcError> {
        self.call("execute_lldb_command", json!([command])).await
    }

    // ---- breakpoints ----

    pub async fn breakpoints(&self) -> Result<Vec<LiveBreakpoint>, RpcError> {
        self.call("get_breakpoints", Value::Null).await
    }

    /// Create a live breakpoint. The enabled flag is not sent; new
    /// breakpoints start enabled.
    pub async fn set_breakpoint(&self, spec: &Breakpoint) -> Result<BreakpointId, RpcError> {
        let params = json!([spec.file, spec.line, spec.condition, spec.ignore_count]);
        self.call("set_breakpoint", params).await
    }

    pub async fn delete_breakpoint(&self, id: BreakpointId) -> Result<(), RpcError> {
        self.command("delete_breakpoint", json!([id])).await
    }

    pub async fn enable_breakpoint(&self, id: BreakpointId) -> Result<(), RpcError> {
        self.command("enable_breakpoint", json!([id])).await
    }

    pub async fn disable_breakpoint(&self, id: BreakpointId) -> Result<(), RpcError> {
        self.command("disable_breakpoint", json!([id])).await
    }

    pub async fn enable_all_breakpoints(&self) -> Result<(), RpcError> {
        self.command("enable_all_breakpoints", Value::Null).await
    }

    pub async fn disable_all_breakpoints(&self) -> Result<(), RpcError> {
        self.command("disable_all_breakpoints", Value::Null).await
    }

    pub async fn delete_all_breakpoints(&self) -> Result<(), RpcError> {
        self.command("delete_all_breakpoints", Value::Null).await
    }

    /// Disable everything, remembering the current pattern. A second call
    /// before [`enable_breakpoints`](Self::enable_breakpoints) does nothing.
    pub async fn disable_breakpoints(&self) -> Result<(), RpcError> {
        self.command("disable_breakpoints", Value::Null).await
    }

    /// Restore the pattern saved by [`disable_breakpoints`](Self::disable_breakpoints).
    pub async fn enable_breakpoints(&self) -> Result<(), RpcError> {
        self.command("enable_breakpoints", Value::Null).await
    }
}
