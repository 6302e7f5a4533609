//! RPC method dispatch onto a [`BackendSession`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use tether_core::{Breakpoint, BreakpointId, LaunchRequest, ThreadId};
use tether_rpc::{Fault, Handler, Params};
use tracing::debug;

use crate::engine::{DebugEngine, StepKind, VariableScope};
use crate::session::BackendSession;

/// Every method the backend serves.
pub const METHODS: &[&str] = &[
    "prepare",
    "start",
    "pause",
    "step_into",
    "step_over",
    "step_out",
    "stop",
    "shutdown_server",
    "get_status",
    "get_stdout",
    "get_stderr",
    "push_stdin",
    "get_threads",
    "select_thread",
    "selected_thread",
    "get_backtrace",
    "get_backtrace_for_selected_thread",
    "get_arguments",
    "get_local_variables",
    "get_all_variables",
    "execute_lldb_command",
    "get_breakpoints",
    "set_breakpoint",
    "delete_breakpoint",
    "enable_breakpoint",
    "disable_breakpoint",
    "enable_all_breakpoints",
    "disable_all_breakpoints",
    "delete_all_breakpoints",
    "disable_breakpoints",
    "enable_breakpoints",
];

fn encode<T: Serialize>(value: T) -> Result<Value, Fault> {
    serde_json::to_value(value).map_err(|e| Fault::internal(e.to_string()))
}

fn unit<E: Into<Fault>>(result: Result<(), E>) -> Result<Value, Fault> {
    result.map(|()| Value::Null).map_err(Into::into)
}

/// Serves the backend's RPC surface.
pub struct BackendHandler<E> {
    session: BackendSession<E>,
}

impl<E: DebugEngine> BackendHandler<E> {
    /// Dispatch onto `session`.
    pub fn new(session: BackendSession<E>) -> Self {
        Self { session }
    }

    /// The session behind this handler.
    pub fn session(&self) -> &BackendSession<E> {
        &self.session
    }

    async fn variables(&self, params: &Params, scope: VariableScope) -> Result<Value, Fault> {
        let thread: ThreadId = params.get(0, "thread_id")?;
        let frame: u32 = params.get(1, "frame_index")?;
        encode(self.session.variables(thread, frame, scope).await?)
    }

    async fn dispatch(&self, method: &str, params: Params) -> Result<Value, Fault> {
        let session = &self.session;
        match method {
            "prepare" => {
                let executable: PathBuf = params.get(0, "executable")?;
                let args: Option<Vec<String>> = params.opt(1, "params")?;
                let env: Option<BTreeMap<String, String>> = params.opt(2, "environment")?;
                let request = LaunchRequest {
                    executable,
                    args: args.unwrap_or_default(),
                    env,
                    module_search_path: params.opt(3, "path")?,
                    working_dir: params.opt(4, "work_dir")?,
                };
                unit(session.prepare(request).await)
            }
            "start" => unit(session.start().await),
            "pause" => unit(session.pause().await),
            "step_into" => unit(session.step(StepKind::Into).await),
            "step_over" => unit(session.step(StepKind::Over).await),
            "step_out" => unit(session.step(StepKind::Out).await),
            "stop" => unit(session.stop().await),
            "shutdown_server" => {
                session.shutdown().await;
                Ok(Value::Null)
            }

            "get_status" => encode(session.status()),
            "get_stdout" => encode(session.take_stdout()),
            "get_stderr" => encode(session.take_stderr()),
            "push_stdin" => {
                let data: String = params.get(0, "data")?;
                unit(session.push_stdin(&data).await)
            }

            "get_threads" => encode(session.threads().await?),
            "select_thread" => {
                let id: ThreadId = params.get(0, "id")?;
                encode(session.select_thread(id).await?)
            }
            "selected_thread" => encode(session.selected_thread().await?),
            "get_backtrace" => encode(session.backtraces().await?),
            "get_backtrace_for_selected_thread" => encode(session.selected_backtrace().await?),
            "get_arguments" => self.variables(&params, VariableScope::Arguments).await,
            "get_local_variables" => self.variables(&params, VariableScope::Locals).await,
            "get_all_variables" => self.variables(&params, VariableScope::All).await,
            "execute_lldb_command" => {
                let command: String = params.get(0, "command")?;
                encode(session.execute(&command).await?)
            }

            "get_breakpoints" => encode(session.breakpoints().await?),
            "set_breakpoint" => {
                let file: PathBuf = params.get(0, "filename")?;
                let line: u32 = params.get(1, "line_number")?;
                let mut spec = Breakpoint::new(file, line);
                spec.condition = params.opt(2, "condition")?;
                spec.ignore_count = params.opt(3, "ignore_count")?.unwrap_or(0);
                encode(session.set_breakpoint(spec).await?)
            }
            "delete_breakpoint" => {
                let id: BreakpointId = params.get(0, "id")?;
                unit(session.delete_breakpoint(id).await)
            }
            "enable_breakpoint" => {
                let id: BreakpointId = params.get(0, "id")?;
                unit(session.set_breakpoint_enabled(id, true).await)
            }
            "disable_breakpoint" => {
                let id: BreakpointId = params.get(0, "id")?;
                unit(session.set_breakpoint_enabled(id, false).await)
            }
            "enable_all_breakpoints" => unit(session.set_all_breakpoints_enabled(true).await),
            "disable_all_breakpoints" => unit(session.set_all_breakpoints_enabled(false).await),
            "delete_all_breakpoints" => unit(session.delete_all_breakpoints().await),
            "disable_breakpoints" => unit(session.disable_breakpoints().await),
            "enable_breakpoints" => unit(session.enable_breakpoints().await),

            other => Err(Fault::method_not_found(other)),
        }
    }
}

impl<E: DebugEngine> Handler for BackendHandler<E> {
    async fn handle(&self, method: &str, params: Params) -> Result<Value, Fault> {
        let result = self.dispatch(method, params).await;
        if let Err(fault) = &result {
            debug!(method, code = fault.code, "fault: {}", fault.message);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tether_core::{Status, StopReason, ThreadBacktrace};
    use tether_rpc::message::{INVALID_PARAMS, METHOD_NOT_FOUND};

    use super::*;
    use crate::error::{NO_PROCESS, NO_TARGET};
    use crate::simulated::{SimulatedEngine, SimulatedProgram, MAIN_THREAD};

    fn handler(program: SimulatedProgram) -> BackendHandler<SimulatedEngine> {
        let session =
            BackendSession::with_exit_grace(SimulatedEngine::new(program), Duration::from_secs(60));
        BackendHandler::new(session)
    }

    async fn call(h: &BackendHandler<SimulatedEngine>, method: &str, params: Value) -> Result<Value, Fault> {
        let params = match params {
            Value::Array(values) => Params::new(values),
            _ => Params::default(),
        };
        h.handle(method, params).await
    }

    async fn wait_for_status(h: &BackendHandler<SimulatedEngine>, want: &str) {
        for _ in 0..200 {
            let status = call(h, "get_status", json!([])).await.unwrap();
            if status == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("status never became {want}");
    }

    #[tokio::test]
    async fn commands_without_process_fail_with_no_process() {
        let h = handler(SimulatedProgram::new("/src/main.c", 3));
        for method in ["start", "pause", "step_over", "get_threads", "get_backtrace"] {
            let fault = call(&h, method, json!([])).await.unwrap_err();
            assert_eq!(fault.code, NO_PROCESS, "{method}");
        }
        let fault = call(&h, "push_stdin", json!(["x"])).await.unwrap_err();
        assert_eq!(fault.code, NO_PROCESS);
        // Killing nothing is fine.
        assert_eq!(call(&h, "stop", json!([])).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn breakpoint_methods_need_a_target() {
        let h = handler(SimulatedProgram::new("/src/main.c", 3));
        let fault = call(&h, "set_breakpoint", json!(["/src/main.c", 1, null, 0]))
            .await
            .unwrap_err();
        assert_eq!(fault.code, NO_TARGET);
        let fault = call(&h, "get_breakpoints", json!([])).await.unwrap_err();
        assert_eq!(fault.code, NO_TARGET);
    }

    #[tokio::test]
    async fn prepare_reaches_entry_stop() {
        let h = handler(SimulatedProgram::new("/src/main.c", 3));
        call(&h, "prepare", json!(["/bin/demo", [], null, null, "/tmp"]))
            .await
            .unwrap();
        wait_for_status(&h, "stopped,signal").await;

        let launches = h.session().engine().launches();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].working_dir, Some(PathBuf::from("/tmp")));
        assert!(launches[0].args.is_empty());
    }

    #[tokio::test]
    async fn set_breakpoint_returns_id_and_lists_it() {
        let h = handler(SimulatedProgram::new("/src/main.c", 3));
        call(&h, "prepare", json!(["/bin/demo"])).await.unwrap();
        let id = call(&h, "set_breakpoint", json!(["/src/main.c", 2, "i > 1", 3]))
            .await
            .unwrap();
        assert_eq!(id, json!(1));

        let list = call(&h, "get_breakpoints", json!([])).await.unwrap();
        assert_eq!(
            list,
            json!([{
                "id": 1, "file": "/src/main.c", "line": 2, "enabled": true,
                "condition": "i > 1", "ignore_count": 3
            }])
        );

        call(&h, "disable_breakpoint", json!([1])).await.unwrap();
        assert!(h
            .session()
            .engine()
            .installed_breakpoints(std::path::Path::new("/src/main.c"))
            .is_empty());
    }

    #[tokio::test]
    async fn backtrace_carries_addresses_as_strings() {
        let h = handler(SimulatedProgram::new("/src/main.c", 5));
        call(&h, "prepare", json!(["/bin/demo"])).await.unwrap();
        call(&h, "step_over", json!([])).await.unwrap();
        wait_for_status(&h, "stopped,plan_complete").await;

        let value = call(&h, "get_backtrace_for_selected_thread", json!([]))
            .await
            .unwrap();
        assert_eq!(value["id"], MAIN_THREAD.0.to_string());
        assert!(value["bt"][0]["address"].is_string());
        let bt: ThreadBacktrace = serde_json::from_value(value).unwrap();
        assert_eq!(bt.thread.id, MAIN_THREAD);
        assert_eq!(bt.thread.stop_reason, StopReason::PlanComplete);
        assert_eq!(bt.frames[0].location().map(|(_, line)| line), Some(1));
        assert_eq!(bt.frames[1].address(), u64::MAX - 0x0fff);
    }

    #[tokio::test]
    async fn variables_take_thread_id_as_string() {
        let h = handler(SimulatedProgram::new("/src/main.c", 5));
        call(&h, "prepare", json!(["/bin/demo"])).await.unwrap();
        call(&h, "step_into", json!([])).await.unwrap();
        wait_for_status(&h, "stopped,plan_complete").await;

        let thread = MAIN_THREAD.0.to_string();
        let args = call(&h, "get_arguments", json!([thread, 0])).await.unwrap();
        assert_eq!(args, json!({"argc": "1"}));
        let all = call(&h, "get_all_variables", json!([thread, 0])).await.unwrap();
        assert_eq!(all, json!({"argc": "1", "line": "1"}));
    }

    #[tokio::test]
    async fn execute_returns_both_streams() {
        let h = handler(SimulatedProgram::new("/src/main.c", 1));
        let out = call(&h, "execute_lldb_command", json!(["echo hi"])).await.unwrap();
        assert_eq!(out, json!({"succeeded": true, "output": "hi\n", "error": ""}));
        let out = call(&h, "execute_lldb_command", json!(["frobnicate"])).await.unwrap();
        assert_eq!(out["succeeded"], false);
    }

    #[tokio::test]
    async fn bad_calls_are_faults() {
        let h = handler(SimulatedProgram::new("/src/main.c", 1));
        let fault = call(&h, "teleport", json!([])).await.unwrap_err();
        assert_eq!(fault.code, METHOD_NOT_FOUND);
        let fault = call(&h, "select_thread", json!([])).await.unwrap_err();
        assert_eq!(fault.code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn every_listed_method_is_dispatched() {
        let h = handler(SimulatedProgram::new("/src/main.c", 1));
        for method in METHODS {
            if let Err(fault) = call(&h, method, json!([])).await {
                assert_ne!(fault.code, METHOD_NOT_FOUND, "{method}");
            }
        }
    }

    #[tokio::test]
    async fn status_serializes_as_wire_string() {
        let h = handler(SimulatedProgram::new("/src/main.c", 1));
        assert_eq!(call(&h, "get_status", json!([])).await.unwrap(), json!("unknown"));
        assert_eq!(Status::Unknown.to_string(), "unknown");
    }
}
