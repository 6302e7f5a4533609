//! [`DebugEngine`] over the Debug Adapter Protocol, for `lldb-dap`.
//!
//! One adapter process is spawned per launch. Lines cross the boundary
//! one-based; frame addresses come from `instructionPointerReference`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tether_core::{
    BareFrame, Breakpoint, CommandOutput, Frame, LaunchRequest, Status, StopReason,
    SymbolicatedFrame, ThreadId, ThreadInfo, VariableMap,
};
use tether_dap::protocol::StopReason as DapStopReason;
use tether_dap::{
    Capabilities, DapCapabilities, DapConnection, DapError, DisconnectArguments,
    EvaluateArguments, EvaluateResponseBody, Event, EventReceiver, ExitedEventBody,
    InitializeRequestArguments, LaunchRequestArguments, ModuleEventBody, OutputEventBody, Scope,
    ScopesArguments, ScopesResponseBody, SetBreakpointsArguments, SetBreakpointsResponseBody,
    Source, SourceBreakpoint, StackFrame, StackTraceArguments, StackTraceResponseBody,
    StoppedEventBody, ThreadArguments, ThreadsResponseBody, VariablesArguments,
    VariablesResponseBody,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::engine::{
    DebugEngine, EngineEvents, OutputChunk, OutputStream, StateChange, StepKind, VariableScope,
};
use crate::error::BackendError;

/// Default debug adapter executable.
pub const DEFAULT_ADAPTER: &str = "lldb-dap";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);
const ADAPTER_EXIT_GRACE: Duration = Duration::from_secs(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn thread_id(id: i64) -> ThreadId {
    ThreadId(id as u64)
}

fn dap_thread(id: ThreadId) -> i64 {
    id.0 as i64
}

fn module_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn map_stop_reason(reason: &DapStopReason) -> StopReason {
    match reason {
        DapStopReason::Breakpoint
        | DapStopReason::FunctionBreakpoint
        | DapStopReason::InstructionBreakpoint => StopReason::Breakpoint,
        DapStopReason::DataBreakpoint => StopReason::Watchpoint,
        DapStopReason::Exception => StopReason::Exception,
        DapStopReason::Step | DapStopReason::Goto => StopReason::PlanComplete,
        DapStopReason::Entry | DapStopReason::Pause | DapStopReason::Signal => StopReason::Signal,
        DapStopReason::Exec => StopReason::Exec,
        DapStopReason::Other => StopReason::Invalid,
    }
}

fn parse_address(text: &str) -> Option<u64> {
    let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))?;
    u64::from_str_radix(digits, 16).ok()
}

/// Split an lldb frame name into function and inlined flag.
fn split_inlined(name: &str) -> (String, bool) {
    match name.strip_suffix(" [inlined]") {
        Some(function) => (function.to_string(), true),
        None => (name.to_string(), false),
    }
}

/// Split a frame name without debug info into symbol and offset.
fn split_symbol(name: &str) -> (Option<String>, u64) {
    if let Some((symbol, offset)) = name.rsplit_once(" + ") {
        if let Ok(offset) = offset.trim().parse() {
            return (Some(symbol.to_string()), offset);
        }
    }
    if name.is_empty() || parse_address(name).is_some() {
        (None, 0)
    } else {
        (Some(name.to_string()), 0)
    }
}

fn scope_wanted(scope: &Scope, wanted: VariableScope) -> bool {
    let hint = scope.presentation_hint.as_deref();
    let name = scope.name.to_ascii_lowercase();
    match wanted {
        VariableScope::Arguments => hint == Some("arguments") || name == "arguments",
        VariableScope::Locals => {
            hint == Some("locals") || name == "locals" || name == "statics"
        }
        VariableScope::All => hint != Some("registers") && name != "registers",
    }
}

fn launch_error(err: DapError) -> BackendError {
    match err {
        DapError::Rejected { message, .. } => BackendError::Launch(message),
        other => BackendError::Launch(other.to_string()),
    }
}

/// Drives `lldb-dap` (or another adapter speaking its dialect).
pub struct DapEngine {
    program: String,
    args: Vec<String>,
    conn: Mutex<Option<Arc<DapConnection>>>,
    caps: Mutex<DapCapabilities>,
    modules: Arc<Mutex<HashMap<String, String>>>,
    last_stop: Arc<Mutex<Option<(i64, StopReason)>>>,
}

impl DapEngine {
    /// An engine that spawns `program` for each launch.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            conn: Mutex::new(None),
            caps: Mutex::new(DapCapabilities::default()),
            modules: Arc::new(Mutex::new(HashMap::new())),
            last_stop: Arc::new(Mutex::new(None)),
        }
    }

    /// Extra arguments for the adapter process.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    fn connection(&self, action: &'static str) -> Result<Arc<DapConnection>, BackendError> {
        lock(&self.conn)
            .clone()
            .ok_or(BackendError::NoProcess(action))
    }

    fn capabilities(&self) -> DapCapabilities {
        *lock(&self.caps)
    }

    async fn query<R: DeserializeOwned>(
        conn: &DapConnection,
        command: &str,
    ) -> Result<R, BackendError> {
        let body = conn.request_value(command, None).await?;
        serde_json::from_value(body.unwrap_or(Value::Null))
            .map_err(|e| BackendError::Engine(format!("{command}: {e}")))
    }

    /// A thread to address requests that apply to the whole process.
    async fn any_thread(&self, conn: &DapConnection) -> Result<i64, BackendError> {
        let last = *lock(&self.last_stop);
        if let Some((thread, _)) = last {
            return Ok(thread);
        }
        let body: ThreadsResponseBody = Self::query(conn, "threads").await?;
        body.threads
            .first()
            .map(|t| t.id)
            .ok_or_else(|| BackendError::Engine("debuggee has no threads".into()))
    }

    async fn stack(
        conn: &DapConnection,
        thread: ThreadId,
        levels: Option<i64>,
    ) -> Result<StackTraceResponseBody, BackendError> {
        let args = StackTraceArguments {
            thread_id: dap_thread(thread),
            start_frame: Some(0),
            levels,
        };
        Ok(conn.request("stackTrace", &args).await?)
    }

    async fn frame_variables(
        conn: &DapConnection,
        frame_id: i64,
        wanted: VariableScope,
    ) -> Result<VariableMap, BackendError> {
        let scopes: ScopesResponseBody = conn
            .request("scopes", &ScopesArguments { frame_id })
            .await?;
        let mut out = VariableMap::new();
        for scope in scopes.scopes.iter().filter(|s| scope_wanted(s, wanted)) {
            let args = VariablesArguments {
                variables_reference: scope.variables_reference,
            };
            let vars: VariablesResponseBody = conn.request("variables", &args).await?;
            for var in vars.variables {
                out.entry(var.name).or_insert(var.value);
            }
        }
        Ok(out)
    }

    async fn frame(&self, conn: &DapConnection, frame: StackFrame) -> Frame {
        let address = frame
            .instruction_pointer_reference
            .as_deref()
            .and_then(parse_address)
            .unwrap_or(0);
        let module = frame
            .module_id
            .as_ref()
            .and_then(|id| lock(&self.modules).get(&module_key(id)).cloned());
        let path = frame.source.as_ref().and_then(|s| s.path.clone());

        match path {
            Some(path) if frame.line > 0 => {
                let (function, inlined) = split_inlined(&frame.name);
                let arguments = Self::frame_variables(conn, frame.id, VariableScope::Arguments)
                    .await
                    .unwrap_or_else(|e| {
                        debug!("no arguments for frame {}: {e}", frame.id);
                        VariableMap::new()
                    });
                Frame::Symbolicated(SymbolicatedFrame {
                    address,
                    module,
                    function,
                    file: PathBuf::from(path),
                    line: u32::try_from(frame.line).unwrap_or(0),
                    column: u32::try_from(frame.column).unwrap_or(0),
                    inlined,
                    arguments,
                })
            }
            _ => {
                let (symbol, offset) = split_symbol(&frame.name);
                Frame::Bare(BareFrame {
                    address,
                    module,
                    symbol,
                    offset,
                })
            }
        }
    }

    async fn wait_for_initialized(
        conn: &Arc<DapConnection>,
        events: &mut EventReceiver,
        args: LaunchRequestArguments,
        caps: DapCapabilities,
    ) -> Result<Vec<Event>, BackendError> {
        let (done_tx, mut done_rx) = oneshot::channel();
        {
            let conn = conn.clone();
            tokio::spawn(async move {
                let _ = done_tx.send(conn.send("launch", &args).await);
            });
        }

        let mut early = Vec::new();
        let mut launched = false;
        let deadline = tokio::time::sleep(LAUNCH_TIMEOUT);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                result = &mut done_rx, if !launched => {
                    launched = true;
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => return Err(launch_error(e)),
                        Err(_) => return Err(launch_error(DapError::Terminated)),
                    }
                }
                event = events.recv() => match event {
                    Some(event) if event.event == "initialized" => break,
                    Some(event) => early.push(event),
                    None => return Err(launch_error(DapError::Terminated)),
                },
                _ = &mut deadline => {
                    return Err(BackendError::Launch("timed out waiting for the adapter".into()));
                }
            }
        }

        if caps.supports_configuration_done_request {
            conn.request_value("configurationDone", None).await?;
        }
        if !launched {
            match done_rx.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(launch_error(e)),
                Err(_) => return Err(launch_error(DapError::Terminated)),
            }
        }
        Ok(early)
    }
}

impl DebugEngine for DapEngine {
    async fn launch(&self, request: &LaunchRequest) -> Result<EngineEvents, BackendError> {
        self.terminate().await;

        let (conn, mut events) = DapConnection::spawn(&self.program, &self.args)
            .map_err(|e| BackendError::TargetCreation(format!("{}: {e}", self.program)))?;
        let conn = Arc::new(conn.with_request_timeout(REQUEST_TIMEOUT));

        let init = InitializeRequestArguments {
            client_id: Some("tether".into()),
            client_name: Some("tether".into()),
            adapter_id: DEFAULT_ADAPTER.into(),
            lines_start_at1: Some(true),
            columns_start_at1: Some(true),
            path_format: Some("path".into()),
            supports_variable_type: Some(true),
            supports_run_in_terminal_request: Some(false),
        };
        let caps: Option<Capabilities> = conn
            .request("initialize", &init)
            .await
            .map_err(|e| BackendError::TargetCreation(e.to_string()))?;
        let caps = DapCapabilities::from_initialize_response(&caps.unwrap_or_default());
        *lock(&self.caps) = caps;

        let args = LaunchRequestArguments {
            program: request.executable.display().to_string(),
            args: request.args.clone(),
            cwd: request
                .working_dir
                .as_ref()
                .map(|p| p.display().to_string()),
            env: request
                .env
                .as_ref()
                .map(LaunchRequestArguments::env_from_map)
                .unwrap_or_default(),
            stop_on_entry: Some(true),
            init_commands: request
                .module_search_path
                .iter()
                .map(|p| format!("settings append target.exec-search-paths {}", p.display()))
                .collect(),
        };
        let early = Self::wait_for_initialized(&conn, &mut events, args, caps).await?;
        info!(program = %request.executable.display(), "adapter launched debuggee");

        lock(&self.modules).clear();
        *lock(&self.last_stop) = None;
        *lock(&self.conn) = Some(conn);

        let (state_tx, state) = mpsc::unbounded_channel();
        let (output_tx, output) = mpsc::unbounded_channel();
        let pump = EventPump {
            modules: self.modules.clone(),
            last_stop: self.last_stop.clone(),
            state_tx,
            output_tx,
            exited: false,
        };
        tokio::spawn(pump.run(early, events));
        Ok(EngineEvents { state, output })
    }

    async fn resume(&self) -> Result<(), BackendError> {
        let conn = self.connection("run")?;
        let thread_id = self.any_thread(&conn).await?;
        conn.send("continue", &ThreadArguments { thread_id }).await?;
        Ok(())
    }

    async fn pause(&self, thread: Option<ThreadId>) -> Result<(), BackendError> {
        let conn = self.connection("pause")?;
        let thread_id = match thread {
            Some(id) => dap_thread(id),
            None => self.any_thread(&conn).await?,
        };
        conn.send("pause", &ThreadArguments { thread_id }).await?;
        Ok(())
    }

    async fn step(&self, thread: ThreadId, kind: StepKind) -> Result<(), BackendError> {
        let conn = self.connection("step")?;
        let command = match kind {
            StepKind::Into => "stepIn",
            StepKind::Over => "next",
            StepKind::Out => "stepOut",
        };
        let args = ThreadArguments {
            thread_id: dap_thread(thread),
        };
        conn.send(command, &args).await?;
        Ok(())
    }

    async fn kill(&self) -> Result<(), BackendError> {
        let Ok(conn) = self.connection("kill") else {
            return Ok(());
        };
        let result = if self.capabilities().supports_terminate_request {
            conn.request_value("terminate", Some(Value::Object(Default::default())))
                .await
                .map(drop)
        } else {
            let args = DisconnectArguments {
                restart: None,
                terminate_debuggee: Some(true),
            };
            conn.send("disconnect", &args).await
        };
        match result {
            Ok(()) | Err(DapError::Terminated) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_stdin(&self, _data: &str) -> Result<(), BackendError> {
        Err(BackendError::Unsupported(
            "the debug adapter has no stdin channel",
        ))
    }

    async fn set_file_breakpoints(
        &self,
        file: &Path,
        breakpoints: &[Breakpoint],
    ) -> Result<(), BackendError> {
        let conn = self.connection("set breakpoints in")?;
        let caps = self.capabilities();
        let args = SetBreakpointsArguments {
            source: Source {
                name: file.file_name().map(|n| n.to_string_lossy().into_owned()),
                path: Some(file.display().to_string()),
                source_reference: None,
            },
            breakpoints: breakpoints
                .iter()
                .map(|bp| SourceBreakpoint {
                    line: i64::from(bp.line) + 1,
                    condition: caps.condition(bp.condition.as_deref()),
                    hit_condition: caps.hit_condition(bp.ignore_count),
                })
                .collect(),
        };
        let body: SetBreakpointsResponseBody = conn.request("setBreakpoints", &args).await?;
        for (bp, resolved) in breakpoints.iter().zip(&body.breakpoints) {
            if !resolved.verified {
                debug!(
                    "breakpoint {bp} not resolved: {}",
                    resolved.message.as_deref().unwrap_or("no location")
                );
            }
        }
        Ok(())
    }

    async fn threads(&self) -> Result<Vec<ThreadInfo>, BackendError> {
        let conn = self.connection("query")?;
        let body: ThreadsResponseBody = Self::query(&conn, "threads").await?;
        let last = *lock(&self.last_stop);
        let mut out = Vec::with_capacity(body.threads.len());
        for (index, thread) in body.threads.into_iter().enumerate() {
            let id = thread_id(thread.id);
            let num_frames = match Self::stack(&conn, id, Some(1)).await {
                Ok(stack) => stack
                    .total_frames
                    .unwrap_or(stack.stack_frames.len() as i64),
                Err(e) => {
                    trace!("no stack for thread {id}: {e}");
                    0
                }
            };
            let stop_reason = match last {
                Some((tid, reason)) if tid == thread.id => reason,
                _ => StopReason::None,
            };
            out.push(ThreadInfo {
                id,
                index: u32::try_from(index + 1).unwrap_or(u32::MAX),
                name: Some(thread.name),
                queue: None,
                stop_reason,
                num_frames: u32::try_from(num_frames).unwrap_or(0),
                selected: false,
            });
        }
        Ok(out)
    }

    async fn backtrace(&self, thread: ThreadId) -> Result<Vec<Frame>, BackendError> {
        let conn = self.connection("get traces of")?;
        let stack = Self::stack(&conn, thread, None).await?;
        let mut frames = Vec::with_capacity(stack.stack_frames.len());
        for frame in stack.stack_frames {
            frames.push(self.frame(&conn, frame).await);
        }
        Ok(frames)
    }

    async fn variables(
        &self,
        thread: ThreadId,
        frame: u32,
        scope: VariableScope,
    ) -> Result<VariableMap, BackendError> {
        let conn = self.connection("query")?;
        let stack = Self::stack(&conn, thread, Some(i64::from(frame) + 1)).await?;
        let frame_id = stack
            .stack_frames
            .get(frame as usize)
            .map(|f| f.id)
            .ok_or_else(|| BackendError::Engine(format!("thread {thread} has no frame {frame}")))?;
        Self::frame_variables(&conn, frame_id, scope).await
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, BackendError> {
        let conn = lock(&self.conn).clone().ok_or(BackendError::NoTarget)?;
        let args = EvaluateArguments {
            expression: format!("`{command}"),
            frame_id: None,
            context: Some("repl".into()),
        };
        match conn
            .request::<_, EvaluateResponseBody>("evaluate", &args)
            .await
        {
            Ok(body) => Ok(CommandOutput {
                succeeded: true,
                output: body.result,
                error: String::new(),
            }),
            Err(DapError::Rejected { message, .. }) => Ok(CommandOutput {
                succeeded: false,
                output: String::new(),
                error: message,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn terminate(&self) {
        let conn = lock(&self.conn).take();
        let Some(conn) = conn else {
            return;
        };
        let args = DisconnectArguments {
            restart: None,
            terminate_debuggee: Some(true),
        };
        if let Err(e) = conn.send("disconnect", &args).await {
            debug!("disconnect failed: {e}");
        }
        conn.close(ADAPTER_EXIT_GRACE).await;
    }
}

/// Turns adapter events into engine feeds.
struct EventPump {
    modules: Arc<Mutex<HashMap<String, String>>>,
    last_stop: Arc<Mutex<Option<(i64, StopReason)>>>,
    state_tx: mpsc::UnboundedSender<StateChange>,
    output_tx: mpsc::UnboundedSender<OutputChunk>,
    exited: bool,
}

fn body<T: DeserializeOwned>(event: &Event) -> Option<T> {
    let value = event.body.clone()?;
    serde_json::from_value(value)
        .map_err(|e| warn!(event = %event.event, "malformed event body: {e}"))
        .ok()
}

impl EventPump {
    async fn run(mut self, early: Vec<Event>, mut events: EventReceiver) {
        for event in early {
            self.handle(event);
        }
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        if !self.exited {
            warn!("debug adapter went away before the debuggee exited");
            let _ = self.state_tx.send(StateChange::new(Status::Crashed));
        }
    }

    fn handle(&mut self, event: Event) {
        match event.event.as_str() {
            "stopped" => {
                let Some(stopped) = body::<StoppedEventBody>(&event) else {
                    return;
                };
                let reason = map_stop_reason(&stopped.reason);
                *lock(&self.last_stop) = stopped.thread_id.map(|t| (t, reason));
                let _ = self.state_tx.send(StateChange {
                    status: Status::stopped([reason]),
                    thread: stopped.thread_id.map(thread_id),
                });
            }
            "continued" => {
                let _ = self.state_tx.send(StateChange::new(Status::Running));
            }
            "exited" => {
                if let Some(exited) = body::<ExitedEventBody>(&event) {
                    info!(code = exited.exit_code, "debuggee exited");
                }
                self.exited = true;
                let _ = self.state_tx.send(StateChange::new(Status::Exited));
            }
            "terminated" => {
                if !self.exited {
                    self.exited = true;
                    let _ = self.state_tx.send(StateChange::new(Status::Exited));
                }
            }
            "output" => {
                let Some(output) = body::<OutputEventBody>(&event) else {
                    return;
                };
                let stream = match output.category.as_deref() {
                    Some("stdout") => OutputStream::Stdout,
                    Some("stderr") => OutputStream::Stderr,
                    _ => {
                        debug!("adapter: {}", output.output.trim_end());
                        return;
                    }
                };
                let _ = self.output_tx.send(OutputChunk {
                    stream,
                    text: output.output,
                });
            }
            "module" => {
                let Some(module) = body::<ModuleEventBody>(&event) else {
                    return;
                };
                let key = module_key(&module.module.id);
                let mut modules = lock(&self.modules);
                if module.reason == "removed" {
                    modules.remove(&key);
                } else {
                    modules.insert(key, module.module.name);
                }
            }
            other => trace!(event = other, "ignored adapter event"),
        }
    }
}
