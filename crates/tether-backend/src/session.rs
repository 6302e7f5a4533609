//! The debug backend session: the authoritative state machine.
//!
//! Commands are serialized through one async lock; a command that
//! arrives while another is running fails with [`BackendError::Busy`]
//! instead of queueing. Status and output live outside that lock, so
//! polling never waits for a slow command. Two listener tasks feed them
//! from the engine and stop when the session's cancel signal fires.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tether_core::{
    Breakpoint, BreakpointId, CommandOutput, LaunchRequest, LiveBreakpoint, Status,
    ThreadBacktrace, ThreadId, ThreadInfo, VariableMap,
};
use tether_rpc::ShutdownHandle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::breakpoints::BreakpointTable;
use crate::engine::{
    DebugEngine, EngineEvents, OutputChunk, OutputStream, StateChange, StepKind, VariableScope,
};
use crate::error::BackendError;

/// Default delay between observing `exited` and shutting down.
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_secs(2);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct SessionState {
    target: Option<PathBuf>,
    process: bool,
    breakpoints: BreakpointTable,
    listeners: Option<watch::Sender<bool>>,
}

impl SessionState {
    fn require_process(&self, action: &'static str) -> Result<(), BackendError> {
        if self.process {
            Ok(())
        } else {
            Err(BackendError::NoProcess(action))
        }
    }

    fn require_target(&self) -> Result<(), BackendError> {
        if self.target.is_some() {
            Ok(())
        } else {
            Err(BackendError::NoTarget)
        }
    }

    fn cancel_listeners(&mut self) {
        if let Some(cancel) = self.listeners.take() {
            cancel.send_replace(true);
        }
    }
}

struct Inner<E> {
    engine: E,
    state: tokio::sync::Mutex<SessionState>,
    status: Mutex<Status>,
    stdout: Mutex<String>,
    stderr: Mutex<String>,
    selected: Mutex<Option<ThreadId>>,
    server: Mutex<Option<ShutdownHandle>>,
    exiting: AtomicBool,
    /// Bumped by every `prepare`; a pending exit shutdown only fires if
    /// no launch happened since it was scheduled.
    generation: AtomicU64,
    exit_grace: Duration,
}

/// One backend's debug session. Cheap to clone.
pub struct BackendSession<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for BackendSession<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: DebugEngine> BackendSession<E> {
    /// A session driving `engine`, not yet attached to any debuggee.
    pub fn new(engine: E) -> Self {
        Self::with_exit_grace(engine, DEFAULT_EXIT_GRACE)
    }

    /// Like [`new`](Self::new) with a custom delay before self-shutdown.
    pub fn with_exit_grace(engine: E, exit_grace: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                state: tokio::sync::Mutex::new(SessionState::default()),
                status: Mutex::new(Status::Unknown),
                stdout: Mutex::new(String::new()),
                stderr: Mutex::new(String::new()),
                selected: Mutex::new(None),
                server: Mutex::new(None),
                exiting: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                exit_grace,
            }),
        }
    }

    /// Close `server` as the last step of shutdown.
    pub fn attach_server(&self, server: ShutdownHandle) {
        *lock(&self.inner.server) = Some(server);
    }

    /// The engine behind this session.
    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    fn command_state(&self) -> Result<tokio::sync::MutexGuard<'_, SessionState>, BackendError> {
        self.inner.state.try_lock().map_err(|_| BackendError::Busy)
    }

    fn set_status(&self, status: Status) -> Status {
        let mut current = lock(&self.inner.status);
        if *current != status {
            info!("state change {} -> {}", *current, status);
        }
        std::mem::replace(&mut *current, status)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create (or reuse) the target and launch the debuggee stopped at entry.
    pub async fn prepare(&self, request: LaunchRequest) -> Result<(), BackendError> {
        let mut state = self.command_state()?;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.exiting.store(false, Ordering::SeqCst);
        if state.process {
            debug!("relaunching, killing previous debuggee");
            if let Err(e) = self.inner.engine.kill().await {
                warn!("failed to kill previous debuggee: {e}");
            }
            state.process = false;
        }
        state.cancel_listeners();

        state.target.get_or_insert_with(|| request.executable.clone());
        let previous = self.set_status(Status::Launching);
        let events = match self.inner.engine.launch(&request).await {
            Ok(events) => events,
            Err(e) => {
                if matches!(e, BackendError::TargetCreation(_)) {
                    state.target = None;
                }
                self.set_status(previous);
                return Err(e);
            }
        };
        state.process = true;
        *lock(&self.inner.selected) = None;
        state.listeners = Some(self.spawn_listeners(events));
        info!(executable = %request.executable.display(), "debuggee launched");

        let files = state.breakpoints.files();
        self.sync_files(&state, files).await
    }

    /// Continue the debuggee.
    pub async fn start(&self) -> Result<(), BackendError> {
        let state = self.command_state()?;
        state.require_process("run")?;
        let previous = self.set_status(Status::Running);
        if let Err(e) = self.inner.engine.resume().await {
            self.set_status(previous);
            return Err(e);
        }
        Ok(())
    }

    /// Interrupt the debuggee. The stop arrives as a state change.
    pub async fn pause(&self) -> Result<(), BackendError> {
        let state = self.command_state()?;
        state.require_process("pause")?;
        let thread = *lock(&self.inner.selected);
        self.inner.engine.pause(thread).await
    }

    /// Step the selected thread.
    pub async fn step(&self, kind: StepKind) -> Result<(), BackendError> {
        let state = self.command_state()?;
        state.require_process("step")?;
        let thread = self.selected_or_first().await?;
        let previous = self.set_status(Status::Stepping);
        if let Err(e) = self.inner.engine.step(thread, kind).await {
            self.set_status(previous);
            return Err(e);
        }
        Ok(())
    }

    /// Kill the debuggee. A no-op when none is running.
    pub async fn stop(&self) -> Result<(), BackendError> {
        let mut state = self.command_state()?;
        if state.process {
            self.inner.engine.kill().await?;
            state.process = false;
            info!("debuggee killed");
        }
        Ok(())
    }

    /// Stop the debuggee, cancel the listeners, tear down the debugger
    /// and close the server, in that order.
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.lock().await;
        if state.process {
            if let Err(e) = self.inner.engine.kill().await {
                warn!("failed to kill debuggee during shutdown: {e}");
            }
            state.process = false;
        }
        state.cancel_listeners();
        self.inner.engine.terminate().await;
        if let Some(server) = lock(&self.inner.server).take() {
            server.shutdown();
        }
        info!("backend session shut down");
    }

    // ------------------------------------------------------------------
    // Status and I/O
    // ------------------------------------------------------------------

    /// Last observed status.
    pub fn status(&self) -> Status {
        lock(&self.inner.status).clone()
    }

    /// Drain buffered standard output.
    pub fn take_stdout(&self) -> String {
        std::mem::take(&mut *lock(&self.inner.stdout))
    }

    /// Drain buffered standard error.
    pub fn take_stderr(&self) -> String {
        std::mem::take(&mut *lock(&self.inner.stderr))
    }

    /// Write to the debuggee's standard input.
    pub async fn push_stdin(&self, data: &str) -> Result<(), BackendError> {
        let state = self.command_state()?;
        state.require_process("send data to")?;
        self.inner.engine.write_stdin(data).await
    }

    /// Run a debugger console command.
    pub async fn execute(&self, command: &str) -> Result<CommandOutput, BackendError> {
        let _state = self.command_state()?;
        self.inner.engine.execute(command).await
    }

    // ------------------------------------------------------------------
    // Threads, backtraces, variables
    // ------------------------------------------------------------------

    async fn selected_or_first(&self) -> Result<ThreadId, BackendError> {
        let selected = *lock(&self.inner.selected);
        if let Some(id) = selected {
            return Ok(id);
        }
        let threads = self.inner.engine.threads().await?;
        let first = threads
            .first()
            .map(|t| t.id)
            .ok_or_else(|| BackendError::Engine("debuggee has no threads".into()))?;
        *lock(&self.inner.selected) = Some(first);
        Ok(first)
    }

    async fn marked_threads(&self) -> Result<Vec<ThreadInfo>, BackendError> {
        let mut threads = self.inner.engine.threads().await?;
        let mut selected = lock(&self.inner.selected);
        let current = selected.filter(|id| threads.iter().any(|t| t.id == *id));
        let current = current.or_else(|| threads.first().map(|t| t.id));
        *selected = current;
        for thread in &mut threads {
            thread.selected = Some(thread.id) == current;
        }
        Ok(threads)
    }

    /// All threads, with the selected one flagged.
    pub async fn threads(&self) -> Result<Vec<ThreadInfo>, BackendError> {
        let state = self.command_state()?;
        state.require_process("query")?;
        self.marked_threads().await
    }

    /// Select a thread. Returns false if no such thread exists.
    pub async fn select_thread(&self, id: ThreadId) -> Result<bool, BackendError> {
        let state = self.command_state()?;
        state.require_process("work on")?;
        let threads = self.inner.engine.threads().await?;
        if !threads.iter().any(|t| t.id == id) {
            return Ok(false);
        }
        *lock(&self.inner.selected) = Some(id);
        Ok(true)
    }

    /// The selected thread.
    pub async fn selected_thread(&self) -> Result<ThreadInfo, BackendError> {
        let state = self.command_state()?;
        state.require_process("query")?;
        self.marked_threads()
            .await?
            .into_iter()
            .find(|t| t.selected)
            .ok_or_else(|| BackendError::Engine("debuggee has no threads".into()))
    }

    /// Backtraces of every thread, selected thread first.
    pub async fn backtraces(&self) -> Result<Vec<ThreadBacktrace>, BackendError> {
        let state = self.command_state()?;
        state.require_process("get traces of")?;
        let mut threads = self.marked_threads().await?;
        threads.sort_by_key(|t| !t.selected);
        let mut out = Vec::with_capacity(threads.len());
        for thread in threads {
            let frames = self.inner.engine.backtrace(thread.id).await?;
            out.push(ThreadBacktrace { thread, frames });
        }
        Ok(out)
    }

    /// Backtrace of the selected thread.
    pub async fn selected_backtrace(&self) -> Result<ThreadBacktrace, BackendError> {
        let state = self.command_state()?;
        state.require_process("get traces of")?;
        let thread = self
            .marked_threads()
            .await?
            .into_iter()
            .find(|t| t.selected)
            .ok_or_else(|| BackendError::Engine("debuggee has no threads".into()))?;
        let frames = self.inner.engine.backtrace(thread.id).await?;
        Ok(ThreadBacktrace { thread, frames })
    }

    /// Variables of one frame.
    pub async fn variables(
        &self,
        thread: ThreadId,
        frame: u32,
        scope: VariableScope,
    ) -> Result<VariableMap, BackendError> {
        let state = self.command_state()?;
        state.require_process("query")?;
        self.inner.engine.variables(thread, frame, scope).await
    }

    // ------------------------------------------------------------------
    // Breakpoints
    // ------------------------------------------------------------------

    async fn sync_files(
        &self,
        state: &SessionState,
        files: BTreeSet<PathBuf>,
    ) -> Result<(), BackendError> {
        if !state.process {
            return Ok(());
        }
        for file in files {
            let enabled = state.breakpoints.enabled_in(&file);
            self.inner
                .engine
                .set_file_breakpoints(&file, &enabled)
                .await?;
        }
        Ok(())
    }

    /// Live breakpoints.
    pub async fn breakpoints(&self) -> Result<Vec<LiveBreakpoint>, BackendError> {
        let state = self.command_state()?;
        state.require_target()?;
        Ok(state.breakpoints.list().to_vec())
    }

    /// Create a breakpoint at zero-based `line` of `file`.
    pub async fn set_breakpoint(&self, spec: Breakpoint) -> Result<BreakpointId, BackendError> {
        let mut state = self.command_state()?;
        state.require_target()?;
        let file = spec.file.clone();
        let id = state.breakpoints.insert(spec);
        debug!(%id, file = %file.display(), "breakpoint set");
        self.sync_files(&state, BTreeSet::from([file])).await?;
        Ok(id)
    }

    /// Delete a breakpoint. Unknown ids are ignored.
    pub async fn delete_breakpoint(&self, id: BreakpointId) -> Result<(), BackendError> {
        let mut state = self.command_state()?;
        state.require_target()?;
        let files = state.breakpoints.remove(id).into_iter().collect();
        self.sync_files(&state, files).await
    }

    /// Enable or disable one breakpoint. Unknown ids are ignored.
    pub async fn set_breakpoint_enabled(
        &self,
        id: BreakpointId,
        enabled: bool,
    ) -> Result<(), BackendError> {
        let mut state = self.command_state()?;
        state.require_target()?;
        let files = state.breakpoints.set_enabled(id, enabled).into_iter().collect();
        self.sync_files(&state, files).await
    }

    /// Enable or disable every breakpoint.
    pub async fn set_all_breakpoints_enabled(&self, enabled: bool) -> Result<(), BackendError> {
        let mut state = self.command_state()?;
        state.require_target()?;
        let files = state.breakpoints.set_all_enabled(enabled);
        self.sync_files(&state, files).await
    }

    /// Delete every breakpoint.
    pub async fn delete_all_breakpoints(&self) -> Result<(), BackendError> {
        let mut state = self.command_state()?;
        state.require_target()?;
        let files = state.breakpoints.clear();
        self.sync_files(&state, files).await
    }

    /// Snapshot the enabled flags and disable everything, unless a
    /// snapshot is already pending.
    pub async fn disable_breakpoints(&self) -> Result<(), BackendError> {
        let mut state = self.command_state()?;
        state.require_target()?;
        let files = state.breakpoints.disable_with_snapshot();
        self.sync_files(&state, files).await
    }

    /// Restore the pending snapshot.
    pub async fn enable_breakpoints(&self) -> Result<(), BackendError> {
        let mut state = self.command_state()?;
        state.require_target()?;
        let files = state.breakpoints.restore_snapshot();
        self.sync_files(&state, files).await
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    fn spawn_listeners(&self, events: EngineEvents) -> watch::Sender<bool> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(state_listener(
            Arc::downgrade(&self.inner),
            events.state,
            cancel_rx.clone(),
        ));
        tokio::spawn(output_listener(
            Arc::downgrade(&self.inner),
            events.output,
            cancel_rx,
        ));
        cancel_tx
    }

    fn apply_state(&self, change: StateChange) {
        if let (true, Some(thread)) = (change.status.is_stopped(), change.thread) {
            *lock(&self.inner.selected) = Some(thread);
        }
        let exited = change.status == Status::Exited;
        self.set_status(change.status);
        if exited && !self.inner.exiting.swap(true, Ordering::SeqCst) {
            let grace = self.inner.exit_grace;
            let generation = self.inner.generation.load(Ordering::SeqCst);
            let weak = Arc::downgrade(&self.inner);
            info!(?grace, "debuggee exited, shutting down");
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.generation.load(Ordering::SeqCst) != generation {
                    debug!("debuggee relaunched during exit grace, staying up");
                    return;
                }
                BackendSession { inner }.shutdown().await;
            });
        }
    }
}

async fn state_listener<E: DebugEngine>(
    session: Weak<Inner<E>>,
    mut changes: mpsc::UnboundedReceiver<StateChange>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => break,
            change = changes.recv() => {
                let (Some(change), Some(inner)) = (change, session.upgrade()) else {
                    break;
                };
                BackendSession { inner }.apply_state(change);
            }
        }
    }
    debug!("state listener stopped");
}

async fn output_listener<E>(
    session: Weak<Inner<E>>,
    mut chunks: mpsc::UnboundedReceiver<OutputChunk>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => break,
            chunk = chunks.recv() => {
                let (Some(chunk), Some(inner)) = (chunk, session.upgrade()) else {
                    break;
                };
                let buffer = match chunk.stream {
                    OutputStream::Stdout => &inner.stdout,
                    OutputStream::Stderr => &inner.stderr,
                };
                lock(buffer).push_str(&chunk.text);
            }
        }
    }
    debug!("output listener stopped");
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tether_core::StopReason;
    use tether_rpc::RpcServer;

    use super::*;
    use crate::simulated::{SimulatedEngine, SimulatedProgram, MAIN_THREAD, WORKER_THREAD};

    const SOURCE: &str = "/src/main.c";

    fn session(program: SimulatedProgram) -> BackendSession<SimulatedEngine> {
        BackendSession::with_exit_grace(SimulatedEngine::new(program), Duration::from_secs(60))
    }

    async fn wait_for(session: &BackendSession<SimulatedEngine>, want: &Status) {
        for _ in 0..400 {
            if session.status() == *want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("status stuck at {}, wanted {want}", session.status());
    }

    async fn launched(program: SimulatedProgram) -> BackendSession<SimulatedEngine> {
        let s = session(program);
        s.prepare(LaunchRequest::new("/bin/demo")).await.unwrap();
        wait_for(&s, &Status::stopped([StopReason::Signal])).await;
        s
    }

    fn enabled_pattern(list: &[LiveBreakpoint]) -> Vec<bool> {
        list.iter().map(|bp| bp.spec.enabled).collect()
    }

    #[tokio::test]
    async fn run_to_breakpoint_then_exit() {
        let s = launched(SimulatedProgram::new(SOURCE, 6)).await;
        s.set_breakpoint(Breakpoint::new(SOURCE, 3)).await.unwrap();

        s.start().await.unwrap();
        wait_for(&s, &Status::stopped([StopReason::Breakpoint])).await;
        let bt = s.selected_backtrace().await.unwrap();
        assert_eq!(bt.thread.id, MAIN_THREAD);
        assert_eq!(bt.frames[0].location(), Some((Path::new(SOURCE), 4)));

        s.start().await.unwrap();
        wait_for(&s, &Status::Exited).await;
    }

    #[tokio::test]
    async fn stdout_is_drained_exactly_once() {
        let program = SimulatedProgram::new(SOURCE, 4)
            .with_output(0, "hello ")
            .with_output(1, "world\n");
        let s = launched(program).await;
        s.set_breakpoint(Breakpoint::new(SOURCE, 2)).await.unwrap();
        s.start().await.unwrap();
        wait_for(&s, &Status::stopped([StopReason::Breakpoint])).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(s.take_stdout(), "hello world\n");
        assert_eq!(s.take_stdout(), "");
        assert_eq!(s.take_stderr(), "");
    }

    #[tokio::test]
    async fn stderr_has_its_own_buffer() {
        let s = launched(SimulatedProgram::new(SOURCE, 4)).await;
        s.engine().emit_output(OutputStream::Stderr, "oops\n");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(s.take_stdout(), "");
        assert_eq!(s.take_stderr(), "oops\n");
        assert_eq!(s.take_stderr(), "");
    }

    #[tokio::test]
    async fn redundant_disable_keeps_original_pattern() {
        let s = launched(SimulatedProgram::new(SOURCE, 9)).await;
        let a = s.set_breakpoint(Breakpoint::new(SOURCE, 1)).await.unwrap();
        s.set_breakpoint(Breakpoint::new(SOURCE, 2)).await.unwrap();
        s.set_breakpoint(Breakpoint::new(SOURCE, 3)).await.unwrap();
        s.set_breakpoint_enabled(a, false).await.unwrap();
        let original = enabled_pattern(&s.breakpoints().await.unwrap());

        s.disable_breakpoints().await.unwrap();
        s.disable_breakpoints().await.unwrap();
        assert_eq!(
            enabled_pattern(&s.breakpoints().await.unwrap()),
            vec![false, false, false]
        );
        assert!(s.engine().installed_breakpoints(Path::new(SOURCE)).is_empty());

        s.enable_breakpoints().await.unwrap();
        assert_eq!(enabled_pattern(&s.breakpoints().await.unwrap()), original);
        assert_eq!(s.engine().installed_breakpoints(Path::new(SOURCE)).len(), 2);
    }

    #[tokio::test]
    async fn ignore_count_skips_hits() {
        let s = launched(SimulatedProgram::new(SOURCE, 6)).await;
        s.set_breakpoint(Breakpoint::new(SOURCE, 1).with_ignore_count(1))
            .await
            .unwrap();
        s.start().await.unwrap();
        // The only hit is skipped, so the program runs to completion.
        wait_for(&s, &Status::Exited).await;
    }

    #[tokio::test]
    async fn steps_report_plan_complete() {
        let s = launched(SimulatedProgram::new(SOURCE, 6)).await;
        s.step(StepKind::Over).await.unwrap();
        wait_for(&s, &Status::stopped([StopReason::PlanComplete])).await;
        s.step(StepKind::Out).await.unwrap();
        wait_for(&s, &Status::stopped([StopReason::PlanComplete])).await;
        let bt = s.selected_backtrace().await.unwrap();
        assert_eq!(bt.frames[0].location().map(|(_, line)| line), Some(6));
    }

    #[tokio::test]
    async fn pause_interrupts_a_running_debuggee() {
        let program = SimulatedProgram::new(SOURCE, 10_000).with_line_delay(Duration::from_millis(2));
        let s = launched(program).await;
        s.start().await.unwrap();
        assert_eq!(s.status(), Status::Running);
        s.pause().await.unwrap();
        wait_for(&s, &Status::stopped([StopReason::Signal])).await;
    }

    #[tokio::test]
    async fn thread_selection() {
        let s = launched(SimulatedProgram::new(SOURCE, 4)).await;
        let threads = s.threads().await.unwrap();
        assert_eq!(threads.len(), 2);
        assert!(threads[0].selected);

        assert!(s.select_thread(WORKER_THREAD).await.unwrap());
        assert_eq!(s.selected_thread().await.unwrap().id, WORKER_THREAD);
        assert!(!s.select_thread(ThreadId(12345)).await.unwrap());

        let all = s.backtraces().await.unwrap();
        assert_eq!(all[0].thread.id, WORKER_THREAD);
        assert!(all[0].thread.selected);
        assert_eq!(all[1].thread.id, MAIN_THREAD);
    }

    #[tokio::test]
    async fn failed_target_creation_is_reported() {
        let engine = SimulatedEngine::new(SimulatedProgram::new(SOURCE, 1)).failing_target();
        let s = BackendSession::new(engine);
        let err = s.prepare(LaunchRequest::new("/nope")).await.unwrap_err();
        assert!(matches!(err, BackendError::TargetCreation(_)));
        assert_eq!(s.status(), Status::Unknown);
        assert!(matches!(
            s.breakpoints().await.unwrap_err(),
            BackendError::NoTarget
        ));
    }

    #[tokio::test]
    async fn failed_launch_keeps_target() {
        let engine = SimulatedEngine::new(SimulatedProgram::new(SOURCE, 1)).failing_launch("bad cpu type");
        let s = BackendSession::new(engine);
        let err = s.prepare(LaunchRequest::new("/bin/demo")).await.unwrap_err();
        assert_eq!(err.to_string(), "could not launch target: bad cpu type");
        assert!(matches!(
            s.start().await.unwrap_err(),
            BackendError::NoProcess(_)
        ));
        assert!(s.breakpoints().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn breakpoints_survive_relaunch() {
        let s = launched(SimulatedProgram::new(SOURCE, 4)).await;
        s.set_breakpoint(Breakpoint::new(SOURCE, 2)).await.unwrap();
        s.prepare(LaunchRequest::new("/bin/demo")).await.unwrap();
        assert_eq!(s.breakpoints().await.unwrap().len(), 1);
        assert_eq!(s.engine().installed_breakpoints(Path::new(SOURCE)).len(), 1);
        assert_eq!(s.engine().launches().len(), 2);
    }

    #[tokio::test]
    async fn exit_shuts_down_server() {
        let server = RpcServer::bind("127.0.0.1:0").await.unwrap();
        let handle = server.shutdown_handle();
        let engine = SimulatedEngine::new(SimulatedProgram::new(SOURCE, 2));
        let s = BackendSession::with_exit_grace(engine, Duration::from_millis(20));
        s.attach_server(handle.clone());
        s.prepare(LaunchRequest::new("/bin/demo")).await.unwrap();
        wait_for(&s, &Status::stopped([StopReason::Signal])).await;

        s.start().await.unwrap();
        wait_for(&s, &Status::Exited).await;
        for _ in 0..100 {
            if handle.is_shutdown() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(handle.is_shutdown());
        assert!(s.engine().is_terminated());
    }

    #[tokio::test(start_paused = true)]
    async fn relaunch_during_exit_grace_keeps_serving() {
        let server = RpcServer::bind("127.0.0.1:0").await.unwrap();
        let handle = server.shutdown_handle();
        let engine = SimulatedEngine::new(SimulatedProgram::new(SOURCE, 2));
        let s = BackendSession::with_exit_grace(engine, Duration::from_secs(2));
        s.attach_server(handle.clone());
        s.prepare(LaunchRequest::new("/bin/demo")).await.unwrap();
        wait_for(&s, &Status::stopped([StopReason::Signal])).await;
        s.start().await.unwrap();
        wait_for(&s, &Status::Exited).await;

        s.prepare(LaunchRequest::new("/bin/demo")).await.unwrap();
        wait_for(&s, &Status::stopped([StopReason::Signal])).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(!handle.is_shutdown());
        assert!(!s.engine().is_terminated());
        assert_eq!(s.engine().launches().len(), 2);
        s.start().await.unwrap();
    }

    #[tokio::test]
    async fn stop_kills_and_exits() {
        let s = launched(SimulatedProgram::new(SOURCE, 4)).await;
        s.stop().await.unwrap();
        wait_for(&s, &Status::Exited).await;
        assert!(matches!(
            s.start().await.unwrap_err(),
            BackendError::NoProcess(_)
        ));
        // The target outlives the process.
        assert!(s.breakpoints().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn busy_session_refuses_commands() {
        let s = launched(SimulatedProgram::new(SOURCE, 4)).await;
        let guard = s.inner.state.lock().await;
        assert!(matches!(s.start().await.unwrap_err(), BackendError::Busy));
        // Status and output stay readable.
        assert!(s.status().is_stopped());
        drop(guard);
        s.start().await.unwrap();
    }

    #[tokio::test]
    async fn stdin_reaches_the_engine() {
        let s = launched(SimulatedProgram::new(SOURCE, 4)).await;
        s.push_stdin("42\n").await.unwrap();
        assert_eq!(s.engine().stdin(), "42\n");
    }
}
