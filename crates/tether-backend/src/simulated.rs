//! A deterministic scripted debuggee for tests.
//!
//! The program is a single source file whose rows execute in order, one
//! per `line_delay`. Rows may write to stdout. The main thread stops at
//! entry, at enabled breakpoints once their ignore count is used up, and
//! after steps; it exits after the last row. A second, idle worker thread
//! only has a bare frame.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tether_core::{
    BareFrame, Breakpoint, CommandOutput, Frame, LaunchRequest, Status, StopReason,
    SymbolicatedFrame, ThreadId, ThreadInfo, VariableMap,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::{
    DebugEngine, EngineEvents, OutputChunk, OutputStream, StateChange, StepKind, VariableScope,
};
use crate::error::BackendError;

/// Id of the simulated main thread. Above 2^53 on purpose.
pub const MAIN_THREAD: ThreadId = ThreadId(0x0020_0000_0000_0001);
/// Id of the simulated worker thread.
pub const WORKER_THREAD: ThreadId = ThreadId(7);

/// Load address of the main function.
const MAIN_ADDRESS: u64 = 0xffff_ffff_0000_1000;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The script a [`SimulatedEngine`] runs.
#[derive(Debug, Clone)]
pub struct SimulatedProgram {
    /// Source file of `main`.
    pub source: PathBuf,
    /// Number of rows executed before exit.
    pub lines: u32,
    /// Text written to stdout when a row executes.
    pub output: BTreeMap<u32, String>,
    /// Time spent on each row.
    pub line_delay: Duration,
}

impl SimulatedProgram {
    /// A program running rows `0..lines` of `source`.
    pub fn new(source: impl Into<PathBuf>, lines: u32) -> Self {
        Self {
            source: source.into(),
            lines,
            output: BTreeMap::new(),
            line_delay: Duration::from_millis(1),
        }
    }

    /// Write `text` to stdout when `row` executes.
    pub fn with_output(mut self, row: u32, text: impl Into<String>) -> Self {
        self.output.insert(row, text.into());
        self
    }

    /// Time spent on each row.
    pub fn with_line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = delay;
        self
    }
}

#[derive(Default)]
struct Sim {
    launched: bool,
    exited: bool,
    running: bool,
    interrupt: bool,
    /// Last executed row; `None` while at the entry point.
    pc: Option<u32>,
    stop_reason: Option<StopReason>,
    breakpoints: HashMap<PathBuf, Vec<Breakpoint>>,
    hits: HashMap<(PathBuf, u32), u32>,
    state_tx: Option<mpsc::UnboundedSender<StateChange>>,
    output_tx: Option<mpsc::UnboundedSender<OutputChunk>>,
    task: Option<JoinHandle<()>>,
    stdin: String,
    launches: Vec<LaunchRequest>,
    terminated: bool,
}

impl Sim {
    fn alive(&self, action: &'static str) -> Result<(), BackendError> {
        if self.launched && !self.exited {
            Ok(())
        } else {
            Err(BackendError::NoProcess(action))
        }
    }

    fn emit(&self, status: Status, thread: Option<ThreadId>) {
        if let Some(tx) = &self.state_tx {
            let _ = tx.send(StateChange { status, thread });
        }
    }

    fn stop(&mut self, reason: StopReason) {
        self.running = false;
        self.stop_reason = Some(reason);
        self.emit(Status::stopped([reason]), Some(MAIN_THREAD));
    }

    fn exit(&mut self) {
        self.running = false;
        self.exited = true;
        self.stop_reason = None;
        self.emit(Status::Exited, None);
        self.state_tx = None;
        self.output_tx = None;
    }

    fn should_break(&mut self, file: &Path, row: u32) -> bool {
        let Some(bp) = self
            .breakpoints
            .get(file)
            .and_then(|bps| bps.iter().find(|bp| bp.line == row))
            .cloned()
        else {
            return false;
        };
        if bp.condition.as_deref() == Some("false") {
            return false;
        }
        let hits = self.hits.entry((file.to_path_buf(), row)).or_insert(0);
        *hits += 1;
        *hits > bp.ignore_count
    }
}

/// A scripted [`DebugEngine`].
pub struct SimulatedEngine {
    program: SimulatedProgram,
    sim: Arc<Mutex<Sim>>,
    fail_target: bool,
    fail_launch: Option<String>,
}

impl SimulatedEngine {
    /// An engine that runs `program`.
    pub fn new(program: SimulatedProgram) -> Self {
        Self {
            program,
            sim: Arc::new(Mutex::new(Sim::default())),
            fail_target: false,
            fail_launch: None,
        }
    }

    /// Make every launch fail at target creation.
    pub fn failing_target(mut self) -> Self {
        self.fail_target = true;
        self
    }

    /// Make every launch fail with `message`.
    pub fn failing_launch(mut self, message: impl Into<String>) -> Self {
        self.fail_launch = Some(message.into());
        self
    }

    /// Everything written to stdin so far.
    pub fn stdin(&self) -> String {
        lock(&self.sim).stdin.clone()
    }

    /// Breakpoints the engine currently holds for `file`.
    pub fn installed_breakpoints(&self, file: &Path) -> Vec<Breakpoint> {
        lock(&self.sim)
            .breakpoints
            .get(file)
            .cloned()
            .unwrap_or_default()
    }

    /// Launch requests received, in order.
    pub fn launches(&self) -> Vec<LaunchRequest> {
        lock(&self.sim).launches.clone()
    }

    /// Whether [`DebugEngine::terminate`] has run.
    pub fn is_terminated(&self) -> bool {
        lock(&self.sim).terminated
    }

    /// Write `text` to a debuggee stream as if the program had.
    pub fn emit_output(&self, stream: OutputStream, text: impl Into<String>) {
        if let Some(tx) = &lock(&self.sim).output_tx {
            let _ = tx.send(OutputChunk {
                stream,
                text: text.into(),
            });
        }
    }

    fn run(&self, until: Option<u32>) {
        let mut sim = lock(&self.sim);
        if let Some(task) = sim.task.take() {
            task.abort();
        }
        sim.running = true;
        sim.interrupt = false;
        let shared = self.sim.clone();
        let program = self.program.clone();
        sim.task = Some(tokio::spawn(run_program(shared, program, until)));
    }
}

async fn run_program(sim: Arc<Mutex<Sim>>, program: SimulatedProgram, until: Option<u32>) {
    loop {
        tokio::time::sleep(program.line_delay).await;
        let mut sim = lock(&sim);
        if sim.interrupt {
            sim.interrupt = false;
            sim.stop(StopReason::Signal);
            return;
        }
        let row = sim.pc.map_or(0, |pc| pc + 1);
        if row >= program.lines {
            sim.exit();
            return;
        }
        sim.pc = Some(row);
        if let (Some(text), Some(tx)) = (program.output.get(&row), &sim.output_tx) {
            let _ = tx.send(OutputChunk {
                stream: OutputStream::Stdout,
                text: text.clone(),
            });
        }
        if sim.should_break(&program.source, row) {
            sim.stop(StopReason::Breakpoint);
            return;
        }
        if until == Some(row) {
            sim.stop(StopReason::PlanComplete);
            return;
        }
    }
}

impl DebugEngine for SimulatedEngine {
    async fn launch(&self, request: &LaunchRequest) -> Result<EngineEvents, BackendError> {
        if self.fail_target {
            return Err(BackendError::TargetCreation(format!(
                "'{}' is not a valid executable",
                request.executable.display()
            )));
        }
        if let Some(message) = &self.fail_launch {
            return Err(BackendError::Launch(message.clone()));
        }

        let (state_tx, state) = mpsc::unbounded_channel();
        let (output_tx, output) = mpsc::unbounded_channel();
        let mut sim = lock(&self.sim);
        if let Some(task) = sim.task.take() {
            task.abort();
        }
        sim.launches.push(request.clone());
        sim.launched = true;
        sim.exited = false;
        sim.running = false;
        sim.pc = None;
        sim.hits.clear();
        sim.state_tx = Some(state_tx);
        sim.output_tx = Some(output_tx);
        sim.stop(StopReason::Signal);
        Ok(EngineEvents { state, output })
    }

    async fn resume(&self) -> Result<(), BackendError> {
        {
            let sim = lock(&self.sim);
            sim.alive("run")?;
            if sim.running {
                return Ok(());
            }
        }
        self.run(None);
        Ok(())
    }

    async fn pause(&self, _thread: Option<ThreadId>) -> Result<(), BackendError> {
        let mut sim = lock(&self.sim);
        sim.alive("pause")?;
        if sim.running {
            sim.interrupt = true;
        } else {
            sim.stop(StopReason::Signal);
        }
        Ok(())
    }

    async fn step(&self, thread: ThreadId, kind: StepKind) -> Result<(), BackendError> {
        let until = {
            let sim = lock(&self.sim);
            sim.alive("step")?;
            if thread != MAIN_THREAD {
                return Err(BackendError::Engine(format!("thread {thread} cannot step")));
            }
            match kind {
                StepKind::Into | StepKind::Over => sim.pc.map_or(0, |pc| pc + 1),
                StepKind::Out => self.program.lines.saturating_sub(1),
            }
        };
        self.run(Some(until));
        Ok(())
    }

    async fn kill(&self) -> Result<(), BackendError> {
        let mut sim = lock(&self.sim);
        if sim.alive("kill").is_err() {
            return Ok(());
        }
        if let Some(task) = sim.task.take() {
            task.abort();
        }
        sim.exit();
        Ok(())
    }

    async fn write_stdin(&self, data: &str) -> Result<(), BackendError> {
        let mut sim = lock(&self.sim);
        sim.alive("send data to")?;
        sim.stdin.push_str(data);
        Ok(())
    }

    async fn set_file_breakpoints(
        &self,
        file: &Path,
        breakpoints: &[Breakpoint],
    ) -> Result<(), BackendError> {
        let mut sim = lock(&self.sim);
        if breakpoints.is_empty() {
            sim.breakpoints.remove(file);
        } else {
            sim.breakpoints
                .insert(file.to_path_buf(), breakpoints.to_vec());
        }
        Ok(())
    }

    async fn threads(&self) -> Result<Vec<ThreadInfo>, BackendError> {
        let sim = lock(&self.sim);
        sim.alive("query")?;
        let main_frames = if sim.pc.is_some() { 2 } else { 1 };
        Ok(vec![
            ThreadInfo {
                id: MAIN_THREAD,
                index: 1,
                name: Some("main".into()),
                queue: Some("com.tether.main-thread".into()),
                stop_reason: sim.stop_reason.unwrap_or(StopReason::None),
                num_frames: main_frames,
                selected: false,
            },
            ThreadInfo {
                id: WORKER_THREAD,
                index: 2,
                name: Some("worker".into()),
                queue: None,
                stop_reason: StopReason::None,
                num_frames: 1,
                selected: false,
            },
        ])
    }

    async fn backtrace(&self, thread: ThreadId) -> Result<Vec<Frame>, BackendError> {
        let sim = lock(&self.sim);
        sim.alive("get traces of")?;
        match thread {
            MAIN_THREAD => {
                let start = Frame::Bare(BareFrame {
                    address: u64::MAX - 0x0fff,
                    module: Some("libc.so.6".into()),
                    symbol: Some("__libc_start_main".into()),
                    offset: 243,
                });
                let Some(row) = sim.pc else {
                    return Ok(vec![start]);
                };
                let main = Frame::Symbolicated(SymbolicatedFrame {
                    address: MAIN_ADDRESS + u64::from(row) * 4,
                    module: Some("demo".into()),
                    function: "main".into(),
                    file: self.program.source.clone(),
                    line: row + 1,
                    column: 5,
                    inlined: false,
                    arguments: VariableMap::from([("argc".to_string(), "1".to_string())]),
                });
                Ok(vec![main, start])
            }
            WORKER_THREAD => Ok(vec![Frame::Bare(BareFrame {
                address: 0x7fff_0000_1000,
                module: Some("libc.so.6".into()),
                symbol: Some("__futex_wait".into()),
                offset: 42,
            })]),
            other => Err(BackendError::Engine(format!("no thread {other}"))),
        }
    }

    async fn variables(
        &self,
        thread: ThreadId,
        frame: u32,
        scope: VariableScope,
    ) -> Result<VariableMap, BackendError> {
        let sim = lock(&self.sim);
        sim.alive("query")?;
        let Some(row) = sim.pc.filter(|_| thread == MAIN_THREAD && frame == 0) else {
            return Ok(VariableMap::new());
        };
        let arguments = [("argc".to_string(), "1".to_string())];
        let locals = [("line".to_string(), (row + 1).to_string())];
        Ok(match scope {
            VariableScope::Arguments => arguments.into_iter().collect(),
            VariableScope::Locals => locals.into_iter().collect(),
            VariableScope::All => arguments.into_iter().chain(locals).collect(),
        })
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, BackendError> {
        if let Some(text) = command.strip_prefix("echo ") {
            return Ok(CommandOutput {
                succeeded: true,
                output: format!("{text}\n"),
                error: String::new(),
            });
        }
        let word = command.split_whitespace().next().unwrap_or_default();
        Ok(CommandOutput {
            succeeded: false,
            output: String::new(),
            error: format!("error: '{word}' is not a valid command.\n"),
        })
    }

    async fn terminate(&self) {
        let mut sim = lock(&self.sim);
        if let Some(task) = sim.task.take() {
            task.abort();
        }
        sim.state_tx = None;
        sim.output_tx = None;
        sim.terminated = true;
    }
}
