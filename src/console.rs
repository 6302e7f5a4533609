//! Line-oriented debugger console.
//!
//! Reads one command per line from stdin and prints the session's status
//! and output feeds as they arrive.

use std::fmt::Write as _;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use anyhow::{Context, Result};
use tether_bridge::{
    perform, stop_debugger, BackendProxy, BreakpointSync, Launcher, OutputCallback,
    SessionAction, SessionRegistry, StatusCallback, Toggled, TomlBreakpointStore,
};
use tether_config::Config;
use tether_core::{Frame, SessionKey, Status, ThreadBacktrace, ThreadId, ThreadInfo, VariableMap};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const HELP: &str = "\
commands:
  c               continue
  p               pause
  s / n / o       step into / over / out
  k               kill the debuggee
  b <file>:<line> toggle a breakpoint
  e <file>:<line> enable or disable a breakpoint
  bt              backtrace of every thread
  threads         list threads
  t <id>          select a thread
  x <command>     run a debugger command
  q               shut down and quit";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Action(SessionAction),
    /// Breakpoint at a zero-based row.
    ToggleBreakpoint(PathBuf, u32),
    ToggleEnabled(PathBuf, u32),
    Backtrace,
    Threads,
    SelectThread(ThreadId),
    Execute(String),
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
///
/// Breakpoint locations use one-based line numbers; relative files are
/// resolved against `project`.
pub fn parse_command(line: &str, project: &Path) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let command = match word {
        "c" => ConsoleCommand::Action(SessionAction::Continue),
        "p" => ConsoleCommand::Action(SessionAction::Pause),
        "s" => ConsoleCommand::Action(SessionAction::StepInto),
        "n" => ConsoleCommand::Action(SessionAction::StepOver),
        "o" => ConsoleCommand::Action(SessionAction::StepOut),
        "k" => ConsoleCommand::Action(SessionAction::Stop),
        "b" => {
            let (file, row) = parse_location(rest, project)?;
            ConsoleCommand::ToggleBreakpoint(file, row)
        }
        "e" => {
            let (file, row) = parse_location(rest, project)?;
            ConsoleCommand::ToggleEnabled(file, row)
        }
        "bt" => ConsoleCommand::Backtrace,
        "threads" => ConsoleCommand::Threads,
        "t" => {
            let id = rest
                .parse::<u64>()
                .map_err(|_| format!("not a thread id: {rest:?}"))?;
            ConsoleCommand::SelectThread(ThreadId(id))
        }
        "x" if !rest.is_empty() => ConsoleCommand::Execute(rest.to_string()),
        "x" => return Err("usage: x <command>".into()),
        "h" | "help" | "?" => ConsoleCommand::Help,
        "q" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command {other:?}, try 'help'")),
    };
    Ok(Some(command))
}

fn parse_location(text: &str, project: &Path) -> Result<(PathBuf, u32), String> {
    let usage = || format!("expected <file>:<line>, got {text:?}");
    let (file, line) = text.rsplit_once(':').ok_or_else(usage)?;
    let line: u32 = line.parse().map_err(|_| usage())?;
    if file.is_empty() || line == 0 {
        return Err(usage());
    }
    let file = Path::new(file);
    let file = if file.is_absolute() {
        file.to_path_buf()
    } else {
        project.join(file)
    };
    Ok((file, line - 1))
}

pub fn format_frame(index: usize, frame: &Frame) -> String {
    let module = frame.module().unwrap_or("?");
    match frame {
        Frame::Symbolicated(f) => {
            let mut out = format!(
                "#{index} {module} 0x{:x} {}:{}",
                f.address,
                f.file.display(),
                f.line
            );
            if f.column != 0 {
                let _ = write!(out, ":{}", f.column);
            }
            let _ = write!(out, " ({}", f.function);
            if f.inlined {
                out.push_str(" inlined");
            }
            out.push(')');
            out
        }
        Frame::Bare(f) => format!(
            "#{index} {module} 0x{:x} {} + {}",
            f.address,
            f.symbol.as_deref().unwrap_or("??"),
            f.offset
        ),
    }
}

pub fn format_thread(thread: &ThreadInfo) -> String {
    let marker = if thread.selected { '*' } else { ' ' };
    let mut out = format!("{marker} thread #{} id={}", thread.index, thread.id);
    if let Some(name) = &thread.name {
        let _ = write!(out, " name={name}");
    }
    if let Some(queue) = &thread.queue {
        let _ = write!(out, " queue={queue}");
    }
    let _ = write!(out, " stop_reason={}", thread.stop_reason);
    out
}

/// Threads with their frames, then the locals of the first thread's top
/// frame with source information.
pub fn format_stop(traces: &[ThreadBacktrace], locals: Option<&VariableMap>) -> String {
    let mut out = String::new();
    for trace in traces {
        let _ = writeln!(out, "{}", format_thread(&trace.thread));
        for (i, frame) in trace.frames.iter().enumerate() {
            let _ = writeln!(out, "  {}", format_frame(i, frame));
        }
    }
    if let Some(locals) = locals.filter(|l| !l.is_empty()) {
        out.push_str("locals:\n");
        for (name, value) in locals {
            let _ = writeln!(out, "  {name} = {value}");
        }
    }
    out
}

fn print(text: &str) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()
}

async fn print_stop(proxy: &BackendProxy) -> Result<()> {
    let traces = proxy.backtrace().await?;
    let locals = match traces.first() {
        Some(trace) => match trace.top_symbolicated() {
            Some((index, _)) => {
                let frame = u32::try_from(index).unwrap_or(u32::MAX);
                Some(proxy.local_variables(trace.thread.id, frame).await?)
            }
            None => None,
        },
        None => None,
    };
    print(&format_stop(&traces, locals.as_ref()))?;
    Ok(())
}

fn status_printer(registry: Weak<SessionRegistry>) -> StatusCallback {
    Arc::new(move |key: &SessionKey, status: &Status| -> anyhow::Result<()> {
        print(&format!("status: {status}"))?;
        if !status.is_stopped() {
            return Ok(());
        }
        let Some(proxy) = registry.upgrade().and_then(|r| r.handle(key)) else {
            return Ok(());
        };
        tokio::spawn(async move {
            if let Err(err) = print_stop(&proxy).await {
                warn!("could not show stop location: {err:#}");
            }
        });
        Ok(())
    })
}

fn output_printer() -> OutputCallback {
    Arc::new(|_: &SessionKey, text: &str| -> anyhow::Result<()> {
        let mut stdout = io::stdout().lock();
        for line in text.lines() {
            writeln!(stdout, "STDOUT: {line}")?;
        }
        stdout.flush()?;
        Ok(())
    })
}

struct Console {
    key: SessionKey,
    registry: Arc<SessionRegistry>,
    sync: Arc<BreakpointSync>,
}

impl Console {
    fn proxy(&self) -> Result<Arc<BackendProxy>> {
        self.registry
            .handle(&self.key)
            .with_context(|| format!("no debug session for {}", self.key))
    }

    /// Run one command. Returns `false` once the console should exit.
    async fn run_command(&self, command: ConsoleCommand) -> Result<bool> {
        match command {
            ConsoleCommand::Action(action) => {
                perform(&self.registry, &self.key, action).await?;
            }
            ConsoleCommand::ToggleBreakpoint(file, row) => {
                let outcome = self.sync.toggle_breakpoint(&self.key, &file, row).await?;
                let verb = match outcome {
                    Toggled::Added => "added",
                    Toggled::Removed => "removed",
                };
                print(&format!("breakpoint {verb} at {}:{}", file.display(), row + 1))?;
            }
            ConsoleCommand::ToggleEnabled(file, row) => {
                let location = format!("{}:{}", file.display(), row + 1);
                match self.sync.toggle_enabled(&self.key, &file, row).await? {
                    Some(true) => print(&format!("breakpoint enabled at {location}"))?,
                    Some(false) => print(&format!("breakpoint disabled at {location}"))?,
                    None => print(&format!("no breakpoint at {location}"))?,
                }
            }
            ConsoleCommand::Backtrace => print_stop(&*self.proxy()?).await?,
            ConsoleCommand::Threads => {
                let threads = self.proxy()?.threads().await?;
                let listing: Vec<String> = threads.iter().map(format_thread).collect();
                print(&listing.join("\n"))?;
            }
            ConsoleCommand::SelectThread(id) => {
                if self.proxy()?.select_thread(id).await? {
                    print(&format!("selected thread {id}"))?;
                } else {
                    print(&format!("no thread {id}"))?;
                }
            }
            ConsoleCommand::Execute(command) => {
                let result = self.proxy()?.execute(&command).await?;
                if !result.output.is_empty() {
                    print(&result.output)?;
                }
                if !result.error.is_empty() {
                    print(&format!("error: {}", result.error))?;
                }
            }
            ConsoleCommand::Help => print(HELP)?,
            ConsoleCommand::Quit => {
                stop_debugger(&self.registry, &self.key).await?;
                self.registry.teardown(&self.key).await;
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Launch a session for `project` and drive it from stdin until `q` or
/// end of input.
pub async fn run(config: Config, project: PathBuf) -> Result<()> {
    let key = SessionKey::new(project.to_string_lossy());
    let registry: Arc<SessionRegistry> = Arc::new(SessionRegistry::new());
    let store = Arc::new(TomlBreakpointStore::for_project(&project));
    let sync = Arc::new(BreakpointSync::new(registry.clone(), store));
    let auto_show = config.console.auto_show;

    let launcher = Launcher::new(registry.clone(), sync.clone(), config)
        .with_status_subscriber(status_printer(Arc::downgrade(&registry)))
        .with_output_subscriber(output_printer());
    launcher
        .launch(key.clone(), &project)
        .await
        .context("could not start debug session")?;
    info!(%key, "console attached");
    if auto_show {
        print(HELP)?;
    }

    let console = Console {
        key,
        registry,
        sync,
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line, &project) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                print(&message)?;
                continue;
            }
        };
        match console.run_command(command).await {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(err) => print(&format!("error: {err:#}"))?,
        }
    }

    stop_debugger(&console.registry, &console.key).await?;
    console.registry.teardown(&console.key).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tether_core::{BareFrame, StopReason, SymbolicatedFrame};

    use super::*;

    fn symbolicated(inlined: bool, column: u32) -> Frame {
        Frame::Symbolicated(SymbolicatedFrame {
            address: 0x1000,
            module: Some("demo".into()),
            function: "main".into(),
            file: PathBuf::from("/src/main.c"),
            line: 12,
            column,
            inlined,
            arguments: VariableMap::new(),
        })
    }

    #[test]
    fn parses_actions_and_locations() {
        let project = Path::new("/proj");
        assert_eq!(
            parse_command("n", project).unwrap(),
            Some(ConsoleCommand::Action(SessionAction::StepOver))
        );
        assert_eq!(
            parse_command("  b src/main.c:10 ", project).unwrap(),
            Some(ConsoleCommand::ToggleBreakpoint(
                PathBuf::from("/proj/src/main.c"),
                9
            ))
        );
        assert_eq!(
            parse_command("e /abs/a.c:1", project).unwrap(),
            Some(ConsoleCommand::ToggleEnabled(PathBuf::from("/abs/a.c"), 0))
        );
        assert_eq!(
            parse_command("x register read pc", project).unwrap(),
            Some(ConsoleCommand::Execute("register read pc".into()))
        );
        assert_eq!(
            parse_command("t 9007199254740993", project).unwrap(),
            Some(ConsoleCommand::SelectThread(ThreadId(9_007_199_254_740_993)))
        );
        assert_eq!(parse_command("   ", project).unwrap(), None);
    }

    #[test]
    fn rejects_malformed_lines() {
        let project = Path::new("/proj");
        assert!(parse_command("b main.c", project).is_err());
        assert!(parse_command("b main.c:0", project).is_err());
        assert!(parse_command("b :4", project).is_err());
        assert!(parse_command("t main", project).is_err());
        assert!(parse_command("x", project).is_err());
        assert!(parse_command("jump", project).is_err());
    }

    #[test]
    fn frames_render_by_shape() {
        assert_eq!(
            format_frame(0, &symbolicated(false, 5)),
            "#0 demo 0x1000 /src/main.c:12:5 (main)"
        );
        assert_eq!(
            format_frame(1, &symbolicated(true, 0)),
            "#1 demo 0x1000 /src/main.c:12 (main inlined)"
        );
        let bare = Frame::Bare(BareFrame {
            address: u64::MAX,
            module: None,
            symbol: None,
            offset: 8,
        });
        assert_eq!(format_frame(2, &bare), "#2 ? 0xffffffffffffffff ?? + 8");
    }

    #[test]
    fn stop_report_lists_threads_then_sorted_locals() {
        let trace = ThreadBacktrace {
            thread: ThreadInfo {
                id: ThreadId(1),
                index: 1,
                name: Some("main".into()),
                queue: None,
                stop_reason: StopReason::Breakpoint,
                num_frames: 1,
                selected: true,
            },
            frames: vec![symbolicated(false, 0)],
        };
        let locals = VariableMap::from([
            ("z".to_string(), "3".to_string()),
            ("a".to_string(), "1".to_string()),
        ]);
        let text = format_stop(&[trace], Some(&locals));
        assert_eq!(
            text,
            "* thread #1 id=1 name=main stop_reason=breakpoint\n\
             \x20 #0 demo 0x1000 /src/main.c:12 (main)\n\
             locals:\n\
             \x20 a = 1\n\
             \x20 z = 3\n"
        );
    }
}
