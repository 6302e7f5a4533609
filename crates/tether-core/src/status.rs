//! Debuggee execution status.
//!
//! On the wire a status is a plain string: `running`, `exited`,
//! `stopped,breakpoint,signal`, ... The stopped form carries the set of
//! stop reasons observed across all threads, comma-joined.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Why a thread stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A breakpoint was hit.
    Breakpoint,
    /// A watchpoint fired.
    Watchpoint,
    /// The thread received a signal (also used for interrupts and entry stops).
    Signal,
    /// An exception was raised.
    Exception,
    /// Single-instruction trace stop.
    Trace,
    /// The process called exec.
    Exec,
    /// A step plan completed.
    PlanComplete,
    /// The thread is exiting.
    ThreadExit,
    /// An instrumentation runtime stopped the thread.
    Instrumentation,
    /// The thread did not stop for a reason of its own.
    None,
    /// The debugger could not determine a reason.
    Invalid,
}

impl StopReason {
    /// Wire name of the reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakpoint => "breakpoint",
            Self::Watchpoint => "watchpoint",
            Self::Signal => "signal",
            Self::Exception => "exception",
            Self::Trace => "trace",
            Self::Exec => "exec",
            Self::PlanComplete => "plan_complete",
            Self::ThreadExit => "thread_exit",
            Self::Instrumentation => "instrumentation",
            Self::None => "none",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StopReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "breakpoint" => Self::Breakpoint,
            "watchpoint" => Self::Watchpoint,
            "signal" => Self::Signal,
            "exception" => Self::Exception,
            "trace" => Self::Trace,
            "exec" => Self::Exec,
            "plan_complete" => Self::PlanComplete,
            "thread_exit" => Self::ThreadExit,
            "instrumentation" => Self::Instrumentation,
            "none" => Self::None,
            "invalid" => Self::Invalid,
            other => return Err(CoreError::UnknownStopReason(other.to_string())),
        })
    }
}

/// Execution state of the debuggee as observed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Status {
    /// Nothing observed yet.
    #[default]
    Unknown,
    /// The debuggee is being launched.
    Launching,
    /// The debuggee is running.
    Running,
    /// A step is in progress.
    Stepping,
    /// The debuggee is stopped; the set holds every thread's stop reason.
    Stopped(BTreeSet<StopReason>),
    /// The debuggee crashed.
    Crashed,
    /// The debuggee exited.
    Exited,
    /// The debugger detached from the debuggee.
    Detached,
    /// The debuggee is suspended.
    Suspended,
    /// Connected to a remote target but no process yet.
    Connected,
    /// Attaching to an existing process.
    Attaching,
    /// The process image is unloaded.
    Unloaded,
    /// The debugger reports an invalid state.
    Invalid,
    /// The backend process could not be reached. Only ever synthesized
    /// client-side; the backend never reports it.
    BackendUnreachable,
}

impl Status {
    /// Build a stopped status from a collection of reasons.
    pub fn stopped(reasons: impl IntoIterator<Item = StopReason>) -> Self {
        Self::Stopped(reasons.into_iter().collect())
    }

    /// Whether the debuggee is stopped for any reason.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }

    /// Stop reasons, empty unless stopped.
    pub fn stop_reasons(&self) -> impl Iterator<Item = StopReason> + '_ {
        let reasons = match self {
            Self::Stopped(set) => Some(set.iter().copied()),
            _ => None,
        };
        reasons.into_iter().flatten()
    }

    /// Whether the status says the debuggee stopped for `reason`.
    pub fn stopped_for(&self, reason: StopReason) -> bool {
        matches!(self, Self::Stopped(set) if set.contains(&reason))
    }

    /// The first stop a freshly launched debuggee reaches: an entry
    /// signal or a breakpoint.
    pub fn is_initial_stop(&self) -> bool {
        self.stopped_for(StopReason::Signal) || self.stopped_for(StopReason::Breakpoint)
    }

    /// States after which the session cannot make further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Exited | Self::Crashed | Self::Detached | Self::BackendUnreachable
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Launching => "launching",
            Self::Running => "running",
            Self::Stepping => "stepping",
            Self::Stopped(reasons) => {
                f.write_str("stopped")?;
                for reason in reasons {
                    write!(f, ",{reason}")?;
                }
                return Ok(());
            }
            Self::Crashed => "crashed",
            Self::Exited => "exited",
            Self::Detached => "detached",
            Self::Suspended => "suspended",
            Self::Connected => "connected",
            Self::Attaching => "attaching",
            Self::Unloaded => "unloaded",
            Self::Invalid => "invalid",
            Self::BackendUnreachable => "backend unreachable",
        };
        f.write_str(name)
    }
}

impl FromStr for Status {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("stopped") {
            if !rest.is_empty() && !rest.starts_with(',') {
                return Err(CoreError::UnknownStatus(s.to_string()));
            }
            let reasons = rest
                .split(',')
                .filter(|part| !part.is_empty())
                .map(StopReason::from_str)
                .collect::<Result<BTreeSet<_>, _>>()?;
            return Ok(Self::Stopped(reasons));
        }
        Ok(match s {
            "unknown" => Self::Unknown,
            "launching" => Self::Launching,
            "running" => Self::Running,
            "stepping" => Self::Stepping,
            "crashed" => Self::Crashed,
            "exited" => Self::Exited,
            "detached" => Self::Detached,
            "suspended" => Self::Suspended,
            "connected" => Self::Connected,
            "attaching" => Self::Attaching,
            "unloaded" => Self::Unloaded,
            "invalid" => Self::Invalid,
            "backend unreachable" => Self::BackendUnreachable,
            other => return Err(CoreError::UnknownStatus(other.to_string())),
        })
    }
}

impl TryFrom<String> for Status {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        status.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_status_joins_reasons_in_canonical_order() {
        let status = Status::stopped([StopReason::Signal, StopReason::Breakpoint]);
        assert_eq!(status.to_string(), "stopped,breakpoint,signal");
    }

    #[test]
    fn stopped_without_reasons_is_bare_word() {
        assert_eq!(Status::stopped([]).to_string(), "stopped");
        assert_eq!("stopped".parse::<Status>().unwrap(), Status::stopped([]));
        // A trailing comma from a thread-less stop still parses.
        assert_eq!("stopped,".parse::<Status>().unwrap(), Status::stopped([]));
    }

    #[test]
    fn parse_stopped_with_duplicate_reasons_collapses_them() {
        let status: Status = "stopped,none,breakpoint,none".parse().unwrap();
        assert_eq!(
            status,
            Status::stopped([StopReason::Breakpoint, StopReason::None])
        );
    }

    #[test]
    fn every_plain_state_survives_display_and_parse() {
        let all = [
            Status::Unknown,
            Status::Launching,
            Status::Running,
            Status::Stepping,
            Status::Crashed,
            Status::Exited,
            Status::Detached,
            Status::Suspended,
            Status::Connected,
            Status::Attaching,
            Status::Unloaded,
            Status::Invalid,
            Status::BackendUnreachable,
        ];
        for status in all {
            let text = status.to_string();
            assert_eq!(text.parse::<Status>().unwrap(), status, "{text}");
        }
    }

    #[test]
    fn unknown_words_are_rejected() {
        assert!(matches!(
            "paused".parse::<Status>(),
            Err(CoreError::UnknownStatus(_))
        ));
        assert!(matches!(
            "stopped,teleported".parse::<Status>(),
            Err(CoreError::UnknownStopReason(_))
        ));
        assert!(matches!(
            "stoppedx".parse::<Status>(),
            Err(CoreError::UnknownStatus(_))
        ));
    }

    #[test]
    fn status_serializes_as_plain_string() {
        let status = Status::stopped([StopReason::PlanComplete]);
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"stopped,plan_complete\"");
        let back: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn initial_stop_accepts_signal_or_breakpoint() {
        assert!(Status::stopped([StopReason::Signal]).is_initial_stop());
        assert!(Status::stopped([StopReason::Breakpoint, StopReason::None]).is_initial_stop());
        assert!(!Status::stopped([StopReason::Trace]).is_initial_stop());
        assert!(!Status::Running.is_initial_stop());
    }

    #[test]
    fn terminal_states() {
        assert!(Status::Exited.is_terminal());
        assert!(Status::BackendUnreachable.is_terminal());
        assert!(!Status::Running.is_terminal());
        assert!(!Status::stopped([StopReason::Signal]).is_terminal());
    }

    #[test]
    fn stop_reasons_empty_when_running() {
        assert_eq!(Status::Running.stop_reasons().count(), 0);
        let stopped = Status::stopped([StopReason::Exception]);
        assert_eq!(
            stopped.stop_reasons().collect::<Vec<_>>(),
            vec![StopReason::Exception]
        );
    }
}
