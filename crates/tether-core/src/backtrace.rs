//! Thread, frame and variable snapshots.
//!
//! Frames come in two shapes. A symbolicated frame has debug info and
//! carries function, file, line, column and arguments; a bare frame only
//! knows its module, symbol and offset. On the wire the shapes are told
//! apart by which fields are present, so [`Frame`] is an untagged enum.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::status::StopReason;
use crate::wire::decimal_u64;

/// Variable name to rendered value.
pub type VariableMap = BTreeMap<String, String>;

/// Debugger thread id. Full 64-bit range, so wire-encoded as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(#[serde(with = "decimal_u64")] pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Summary of one debuggee thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    /// Debugger thread id.
    pub id: ThreadId,
    /// One-based display index.
    pub index: u32,
    /// Thread name, if the debuggee set one.
    pub name: Option<String>,
    /// Dispatch queue or affinity label.
    pub queue: Option<String>,
    /// Why this thread is stopped.
    pub stop_reason: StopReason,
    /// Number of frames on the thread's stack.
    pub num_frames: u32,
    /// Whether this is the debugger's selected thread.
    pub selected: bool,
}

/// A thread together with its frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadBacktrace {
    /// Thread summary.
    #[serde(flatten)]
    pub thread: ThreadInfo,
    /// Frames, innermost first.
    #[serde(rename = "bt")]
    pub frames: Vec<Frame>,
}

impl ThreadBacktrace {
    /// The innermost frame that has source information.
    pub fn top_symbolicated(&self) -> Option<(usize, &SymbolicatedFrame)> {
        self.frames.iter().enumerate().find_map(|(i, f)| match f {
            Frame::Symbolicated(s) if s.line != 0 => Some((i, s)),
            _ => None,
        })
    }
}

/// A frame with debug information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolicatedFrame {
    /// Program counter load address.
    #[serde(with = "decimal_u64")]
    pub address: u64,
    /// Module (shared object / executable) file name.
    pub module: Option<String>,
    /// Function name.
    pub function: String,
    /// Source file path.
    pub file: PathBuf,
    /// One-based source line, 0 when unknown.
    pub line: u32,
    /// One-based source column, 0 when unknown.
    pub column: u32,
    /// Whether the frame is an inlined call.
    pub inlined: bool,
    /// Argument name to rendered value.
    #[serde(default)]
    pub arguments: VariableMap,
}

impl SymbolicatedFrame {
    /// Zero-based editor row of the frame's line, if known.
    pub fn editor_row(&self) -> Option<u32> {
        self.line.checked_sub(1)
    }
}

/// A frame without debug information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BareFrame {
    /// Program counter load address.
    #[serde(with = "decimal_u64")]
    pub address: u64,
    /// Module (shared object / executable) file name.
    pub module: Option<String>,
    /// Nearest symbol name, if any.
    pub symbol: Option<String>,
    /// Byte offset from the symbol start.
    #[serde(with = "decimal_u64")]
    pub offset: u64,
}

/// One stack frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    /// Debug info resolved a function for the program counter.
    Symbolicated(SymbolicatedFrame),
    /// No function could be resolved.
    Bare(BareFrame),
}

impl Frame {
    /// Program counter load address.
    pub fn address(&self) -> u64 {
        match self {
            Self::Symbolicated(f) => f.address,
            Self::Bare(f) => f.address,
        }
    }

    /// Module file name.
    pub fn module(&self) -> Option<&str> {
        match self {
            Self::Symbolicated(f) => f.module.as_deref(),
            Self::Bare(f) => f.module.as_deref(),
        }
    }

    /// Source location, for symbolicated frames.
    pub fn location(&self) -> Option<(&Path, u32)> {
        match self {
            Self::Symbolicated(f) => Some((f.file.as_path(), f.line)),
            Self::Bare(_) => None,
        }
    }
}

/// Result of running a raw debugger console command.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Whether the command succeeded.
    pub succeeded: bool,
    /// Text the command wrote to its output stream.
    pub output: String,
    /// Text the command wrote to its error stream.
    pub error: String,
}
