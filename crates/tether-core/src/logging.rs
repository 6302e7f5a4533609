//! Log file placement and rotation.
//!
//! Subscriber installation happens in the binary; this module only decides
//! where the log goes and keeps it from growing without bound.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Rotate once the active log reaches this size (10 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated generations kept next to the active log.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

/// Fallback log path when no platform log directory is known.
pub fn default_log_file_path() -> PathBuf {
    std::env::temp_dir().join("tether").join("tether.log")
}

/// Size-based rotation policy: `tether.log` becomes `tether.log.1`, older
/// generations shift up by one, and generation `max_files` is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRotation {
    /// Size threshold in bytes.
    pub max_size: u64,
    /// Number of rotated generations to keep.
    pub max_files: u32,
}

impl Default for LogRotation {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_LOG_SIZE,
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

impl LogRotation {
    /// Rotate `log` if it has reached the size threshold.
    ///
    /// Returns whether a rotation took place.
    pub fn rotate(&self, log: &Path) -> io::Result<bool> {
        let len = match fs::metadata(log) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        if len < self.max_size {
            return Ok(false);
        }
        if self.max_files == 0 {
            fs::remove_file(log)?;
            return Ok(true);
        }

        let oldest = generation(log, self.max_files);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.max_files).rev() {
            let src = generation(log, n);
            if src.exists() {
                fs::rename(&src, generation(log, n + 1))?;
            }
        }
        fs::rename(log, generation(log, 1))?;
        Ok(true)
    }
}

/// Create the log's directory, rotate if needed, and open it for appending.
pub fn open_log_file(log: &Path, rotation: LogRotation) -> io::Result<File> {
    if let Some(dir) = log.parent() {
        fs::create_dir_all(dir)?;
    }
    rotation.rotate(log)?;
    OpenOptions::new().create(true).append(true).open(log)
}

/// Map a configured level name to an `EnvFilter` directive.
/// Unrecognised names fall back to `info`.
pub fn log_level_to_filter(level: &str) -> &'static str {
    const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
    LEVELS
        .into_iter()
        .find(|l| l.eq_ignore_ascii_case(level))
        .unwrap_or("info")
}

fn generation(log: &Path, n: u32) -> PathBuf {
    let mut name = log.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{n}"));
    log.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_path_names_the_tool() {
        let path = default_log_file_path();
        assert!(path.ends_with("tether/tether.log"), "{path:?}");
    }

    #[test]
    fn generation_appends_index() {
        assert_eq!(
            generation(Path::new("/var/log/tether.log"), 2),
            PathBuf::from("/var/log/tether.log.2")
        );
    }

    #[test]
    fn missing_or_small_log_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("tether.log");
        let rotation = LogRotation::default();
        assert!(!rotation.rotate(&log).unwrap());

        fs::write(&log, "short").unwrap();
        assert!(!rotation.rotate(&log).unwrap());
        assert!(log.exists());
    }

    #[test]
    fn oversized_log_shifts_generations_and_drops_the_oldest() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("tether.log");
        fs::write(generation(&log, 1), "gen1").unwrap();
        fs::write(generation(&log, 2), "gen2").unwrap();
        fs::write(&log, "x".repeat(64)).unwrap();

        let rotation = LogRotation {
            max_size: 32,
            max_files: 2,
        };
        assert!(rotation.rotate(&log).unwrap());

        assert!(!log.exists());
        assert_eq!(fs::read_to_string(generation(&log, 1)).unwrap().len(), 64);
        assert_eq!(fs::read_to_string(generation(&log, 2)).unwrap(), "gen1");
        assert!(!generation(&log, 3).exists());
    }

    #[test]
    fn open_creates_parent_directories_and_appends() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("a").join("b").join("tether.log");
        {
            use std::io::Write;
            let mut f = open_log_file(&log, LogRotation::default()).unwrap();
            writeln!(f, "one").unwrap();
        }
        {
            use std::io::Write;
            let mut f = open_log_file(&log, LogRotation::default()).unwrap();
            writeln!(f, "two").unwrap();
        }
        assert_eq!(fs::read_to_string(&log).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn level_names_are_case_insensitive_with_info_fallback() {
        assert_eq!(log_level_to_filter("DEBUG"), "debug");
        assert_eq!(log_level_to_filter("warn"), "warn");
        assert_eq!(log_level_to_filter("loud"), "info");
        assert_eq!(log_level_to_filter(""), "info");
    }
}
