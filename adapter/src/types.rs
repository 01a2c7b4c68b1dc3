//! Public types consumed by editor integrations.
//!
//! These types define the interface between `cmbridge-adapter` and its host.
//! The host constructs [`CompilerConfig`], receives [`AdapterEvent`]s, and reads
//! [`DiagnosticsSnapshot`]s.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use cmbridge_types::CmDiagnostic;

use crate::error::AdapterError;

const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_WATCH_TIMEOUT_MS: u64 = 2_000;

/// Configuration for the cm compiler subprocess.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Compiler executable, resolved through `PATH`.
    pub program: String,
    /// Extra arguments for the compiler executable.
    pub args: Vec<String>,
    /// cm installation root. Working directory of the subprocess.
    pub cm_root: PathBuf,
    /// Project root holding the `custom` template tree. Defaults to `cm_root`.
    pub cm_path: Option<PathBuf>,
    /// Root for relative paths in compiler diagnostics. Defaults to `cm_root`.
    pub diagnostics_root: Option<PathBuf>,
    pub git_mode: bool,
    pub arch: String,
    pub debug: bool,
    /// Clear the output view before each build-like command.
    pub clear_output_on_build: bool,
    /// Output line signalling the compiler accepts commands. `None` means
    /// ready as soon as the process is spawned.
    pub ready_pattern: Option<String>,
    pub startup_timeout_ms: u64,
    /// Deadline for statement and definition watches.
    pub watch_timeout_ms: u64,
    /// Destination of the output log. Defaults to a file in the temp dir.
    pub output_file: Option<PathBuf>,
    pub clean_program: String,
    pub clean_args: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: "cm".to_string(),
            args: Vec::new(),
            cm_root: PathBuf::from("."),
            cm_path: None,
            diagnostics_root: None,
            git_mode: false,
            arch: "x64".to_string(),
            debug: false,
            clear_output_on_build: true,
            ready_pattern: None,
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
            watch_timeout_ms: DEFAULT_WATCH_TIMEOUT_MS,
            output_file: None,
            clean_program: "make".to_string(),
            clean_args: vec!["clean-cm".to_string()],
        }
    }
}

impl CompilerConfig {
    #[must_use]
    pub fn project_root(&self) -> &Path {
        self.cm_path.as_deref().unwrap_or(&self.cm_root)
    }

    #[must_use]
    pub fn diagnostics_root(&self) -> &Path {
        self.diagnostics_root.as_deref().unwrap_or(&self.cm_root)
    }

    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    #[must_use]
    pub fn watch_timeout(&self) -> Duration {
        Duration::from_millis(self.watch_timeout_ms)
    }

    #[must_use]
    pub fn output_file_path(&self) -> PathBuf {
        self.output_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("cmbridge-output.log"))
    }
}

/// Observable lifecycle state of the compiler subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
}

/// Why a session ended without being asked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStopReason {
    Exited,
    Failed(String),
}

/// An event emitted towards the editor.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    /// A complete line for the output view.
    Output(String),
    OutputCleared,
    /// Full diagnostics list for one file (replaces earlier lists).
    Diagnostics {
        path: PathBuf,
        items: Vec<CmDiagnostic>,
    },
    DiagnosticsCleared,
    /// Short user-visible message.
    Notification(String),
    SessionStopped { reason: SessionStopReason },
}

/// A unit of code sent to the compiler whose outcome is read from its output.
#[derive(Debug, Clone)]
pub struct CodeStatement {
    pub code: String,
    /// Start the compiler if it isn't running. Otherwise the statement is skipped.
    pub start: bool,
    pub success: Regex,
    pub failure: Option<Regex>,
    /// Keep the output view as is.
    pub do_not_clear: bool,
}

impl CodeStatement {
    pub fn new(code: impl Into<String>, success: &str) -> Result<Self, AdapterError> {
        Ok(Self {
            code: code.into(),
            start: true,
            success: compile_pattern(success)?,
            failure: None,
            do_not_clear: false,
        })
    }

    pub fn with_failure(mut self, failure: &str) -> Result<Self, AdapterError> {
        self.failure = Some(compile_pattern(failure)?);
        Ok(self)
    }

    #[must_use]
    pub fn without_start(mut self) -> Self {
        self.start = false;
        self
    }

    #[must_use]
    pub fn keep_output(mut self) -> Self {
        self.do_not_clear = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementOutcome {
    /// The success pattern matched this line.
    Matched(String),
    /// The compiler wasn't running and the statement didn't ask to start it.
    Skipped,
}

pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex, AdapterError> {
    Regex::new(pattern).map_err(|source| AdapterError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Immutable snapshot of all diagnostics.
///
/// Counts are computed from `files`; there is no cached total to keep in sync.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsSnapshot {
    /// Per-file diagnostics, sorted with error-containing files first.
    files: Vec<(PathBuf, Vec<CmDiagnostic>)>,
}

impl DiagnosticsSnapshot {
    pub(crate) fn new(files: Vec<(PathBuf, Vec<CmDiagnostic>)>) -> Self {
        Self { files }
    }

    #[must_use]
    pub fn files(&self) -> &[(PathBuf, Vec<CmDiagnostic>)] {
        &self.files
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.files
            .iter()
            .flat_map(|(_, items)| items)
            .filter(|d| d.severity().is_error())
            .count()
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.total_count() - self.error_count()
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.files.iter().map(|(_, items)| items.len()).sum()
    }

    /// Compact status string like "E:3 W:5".
    #[must_use]
    pub fn status_string(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!("E:{} W:{}", self.error_count(), self.warning_count())
    }
}
