//! Core domain types for cmbridge.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod paths;
pub use paths::{
    GENERATED_EXTENSION, TEMPLATE_EXTENSION, generated_path_for, is_generated, is_template,
    template_path_for, to_cm_path,
};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Diagnostics
// ============================================================================

/// Severity level for a compiler diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

impl DiagnosticSeverity {
    /// Map an output marker (`ERROR`, `WARNING`) to a severity.
    #[must_use]
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "ERROR" => Some(Self::Error),
            "WARNING" => Some(Self::Warning),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// A single diagnostic reported by the cm compiler.
///
/// Fields are private; external consumers read via accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CmDiagnostic {
    severity: DiagnosticSeverity,
    message: String,
    /// 0-indexed line number.
    line: u32,
    /// 0-indexed column.
    col: u32,
}

impl CmDiagnostic {
    #[must_use]
    pub fn new(severity: DiagnosticSeverity, message: String, line: u32, col: u32) -> Self {
        Self {
            severity,
            message,
            line,
            col,
        }
    }

    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 0-indexed line number.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// 0-indexed column.
    #[must_use]
    pub fn col(&self) -> u32 {
        self.col
    }

    /// Format as `path:line:col: severity: message` (1-indexed for display).
    #[must_use]
    pub fn display_with_path(&self, path: &Path) -> String {
        format!(
            "{}:{}:{}: {}: {}",
            path.display(),
            self.line + 1,
            self.col + 1,
            self.severity.label(),
            self.message,
        )
    }
}

// ============================================================================
// Locations
// ============================================================================

/// A position inside a source file, as returned by a definition lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    path: PathBuf,
    /// 0-indexed line number.
    line: u32,
    /// 0-indexed column.
    col: u32,
}

impl Location {
    #[must_use]
    pub fn new(path: PathBuf, line: u32, col: u32) -> Self {
        Self { path, line, col }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    #[must_use]
    pub fn col(&self) -> u32 {
        self.col
    }
}

/// A 1-based position reported by the compiler could not be converted.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid 1-based position: {0:?}")]
pub struct PositionError(pub String);

/// Parse a 1-based line or column number into its 0-based form.
///
/// `0` is accepted and kept at `0`; the compiler uses it for "unknown column".
pub fn parse_one_based(raw: &str) -> Result<u32, PositionError> {
    raw.trim()
        .parse::<u32>()
        .map(|n| n.saturating_sub(1))
        .map_err(|_| PositionError(raw.to_string()))
}
