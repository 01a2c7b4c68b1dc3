//! JSON-lines wire types.
//!
//! Requests arrive one per stdin line, tagged by `"command"`. Responses and
//! adapter events leave one per stdout line, tagged by `"type"`. A request may
//! carry an `id`, which is echoed on its response.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cmbridge_adapter::{AdapterEvent, DiagnosticsSnapshot, SessionStopReason};
use cmbridge_types::{CmDiagnostic, Location};

#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub request: Request,
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    Start,
    Stop,
    Reset,
    Clean,
    CleanCmx,
    CompileFile {
        file: PathBuf,
    },
    CompileWorkspace {
        dir: PathBuf,
    },
    CompileFolders {
        dirs: Vec<PathBuf>,
    },
    RunCurrentFile {
        file: PathBuf,
    },
    LoadAllKnown {
        file: PathBuf,
    },
    Run {
        code: String,
    },
    RunIfStarted {
        code: String,
    },
    RunStatement {
        code: String,
        success: String,
        #[serde(default)]
        failure: Option<String>,
        #[serde(default = "default_true")]
        start: bool,
        #[serde(default)]
        do_not_clear: bool,
    },
    Goto {
        file: PathBuf,
        offset: usize,
    },
    QuitDebug,
    OutputFile {
        enabled: bool,
    },
    Diagnostics,
    Shutdown,
}

#[derive(Debug, Serialize)]
pub struct FileDiagnostics {
    pub uri: String,
    pub items: Vec<CmDiagnostic>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        message: String,
    },
    Location {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        uri: String,
        line: u32,
        col: u32,
    },
    Statement {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        outcome: StatementReply,
        #[serde(skip_serializing_if = "Option::is_none")]
        line: Option<String>,
    },
    Snapshot {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        errors: usize,
        warnings: usize,
        status: String,
        files: Vec<FileDiagnostics>,
    },
    Output {
        line: String,
    },
    OutputCleared,
    Diagnostics {
        uri: String,
        items: Vec<CmDiagnostic>,
    },
    DiagnosticsCleared,
    Notification {
        message: String,
    },
    SessionStopped {
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatementReply {
    Matched,
    Skipped,
}

impl Message {
    pub fn ok(id: Option<u64>) -> Self {
        Self::Ok { id, uri: None }
    }

    pub fn ok_with_path(id: Option<u64>, path: &Path) -> Self {
        Self::Ok {
            id,
            uri: Some(path_to_uri(path)),
        }
    }

    pub fn error(id: Option<u64>, message: impl Into<String>) -> Self {
        Self::Error {
            id,
            message: message.into(),
        }
    }

    pub fn location(id: Option<u64>, location: &Location) -> Self {
        Self::Location {
            id,
            uri: path_to_uri(location.path()),
            line: location.line(),
            col: location.col(),
        }
    }

    pub fn snapshot(id: Option<u64>, snapshot: &DiagnosticsSnapshot) -> Self {
        Self::Snapshot {
            id,
            errors: snapshot.error_count(),
            warnings: snapshot.warning_count(),
            status: snapshot.status_string(),
            files: snapshot
                .files()
                .iter()
                .map(|(path, items)| FileDiagnostics {
                    uri: path_to_uri(path),
                    items: items.clone(),
                })
                .collect(),
        }
    }

    pub fn from_event(event: &AdapterEvent) -> Self {
        match event {
            AdapterEvent::Output(line) => Self::Output { line: line.clone() },
            AdapterEvent::OutputCleared => Self::OutputCleared,
            AdapterEvent::Diagnostics { path, items } => Self::Diagnostics {
                uri: path_to_uri(path),
                items: items.clone(),
            },
            AdapterEvent::DiagnosticsCleared => Self::DiagnosticsCleared,
            AdapterEvent::Notification(message) => Self::Notification {
                message: message.clone(),
            },
            AdapterEvent::SessionStopped { reason } => Self::SessionStopped {
                reason: match reason {
                    SessionStopReason::Exited => "exited".to_string(),
                    SessionStopReason::Failed(e) => format!("failed: {e}"),
                },
            },
        }
    }
}

/// `file://` URI for `path`; relative paths fall back to their plain form.
pub fn path_to_uri(path: &Path) -> String {
    url::Url::from_file_path(path)
        .map_or_else(|()| path.display().to_string(), |url| url.to_string())
}
