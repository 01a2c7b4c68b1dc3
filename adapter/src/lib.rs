//! Editor integration for the cm compiler.
//!
//! [`CompilerAdapter`] owns a long-lived cm compiler subprocess, sends it
//! commands on stdin and turns its stdout into [`AdapterEvent`]s: output lines,
//! per-file diagnostics (mapped back to `.cmx` templates) and lifecycle
//! notices. Requests that expect an answer install a single output watch and
//! resolve when a matching line arrives.

mod adapter;
mod channel;
mod command;
mod diagnostics;
mod error;
mod line_buffer;
mod parser;
mod session;
mod types;
mod watch;

pub use adapter::{CompilerAdapter, PendingDefinition};
pub use command::CmCommand;
pub use diagnostics::DiagnosticsStore;
pub use error::AdapterError;
pub use line_buffer::LineBuffer;
pub use parser::{ParsedLine, parse_line};
pub use types::{
    AdapterEvent, CodeStatement, CompilerConfig, DiagnosticsSnapshot, SessionState,
    SessionStopReason, StatementOutcome,
};
pub use watch::PendingWatch;
