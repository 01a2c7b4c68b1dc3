//! The output channel: single sink for everything shown to the user.
//!
//! Subprocess output and adapter messages both enter through
//! [`OutputChannel::write`]. Each complete line is classified, recorded as a
//! diagnostic when it is one, offered to the active watch, appended to the
//! optional output file and finally emitted as [`AdapterEvent::Output`].

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tokio::sync::{Mutex, mpsc, oneshot};

use cmbridge_types::{CmDiagnostic, Location};

use crate::line_buffer::LineBuffer;
use crate::parser::{ParsedLine, TemplateRemapper, parse_line};
use crate::types::AdapterEvent;
use crate::watch::{WatchId, WatchOutcome, WatchSlot};

/// Unterminated output kept before the oldest bytes are dropped.
const MAX_PENDING_LINE_BYTES: usize = 1024 * 1024;

pub(crate) type SharedChannel = Arc<Mutex<OutputChannel>>;

pub(crate) struct OutputChannel {
    buffer: LineBuffer,
    watch: WatchSlot,
    remapper: TemplateRemapper,
    diagnostics_root: PathBuf,
    diagnostics: HashMap<PathBuf, Vec<CmDiagnostic>>,
    file: OutputFile,
    events: mpsc::UnboundedSender<AdapterEvent>,
}

impl OutputChannel {
    pub(crate) fn new(
        diagnostics_root: PathBuf,
        output_file: PathBuf,
        events: mpsc::UnboundedSender<AdapterEvent>,
    ) -> Self {
        Self {
            buffer: LineBuffer::with_max_buffer_bytes(MAX_PENDING_LINE_BYTES),
            watch: WatchSlot::default(),
            remapper: TemplateRemapper::default(),
            diagnostics_root,
            diagnostics: HashMap::new(),
            file: OutputFile::new(output_file),
            events,
        }
    }

    pub(crate) fn shared(self) -> SharedChannel {
        Arc::new(Mutex::new(self))
    }

    pub(crate) fn write(&mut self, text: &str) {
        self.write_bytes(text.as_bytes());
    }

    pub(crate) fn write_bytes(&mut self, chunk: &[u8]) {
        for line in self.buffer.push(chunk) {
            self.handle_line(&line);
        }
        let dropped = self.buffer.take_overflowed_bytes();
        if dropped > 0 {
            tracing::warn!(dropped, "Output line exceeded buffer cap, dropped bytes");
        }
    }

    /// Write `text` as a block of whole lines.
    pub(crate) fn write_block(&mut self, text: &str) {
        self.write(text);
        if !text.is_empty() && !text.ends_with('\n') {
            self.write("\n");
        }
    }

    /// End of the subprocess stream: emit the unterminated tail and release
    /// any waiter.
    pub(crate) fn finish(&mut self) {
        if let Some(tail) = self.buffer.flush() {
            self.handle_line(&tail);
        }
        self.watch.abandon();
    }

    fn handle_line(&mut self, line: &str) {
        tracing::trace!(line, "cm output");
        if let ParsedLine::Diagnostic { path, diagnostic } = parse_line(line, &self.diagnostics_root)
        {
            let path = self.remapper.remap(path);
            self.record(path, diagnostic);
        }
        self.watch.offer(line);
        self.file.append(line);
        self.emit(AdapterEvent::Output(line.to_string()));
    }

    fn record(&mut self, path: PathBuf, diagnostic: CmDiagnostic) {
        let items = self.diagnostics.entry(path.clone()).or_default();
        items.push(diagnostic);
        let items = items.clone();
        self.emit(AdapterEvent::Diagnostics { path, items });
    }

    pub(crate) fn emit(&self, event: AdapterEvent) {
        // The host may have dropped its receiver during shutdown.
        let _ = self.events.send(event);
    }

    pub(crate) fn clear(&mut self) {
        self.emit(AdapterEvent::OutputCleared);
    }

    pub(crate) fn clear_diagnostics(&mut self) {
        self.diagnostics.clear();
        self.emit(AdapterEvent::DiagnosticsCleared);
    }

    pub(crate) fn install_watch(
        &mut self,
        success: Regex,
        failure: Option<Regex>,
    ) -> (WatchId, oneshot::Receiver<WatchOutcome>) {
        self.watch.install(success, failure)
    }

    pub(crate) fn clear_watch(&mut self, id: WatchId) {
        self.watch.clear_if(id);
    }

    pub(crate) fn abandon_watch(&mut self) {
        self.watch.abandon();
    }

    pub(crate) fn invalidate_templates(&mut self) {
        self.remapper.invalidate();
    }

    pub(crate) fn remap_location(&mut self, location: Location) -> Location {
        let path = self.remapper.remap(location.path().to_path_buf());
        Location::new(path, location.line(), location.col())
    }

    pub(crate) fn diagnostics_root(&self) -> &Path {
        &self.diagnostics_root
    }

    pub(crate) fn output_file(&mut self) -> &mut OutputFile {
        &mut self.file
    }
}

/// Optional copy of the output view on disk.
pub(crate) struct OutputFile {
    path: PathBuf,
    handle: Option<File>,
}

impl OutputFile {
    fn new(path: PathBuf) -> Self {
        Self { path, handle: None }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn enable(&mut self) -> io::Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(
            file,
            "--- cm output {} ---",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        self.handle = Some(file);
        Ok(())
    }

    pub(crate) fn disable(&mut self) {
        self.handle = None;
    }

    fn append(&mut self, line: &str) {
        let Some(file) = self.handle.as_mut() else {
            return;
        };
        if let Err(e) = writeln!(file, "{line}") {
            tracing::warn!(path = %self.path.display(), "Failed to append to output file: {e}");
            self.handle = None;
        }
    }
}
