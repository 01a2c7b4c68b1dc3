//! `CompilerAdapter`: lifecycle state machine and editor-facing operations.
//!
//! The adapter is the only owner of the compiler session. Every mutating
//! operation takes `&mut self`, so a start can never race a stop. Operations
//! that need a running compiler start it on demand; start failures propagate
//! to the caller.

use std::path::{Path, PathBuf};

use regex::Regex;
use tokio::process::Command;
use tokio::sync::mpsc;

use cmbridge_cmx::CmxCompiler;
use cmbridge_types::{Location, to_cm_path};

use crate::channel::{OutputChannel, SharedChannel};
use crate::command::CmCommand;
use crate::error::AdapterError;
use crate::parser::{DEFINITION_PATTERN, ParsedLine, parse_line};
use crate::session::CompilerSession;
use crate::types::{
    AdapterEvent, CodeStatement, CompilerConfig, SessionState, StatementOutcome, compile_pattern,
};
use crate::watch::{PendingWatch, await_watch};

const RULE: &str = "---------------------";

/// Files whose runs keep the output view intact.
const LOADER_SUFFIX: &str = "acloader.cm";

enum SessionSlot {
    Stopped,
    Starting,
    Running(CompilerSession),
}

pub struct CompilerAdapter {
    config: CompilerConfig,
    slot: SessionSlot,
    channel: SharedChannel,
    cmx: CmxCompiler,
}

impl CompilerAdapter {
    /// Create an adapter and the receiver its events are delivered on.
    #[must_use]
    pub fn new(config: CompilerConfig) -> (Self, mpsc::UnboundedReceiver<AdapterEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let channel = OutputChannel::new(
            config.diagnostics_root().to_path_buf(),
            config.output_file_path(),
            event_tx,
        )
        .shared();
        let cmx = CmxCompiler::new(config.project_root());
        let adapter = Self {
            config,
            slot: SessionSlot::Stopped,
            channel,
            cmx,
        };
        (adapter, event_rx)
    }

    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        match self.slot {
            SessionSlot::Stopped => SessionState::Stopped,
            SessionSlot::Starting => SessionState::Starting,
            SessionSlot::Running(_) => SessionState::Running,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.slot, SessionSlot::Running(_))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the compiler. Returns immediately when it is already running.
    pub async fn start(&mut self) -> Result<bool, AdapterError> {
        if self.is_running() {
            return Ok(true);
        }
        let ready = self
            .config
            .ready_pattern
            .as_deref()
            .map(compile_pattern)
            .transpose()?;

        self.slot = SessionSlot::Starting;
        tracing::info!(
            program = %self.config.program,
            root = %self.config.cm_root.display(),
            "Starting cm compiler"
        );

        // Installed before spawning so the first output line can't be missed.
        let ready_watch = match ready {
            Some(pattern) => Some(self.channel.lock().await.install_watch(pattern, None)),
            None => None,
        };

        let session = match CompilerSession::spawn(&self.config, self.channel.clone()).await {
            Ok(session) => session,
            Err(e) => {
                if let Some((id, _)) = &ready_watch {
                    self.channel.lock().await.clear_watch(*id);
                }
                self.slot = SessionSlot::Stopped;
                tracing::warn!("cm compiler failed to start: {e:#}");
                return Err(AdapterError::Start(format!("{e:#}")));
            }
        };

        if let Some((id, reply)) = ready_watch
            && let Err(e) =
                await_watch(&self.channel, id, reply, self.config.startup_timeout()).await
        {
            session.kill().await;
            self.slot = SessionSlot::Stopped;
            tracing::warn!("cm compiler never became ready: {e}");
            return Err(AdapterError::Start(format!("not ready: {e}")));
        }

        self.slot = SessionSlot::Running(session);
        tracing::info!("cm compiler running");
        Ok(true)
    }

    /// Kill any session and start a fresh one.
    pub async fn reset(&mut self) -> Result<bool, AdapterError> {
        self.end_session().await;
        self.clear_output_for_build().await;
        self.start().await
    }

    pub async fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        self.clear_output_for_build().await;
        self.channel.lock().await.write("[INFO CM Killed]\n");
        self.end_session().await;
    }

    /// Run the clean command. The compiler is always stopped afterwards.
    pub async fn clean(&mut self) -> Result<(), AdapterError> {
        {
            let mut channel = self.channel.lock().await;
            channel.clear();
            channel.write("Starting Clean...\n");
        }
        let result = self.run_clean_command().await;
        self.end_session().await;

        let output = result?;
        self.write_clean_report("make clean-cm", &output, "CM Clean").await;
        Ok(())
    }

    /// Remove generated cm files, then run the clean command.
    pub async fn clean_cmx(&mut self) -> Result<(), AdapterError> {
        self.clear_output_for_build().await;
        let removed = self.cmx.clean()?;
        self.channel.lock().await.invalidate_templates();
        tracing::debug!(count = removed.len(), "Cleaned generated cm files");

        let result = self.run_clean_command().await;
        self.end_session().await;

        let output = result?;
        self.write_clean_report("make clean-cmx", &output, "CMX Clean").await;
        Ok(())
    }

    pub async fn quit_debug(&mut self) -> Result<(), AdapterError> {
        if !self.is_running() {
            return Ok(());
        }
        self.send(&CmCommand::QuitDebug).await
    }

    /// Stop the compiler, e.g. before the host exits.
    pub async fn shutdown(mut self) {
        self.end_session().await;
    }

    // ------------------------------------------------------------------
    // Output file
    // ------------------------------------------------------------------

    pub async fn start_writing_output_file(&mut self) -> Result<PathBuf, AdapterError> {
        let mut channel = self.channel.lock().await;
        let path = channel.output_file().path().to_path_buf();
        channel.write(&format!(
            "[Contents of output channel will now be written to: {}]\n",
            path.display()
        ));
        channel
            .output_file()
            .enable()
            .map_err(|source| AdapterError::Io {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = %path.display(), "Writing output to file");
        Ok(path)
    }

    pub async fn stop_writing_output_file(&mut self) {
        let mut channel = self.channel.lock().await;
        channel.output_file().disable();
        channel.write("[Stopped writing output to file]\n");
    }

    pub async fn is_writing_output_file(&self) -> bool {
        self.channel.lock().await.output_file().is_enabled()
    }

    // ------------------------------------------------------------------
    // Editor operations
    // ------------------------------------------------------------------

    pub async fn run(&mut self, code: &str) -> Result<(), AdapterError> {
        self.run_command(CmCommand::Raw(code.to_string())).await
    }

    /// Like [`Self::run`], but never starts the compiler. Returns whether the
    /// code was sent.
    pub async fn run_if_started(&mut self, code: &str) -> Result<bool, AdapterError> {
        self.clear_output_for_build().await;
        self.clear_diagnostics().await;
        if !self.is_running() {
            return Ok(false);
        }
        self.send(&CmCommand::Raw(code.to_string())).await?;
        Ok(true)
    }

    pub async fn run_statement(
        &mut self,
        statement: CodeStatement,
    ) -> Result<StatementOutcome, AdapterError> {
        match self.submit_statement(statement).await? {
            Some(watch) => Ok(StatementOutcome::Matched(watch.wait().await?)),
            None => Ok(StatementOutcome::Skipped),
        }
    }

    /// Send a statement and hand back its watch without waiting on it.
    /// `None` means the statement was skipped.
    pub async fn submit_statement(
        &mut self,
        statement: CodeStatement,
    ) -> Result<Option<PendingWatch>, AdapterError> {
        if !statement.start && !self.is_running() {
            tracing::debug!("Compiler not running, skipping statement");
            return Ok(None);
        }
        if !statement.do_not_clear {
            self.clear_output_for_build().await;
        }
        self.ensure_running().await?;

        let watch = self.watch(statement.success, statement.failure).await;
        self.send_watched(&CmCommand::Raw(statement.code), &watch).await?;
        Ok(Some(watch))
    }

    /// Preprocess `file` if it is a template and compile the result.
    pub async fn compile_file(&mut self, file: &Path) -> Result<PathBuf, AdapterError> {
        self.clear_output_for_build().await;
        self.clear_diagnostics().await;
        self.ensure_running().await?;
        let target = self.preprocess(file).await?;
        self.send(&CmCommand::CompileFile(target.clone())).await?;
        Ok(target)
    }

    pub async fn run_current_file(&mut self, file: &Path) -> Result<PathBuf, AdapterError> {
        if !to_cm_path(file).ends_with(LOADER_SUFFIX) {
            self.clear_output_for_build().await;
        }
        self.clear_diagnostics().await;
        self.ensure_running().await?;
        let target = self.preprocess(file).await?;
        self.send(&CmCommand::RunFile(target.clone())).await?;
        Ok(target)
    }

    pub async fn load_all_known(&mut self, file: &Path) -> Result<(), AdapterError> {
        self.clear_diagnostics().await;
        self.ensure_running().await?;
        self.send(&CmCommand::LoadAll(file.to_path_buf())).await
    }

    pub async fn compile_workspace(&mut self, dir: &Path) -> Result<(), AdapterError> {
        self.compile_folders(&[dir.to_path_buf()]).await
    }

    pub async fn compile_folders(&mut self, dirs: &[PathBuf]) -> Result<(), AdapterError> {
        self.ensure_running().await?;
        self.cmx.compile_all()?;
        self.channel.lock().await.invalidate_templates();
        self.run_command(CmCommand::CompileAllBelow(dirs.to_vec())).await
    }

    /// Where the symbol at `offset` in `file` is defined.
    pub async fn goto(&mut self, file: &Path, offset: usize) -> Result<Location, AdapterError> {
        self.submit_goto(file, offset).await?.wait().await
    }

    pub async fn submit_goto(
        &mut self,
        file: &Path,
        offset: usize,
    ) -> Result<PendingDefinition, AdapterError> {
        self.ensure_running().await?;
        let watch = self.watch(compile_pattern(DEFINITION_PATTERN)?, None).await;
        let command = CmCommand::Refers {
            file: file.to_path_buf(),
            offset,
        };
        self.send_watched(&command, &watch).await?;
        Ok(PendingDefinition { watch })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn ensure_running(&mut self) -> Result<(), AdapterError> {
        if let SessionSlot::Running(session) = &mut self.slot
            && session.has_exited()
        {
            tracing::info!("cm compiler has exited");
            self.slot = SessionSlot::Stopped;
        }
        if !self.is_running() {
            self.start().await?;
        }
        Ok(())
    }

    /// Kill the session, if any, and release a pending watch.
    async fn end_session(&mut self) {
        let slot = std::mem::replace(&mut self.slot, SessionSlot::Stopped);
        self.channel.lock().await.abandon_watch();
        if let SessionSlot::Running(session) = slot {
            session.kill().await;
        }
    }

    async fn run_command(&mut self, command: CmCommand) -> Result<(), AdapterError> {
        self.clear_output_for_build().await;
        self.clear_diagnostics().await;
        self.ensure_running().await?;
        self.send(&command).await
    }

    async fn send(&self, command: &CmCommand) -> Result<(), AdapterError> {
        match &self.slot {
            SessionSlot::Running(session) => session.send(command).await,
            SessionSlot::Stopped | SessionSlot::Starting => Err(AdapterError::NotRunning),
        }
    }

    async fn send_watched(
        &self,
        command: &CmCommand,
        watch: &PendingWatch,
    ) -> Result<(), AdapterError> {
        if let Err(e) = self.send(command).await {
            watch.channel().lock().await.clear_watch(watch.id());
            return Err(e);
        }
        Ok(())
    }

    async fn watch(&self, success: Regex, failure: Option<Regex>) -> PendingWatch {
        let (id, reply) = self.channel.lock().await.install_watch(success, failure);
        PendingWatch::new(id, reply, self.channel.clone(), self.config.watch_timeout())
    }

    async fn preprocess(&self, file: &Path) -> Result<PathBuf, AdapterError> {
        let target = self.cmx.compile_file(file)?;
        if target != file {
            self.channel.lock().await.invalidate_templates();
        }
        Ok(target)
    }

    async fn clear_output_for_build(&self) {
        if self.config.clear_output_on_build {
            self.channel.lock().await.clear();
        }
    }

    async fn clear_diagnostics(&self) {
        self.channel.lock().await.clear_diagnostics();
    }

    async fn run_clean_command(&self) -> Result<String, AdapterError> {
        tracing::info!(
            program = %self.config.clean_program,
            args = ?self.config.clean_args,
            "Running clean command"
        );
        let output = Command::new(&self.config.clean_program)
            .args(&self.config.clean_args)
            .current_dir(&self.config.cm_root)
            .output()
            .await
            .map_err(AdapterError::Clean)?;
        if !output.status.success() {
            tracing::warn!(status = %output.status, "Clean command exited unsuccessfully");
        }
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }

    async fn write_clean_report(&self, header: &str, output: &str, footer: &str) {
        let mut channel = self.channel.lock().await;
        channel.write(&format!("[INFO {header}:]\n{RULE}\n"));
        channel.write_block(output);
        channel.write(&format!("{RULE}\n[INFO {footer}]\n"));
    }
}

/// A definition request in flight.
pub struct PendingDefinition {
    watch: PendingWatch,
}

impl PendingDefinition {
    pub async fn wait(self) -> Result<Location, AdapterError> {
        let channel = self.watch.channel().clone();
        let line = self.watch.wait().await?;
        let mut channel = channel.lock().await;
        let parsed = parse_line(&line, channel.diagnostics_root());
        match parsed {
            ParsedLine::Definition(location) => Ok(channel.remap_location(location)),
            ParsedLine::Diagnostic { .. } | ParsedLine::Log => Err(AdapterError::Definition(line)),
        }
    }
}
