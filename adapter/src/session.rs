//! Session handle: owns the compiler child process and its I/O tasks.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::SharedChannel;
use crate::command::CmCommand;
use crate::error::AdapterError;
use crate::types::{AdapterEvent, CompilerConfig, SessionStopReason};

const WRITER_CHANNEL_CAPACITY: usize = 64;

const READ_CHUNK_BYTES: usize = 8 * 1024;

const PROCESS_ERROR_NOTIFICATION: &str = "Error from CM Process";

enum WriterCommand {
    Send(String),
    Shutdown,
}

pub(crate) struct CompilerSession {
    child: Child,
    writer_tx: mpsc::Sender<WriterCommand>,
    stdout_handle: JoinHandle<()>,
    stderr_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl CompilerSession {
    pub(crate) async fn spawn(config: &CompilerConfig, channel: SharedChannel) -> Result<Self> {
        let resolved = which::which(&config.program)
            .with_context(|| format!("{} not found in PATH", config.program))?;

        let mut cmd = Command::new(&resolved);
        cmd.args(&config.args)
            .current_dir(&config.cm_root)
            .env("CM_ROOT", &config.cm_root)
            .env("CM_GIT_MODE", flag(config.git_mode))
            .env("CM_ARCH", &config.arch)
            .env("CM_DEBUG", flag(config.debug))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {}", resolved.display()))?;
        tracing::info!(program = %resolved.display(), pid = ?child.id(), "Spawned cm compiler");

        let stdin = child.stdin.take().context("no stdin from child")?;
        let stdout = child.stdout.take().context("no stdout from child")?;
        let stderr = child.stderr.take().context("no stderr from child")?;

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        let writer_handle = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(text) => {
                        if let Err(e) = write_statement(&mut stdin, &text).await {
                            tracing::warn!("cm write error: {e}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let stdout_handle = tokio::spawn(read_stdout(stdout, channel.clone()));
        let stderr_handle = tokio::spawn(read_stderr(stderr, channel));

        Ok(Self {
            child,
            writer_tx,
            stdout_handle,
            stderr_handle,
            writer_handle,
        })
    }

    pub(crate) async fn send(&self, command: &CmCommand) -> Result<(), AdapterError> {
        let text = command.render();
        tracing::debug!(command = %text, "Sending to cm");
        self.writer_tx
            .send(WriterCommand::Send(text))
            .await
            .map_err(|_| AdapterError::NotRunning)
    }

    /// Whether the child has already exited on its own.
    pub(crate) fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Terminate the process. Readers are stopped first so an intentional
    /// kill is not reported as an unexpected exit. Returns once the writer
    /// task has finished.
    pub(crate) async fn kill(mut self) {
        self.stdout_handle.abort();
        self.stderr_handle.abort();
        if let Err(e) = self.child.kill().await {
            tracing::debug!("cm kill: {e}");
        }
        // Queued writes fail fast against the closed pipe.
        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;
        if let Err(e) = self.writer_handle.await {
            tracing::debug!("cm writer task: {e}");
        }
        tracing::info!("cm compiler stopped");
    }
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

async fn write_statement(stdin: &mut ChildStdin, text: &str) -> std::io::Result<()> {
    stdin.write_all(text.as_bytes()).await?;
    if !text.ends_with('\n') {
        stdin.write_all(b"\n").await?;
    }
    stdin.flush().await
}

async fn read_stdout(mut stdout: impl AsyncRead + Unpin, channel: SharedChannel) {
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    let reason = loop {
        match stdout.read(&mut buf).await {
            Ok(0) => {
                tracing::info!("cm compiler closed stdout");
                break SessionStopReason::Exited;
            }
            Ok(n) => channel.lock().await.write_bytes(&buf[..n]),
            Err(e) => {
                tracing::warn!("cm reader error: {e}");
                break SessionStopReason::Failed(e.to_string());
            }
        }
    };
    let mut channel = channel.lock().await;
    channel.finish();
    channel.emit(AdapterEvent::SessionStopped { reason });
}

async fn read_stderr(mut stderr: impl AsyncRead + Unpin, channel: SharedChannel) {
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                let text = text.trim_end();
                if text.is_empty() {
                    continue;
                }
                tracing::warn!(stderr = text, "cm process error output");
                let mut channel = channel.lock().await;
                channel.emit(AdapterEvent::Notification(
                    PROCESS_ERROR_NOTIFICATION.to_string(),
                ));
                channel.write(&format!("[INFO: CM_Process_Error -> {text}]\n"));
            }
        }
    }
}
