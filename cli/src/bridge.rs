//! Request loop connecting the JSON-lines protocol to the adapter.
//!
//! Requests are handled one at a time, in arrival order. Statement and
//! definition requests hand their watch to a task, so the loop keeps reading
//! while the compiler works; a later request supersedes the pending watch.
//! Adapter events are forwarded as they happen.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};

use cmbridge_adapter::{
    AdapterError, AdapterEvent, CodeStatement, CompilerAdapter, CompilerConfig, DiagnosticsStore,
    StatementOutcome,
};

use crate::protocol::{Envelope, Message, Request, StatementReply};

/// Upper bound on delivering the last adapter events at exit.
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

struct Bridge {
    adapter: CompilerAdapter,
    store: Arc<Mutex<DiagnosticsStore>>,
    out: mpsc::UnboundedSender<Message>,
}

/// Serve requests from `input` until EOF or `shutdown`. Returns `output`
/// once every message has been written.
pub async fn serve<R, W>(config: CompilerConfig, input: R, output: W) -> Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (adapter, events) = CompilerAdapter::new(config);
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_messages(output, out_rx));

    let store = Arc::new(Mutex::new(DiagnosticsStore::new()));
    let mut forwarder = tokio::spawn(forward_events(events, store.clone(), out_tx.clone()));

    let mut bridge = Bridge {
        adapter,
        store,
        out: out_tx,
    };

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("reading requests")? {
        if line.trim().is_empty() {
            continue;
        }
        let envelope = match serde_json::from_str::<Envelope>(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(line = %line, "Rejected request: {e}");
                bridge.send(Message::error(None, format!("invalid request: {e}")));
                continue;
            }
        };
        if bridge.handle(envelope).await == Flow::Exit {
            break;
        }
    }

    let Bridge { adapter, out, .. } = bridge;
    adapter.shutdown().await;
    // The forwarder ends once every event sender is gone, after delivering
    // what the shutdown emitted.
    if tokio::time::timeout(EVENT_DRAIN_TIMEOUT, &mut forwarder)
        .await
        .is_err()
    {
        tracing::warn!("Adapter events still pending at exit");
        forwarder.abort();
    }
    drop(out);

    writer.await.context("output writer panicked")?
}

impl Bridge {
    fn send(&self, message: Message) {
        let _ = self.out.send(message);
    }

    async fn handle(&mut self, envelope: Envelope) -> Flow {
        let Envelope { id, request } = envelope;
        tracing::debug!(?id, ?request, "Request");

        let flow = if request == Request::Shutdown {
            Flow::Exit
        } else {
            Flow::Continue
        };
        match self.dispatch(id, request).await {
            Ok(Some(message)) => self.send(message),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(?id, "Request failed: {e}");
                self.send(Message::error(id, e.to_string()));
            }
        }
        flow
    }

    /// `Ok(None)` means the response is sent later by a spawned task.
    async fn dispatch(
        &mut self,
        id: Option<u64>,
        request: Request,
    ) -> Result<Option<Message>, AdapterError> {
        let adapter = &mut self.adapter;
        let message = match request {
            Request::Start => {
                adapter.start().await?;
                Message::ok(id)
            }
            Request::Stop => {
                adapter.stop().await;
                Message::ok(id)
            }
            Request::Reset => {
                adapter.reset().await?;
                Message::ok(id)
            }
            Request::Clean => {
                adapter.clean().await?;
                Message::ok(id)
            }
            Request::CleanCmx => {
                adapter.clean_cmx().await?;
                Message::ok(id)
            }
            Request::CompileFile { file } => {
                let target = adapter.compile_file(&file).await?;
                Message::ok_with_path(id, &target)
            }
            Request::CompileWorkspace { dir } => {
                adapter.compile_workspace(&dir).await?;
                Message::ok(id)
            }
            Request::CompileFolders { dirs } => {
                adapter.compile_folders(&dirs).await?;
                Message::ok(id)
            }
            Request::RunCurrentFile { file } => {
                let target = adapter.run_current_file(&file).await?;
                Message::ok_with_path(id, &target)
            }
            Request::LoadAllKnown { file } => {
                adapter.load_all_known(&file).await?;
                Message::ok(id)
            }
            Request::Run { code } => {
                adapter.run(&code).await?;
                Message::ok(id)
            }
            Request::RunIfStarted { code } => {
                adapter.run_if_started(&code).await?;
                Message::ok(id)
            }
            Request::RunStatement {
                code,
                success,
                failure,
                start,
                do_not_clear,
            } => {
                let mut statement = CodeStatement::new(code, &success)?;
                if let Some(failure) = failure {
                    statement = statement.with_failure(&failure)?;
                }
                statement.start = start;
                statement.do_not_clear = do_not_clear;

                let Some(watch) = adapter.submit_statement(statement).await? else {
                    return Ok(Some(statement_reply(id, StatementOutcome::Skipped)));
                };
                let out = self.out.clone();
                tokio::spawn(async move {
                    let message = match watch.wait().await {
                        Ok(line) => statement_reply(id, StatementOutcome::Matched(line)),
                        Err(e) => Message::error(id, e.to_string()),
                    };
                    let _ = out.send(message);
                });
                return Ok(None);
            }
            Request::Goto { file, offset } => {
                let pending = adapter.submit_goto(&file, offset).await?;
                let out = self.out.clone();
                tokio::spawn(async move {
                    let message = match pending.wait().await {
                        Ok(location) => Message::location(id, &location),
                        Err(e) => Message::error(id, e.to_string()),
                    };
                    let _ = out.send(message);
                });
                return Ok(None);
            }
            Request::QuitDebug => {
                adapter.quit_debug().await?;
                Message::ok(id)
            }
            Request::OutputFile { enabled: true } => {
                let path = adapter.start_writing_output_file().await?;
                Message::ok_with_path(id, &path)
            }
            Request::OutputFile { enabled: false } => {
                adapter.stop_writing_output_file().await;
                Message::ok(id)
            }
            Request::Diagnostics => Message::snapshot(id, &self.store.lock().await.snapshot()),
            Request::Shutdown => Message::ok(id),
        };
        Ok(Some(message))
    }
}

fn statement_reply(id: Option<u64>, outcome: StatementOutcome) -> Message {
    match outcome {
        StatementOutcome::Matched(line) => Message::Statement {
            id,
            outcome: StatementReply::Matched,
            line: Some(line),
        },
        StatementOutcome::Skipped => Message::Statement {
            id,
            outcome: StatementReply::Skipped,
            line: None,
        },
    }
}

async fn forward_events(
    mut events: mpsc::UnboundedReceiver<AdapterEvent>,
    store: Arc<Mutex<DiagnosticsStore>>,
    out: mpsc::UnboundedSender<Message>,
) {
    while let Some(event) = events.recv().await {
        store.lock().await.apply(&event);
        if out.send(Message::from_event(&event)).is_err() {
            break;
        }
    }
}

async fn write_messages<W>(mut output: W, mut messages: mpsc::UnboundedReceiver<Message>) -> Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = messages.recv().await {
        let mut line = serde_json::to_string(&message).context("encoding message")?;
        line.push('\n');
        output
            .write_all(line.as_bytes())
            .await
            .context("writing message")?;
        output.flush().await.context("flushing output")?;
    }
    Ok(output)
}
