//! Single-slot output watch.
//!
//! At most one request waits on compiler output at a time. Installing a new
//! watch resolves the previous one as [`WatchOutcome::Superseded`], so a
//! stale request can never consume output meant for a newer one.

use std::time::Duration;

use regex::Regex;
use tokio::sync::oneshot;

use crate::channel::SharedChannel;
use crate::error::AdapterError;

pub(crate) type WatchId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WatchOutcome {
    Matched(String),
    Failed(String),
    Superseded,
    Abandoned,
}

struct ActiveWatch {
    id: WatchId,
    success: Regex,
    failure: Option<Regex>,
    reply: oneshot::Sender<WatchOutcome>,
}

#[derive(Default)]
pub(crate) struct WatchSlot {
    active: Option<ActiveWatch>,
    next_id: WatchId,
}

impl WatchSlot {
    pub(crate) fn install(
        &mut self,
        success: Regex,
        failure: Option<Regex>,
    ) -> (WatchId, oneshot::Receiver<WatchOutcome>) {
        if let Some(previous) = self.active.take() {
            tracing::debug!(id = previous.id, "Superseding output watch");
            let _ = previous.reply.send(WatchOutcome::Superseded);
        }

        self.next_id += 1;
        let id = self.next_id;
        let (reply, rx) = oneshot::channel();
        self.active = Some(ActiveWatch {
            id,
            success,
            failure,
            reply,
        });
        (id, rx)
    }

    /// Test `line` against the active watch. Returns whether it resolved.
    pub(crate) fn offer(&mut self, line: &str) -> bool {
        let outcome = match &self.active {
            None => return false,
            Some(watch) if watch.success.is_match(line) => WatchOutcome::Matched(line.to_string()),
            Some(watch) if watch.failure.as_ref().is_some_and(|f| f.is_match(line)) => {
                WatchOutcome::Failed(line.to_string())
            }
            Some(_) => return false,
        };
        if let Some(watch) = self.active.take() {
            // Receiver may have timed out already.
            let _ = watch.reply.send(outcome);
        }
        true
    }

    /// Drop the watch if it is still `id`. Used after the waiter gave up.
    pub(crate) fn clear_if(&mut self, id: WatchId) {
        if self.active.as_ref().is_some_and(|w| w.id == id) {
            self.active = None;
        }
    }

    /// Resolve the active watch as abandoned, e.g. when the process went away.
    pub(crate) fn abandon(&mut self) {
        if let Some(watch) = self.active.take() {
            tracing::debug!(id = watch.id, "Abandoning output watch");
            let _ = watch.reply.send(WatchOutcome::Abandoned);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

/// Wait for a watch to settle, giving up after `deadline`.
pub(crate) async fn await_watch(
    channel: &SharedChannel,
    id: WatchId,
    reply: oneshot::Receiver<WatchOutcome>,
    deadline: Duration,
) -> Result<String, AdapterError> {
    match tokio::time::timeout(deadline, reply).await {
        Ok(Ok(WatchOutcome::Matched(line))) => Ok(line),
        Ok(Ok(WatchOutcome::Failed(line))) => Err(AdapterError::StatementFailed(line)),
        Ok(Ok(WatchOutcome::Superseded)) => Err(AdapterError::Superseded),
        Ok(Ok(WatchOutcome::Abandoned) | Err(_)) => Err(AdapterError::SessionEnded),
        Err(_) => {
            channel.lock().await.clear_watch(id);
            tracing::debug!(id, ?deadline, "Output watch timed out");
            Err(AdapterError::Timeout(deadline))
        }
    }
}

/// A watch whose command has been sent; awaiting it doesn't borrow the adapter.
pub struct PendingWatch {
    id: WatchId,
    reply: oneshot::Receiver<WatchOutcome>,
    channel: SharedChannel,
    deadline: Duration,
}

impl PendingWatch {
    pub(crate) fn new(
        id: WatchId,
        reply: oneshot::Receiver<WatchOutcome>,
        channel: SharedChannel,
        deadline: Duration,
    ) -> Self {
        Self {
            id,
            reply,
            channel,
            deadline,
        }
    }

    pub(crate) fn id(&self) -> WatchId {
        self.id
    }

    pub(crate) fn channel(&self) -> &SharedChannel {
        &self.channel
    }

    /// Resolve to the matching line.
    pub async fn wait(self) -> Result<String, AdapterError> {
        await_watch(&self.channel, self.id, self.reply, self.deadline).await
    }
}
