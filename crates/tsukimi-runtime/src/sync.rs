//! Debounced, batched writes to the remote progress store.
//!
//! One actor task owns the pending batch and a single-slot deadline. Every
//! enqueue replaces the deadline, so a burst of updates produces exactly one
//! flush one debounce window after the last of them. A flush takes the whole
//! batch, sends it once and reports the outcome on a broadcast channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};

use tsukimi_api::traits::RemoteProgressStore;
use tsukimi_core::models::{Identity, PendingSyncBatch, SyncOp};

/// Outcome notifications for the UI ("progress may not have synced").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Flushed { count: usize },
    /// The send failed. The batch is not retried.
    Failed { count: usize, message: String },
    /// Pending changes were dropped because the identity went away.
    Discarded { count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed { deadline: Instant },
    Flushing,
}

enum SyncCommand {
    Enqueue {
        key: String,
        op: SyncOp,
    },
    SetIdentity(Option<Identity>),
    State {
        reply: oneshot::Sender<SchedulerState>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncCommand>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncHandle {
    /// Spawn the scheduler on the current tokio runtime.
    pub fn spawn<R>(remote: Arc<R>, debounce: Duration) -> Self
    where
        R: RemoteProgressStore + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(32);
        let scheduler = Scheduler {
            remote,
            debounce,
            identity: None,
            batch: PendingSyncBatch::new(),
            deadline: None,
            flights: JoinSet::new(),
            events: events.clone(),
        };
        tokio::spawn(scheduler.run(rx));
        Self { tx, events }
    }

    /// Add a change to the pending batch and restart the debounce window.
    pub fn enqueue(&self, key: impl Into<String>, op: SyncOp) {
        let _ = self.tx.send(SyncCommand::Enqueue {
            key: key.into(),
            op,
        });
    }

    /// Switch the sync destination. `None` discards anything pending.
    pub fn set_identity(&self, identity: Option<Identity>) {
        let _ = self.tx.send(SyncCommand::SetIdentity(identity));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> Option<SchedulerState> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(SyncCommand::State { reply });
        rx.await.ok()
    }

    /// Flush whatever is pending right away, wait for in-flight sends and
    /// stop the scheduler.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(SyncCommand::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
    }
}

struct Scheduler<R> {
    remote: Arc<R>,
    debounce: Duration,
    identity: Option<Identity>,
    batch: PendingSyncBatch,
    deadline: Option<Instant>,
    flights: JoinSet<()>,
    events: broadcast::Sender<SyncEvent>,
}

impl<R: RemoteProgressStore + 'static> Scheduler<R> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SyncCommand>) {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                command = rx.recv() => match command {
                    Some(SyncCommand::Shutdown { reply }) => {
                        self.drain().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command),
                    // Every handle dropped.
                    None => {
                        self.drain().await;
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    self.flush();
                }
                Some(joined) = self.flights.join_next(), if !self.flights.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Sync flush task failed: {e}");
                    }
                }
            }
        }
        tracing::debug!("Sync scheduler stopped");
    }

    fn handle(&mut self, command: SyncCommand) {
        match command {
            SyncCommand::Enqueue { key, op } => {
                if self.identity.is_none() {
                    tracing::trace!(key = %key, "No identity, not queueing remote write");
                    return;
                }
                self.batch.insert(key, op);
                self.deadline = Some(Instant::now() + self.debounce);
            }
            SyncCommand::SetIdentity(identity) => {
                let same_user = match (&self.identity, &identity) {
                    (Some(old), Some(new)) => old.user_id == new.user_id,
                    _ => false,
                };
                if !same_user {
                    self.discard();
                }
                self.identity = identity;
            }
            SyncCommand::State { reply } => {
                let _ = reply.send(self.state());
            }
            SyncCommand::Shutdown { .. } => {}
        }
    }

    fn state(&self) -> SchedulerState {
        match self.deadline {
            Some(deadline) => SchedulerState::Armed { deadline },
            None if !self.flights.is_empty() => SchedulerState::Flushing,
            None => SchedulerState::Idle,
        }
    }

    fn discard(&mut self) {
        self.deadline = None;
        let dropped = self.batch.take();
        if !dropped.is_empty() {
            tracing::info!(
                count = dropped.len(),
                "Identity changed, discarding pending sync batch"
            );
            let _ = self.events.send(SyncEvent::Discarded {
                count: dropped.len(),
            });
        }
    }

    /// Start sending the current batch. Changes enqueued from here on go into
    /// a fresh batch.
    fn flush(&mut self) {
        let Some(identity) = self.identity.clone() else {
            return;
        };
        let batch = self.batch.take();
        if batch.is_empty() {
            return;
        }
        let remote = Arc::clone(&self.remote);
        let events = self.events.clone();
        self.flights
            .spawn(async move { send(remote, identity, batch, events).await });
    }

    async fn drain(&mut self) {
        self.deadline = None;
        self.flush();
        while let Some(joined) = self.flights.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Sync flush task failed: {e}");
            }
        }
    }
}

async fn send<R: RemoteProgressStore>(
    remote: Arc<R>,
    identity: Identity,
    batch: PendingSyncBatch,
    events: broadcast::Sender<SyncEvent>,
) {
    let count = batch.len();
    match remote.push(&identity, &batch).await {
        Ok(()) => {
            tracing::info!(count, "Flushed progress to remote");
            let _ = events.send(SyncEvent::Flushed { count });
        }
        Err(e) => {
            tracing::warn!(count, "Progress sync failed, batch dropped: {e}");
            let _ = events.send(SyncEvent::Failed {
                count,
                message: e.to_string(),
            });
        }
    }
}
