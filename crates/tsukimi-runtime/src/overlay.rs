//! Timer ownership for the overlay coordinator.
//!
//! Timers live only as [`ScopedTimer`]s inside the driver task: re-arming a
//! kind drops (and aborts) the previous timer, and dropping the driver aborts
//! the task together with every timer it owns.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use tsukimi_core::overlay::{
    OverlayCoordinator, OverlayEvent, OverlayState, OverlayTimings, TimerCommand, TimerKind,
};

/// A spawned task that is aborted when this value is dropped.
#[derive(Debug)]
pub struct ScopedTimer {
    handle: JoinHandle<()>,
}

impl ScopedTimer {
    /// Deliver `event` on `tx` after `delay`, unless dropped first.
    pub fn after(
        delay: Duration,
        tx: mpsc::WeakUnboundedSender<OverlayEvent>,
        event: OverlayEvent,
    ) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(event);
            }
        });
        Self { handle }
    }

    fn wrap(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Runs an [`OverlayCoordinator`] and publishes its state.
pub struct OverlayDriver {
    tx: mpsc::UnboundedSender<OverlayEvent>,
    state: watch::Receiver<OverlayState>,
    _task: ScopedTimer,
}

impl OverlayDriver {
    pub fn spawn(timings: OverlayTimings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(OverlayState::Idle);
        let task = tokio::spawn(drive(
            OverlayCoordinator::new(timings),
            rx,
            tx.downgrade(),
            state_tx,
        ));
        Self {
            tx,
            state,
            _task: ScopedTimer::wrap(task),
        }
    }

    pub fn send(&self, event: OverlayEvent) {
        let _ = self.tx.send(event);
    }

    /// Sender for forwarding events from other tasks or listeners.
    pub fn sender(&self) -> mpsc::UnboundedSender<OverlayEvent> {
        self.tx.clone()
    }

    pub fn state(&self) -> OverlayState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<OverlayState> {
        self.state.clone()
    }
}

async fn drive(
    mut coordinator: OverlayCoordinator,
    mut rx: mpsc::UnboundedReceiver<OverlayEvent>,
    timer_tx: mpsc::WeakUnboundedSender<OverlayEvent>,
    state_tx: watch::Sender<OverlayState>,
) {
    let mut timers: HashMap<TimerKind, ScopedTimer> = HashMap::new();

    while let Some(event) = rx.recv().await {
        for command in coordinator.handle(event) {
            match command {
                TimerCommand::Arm {
                    kind,
                    delay,
                    generation,
                } => {
                    let elapsed = OverlayEvent::TimerElapsed { kind, generation };
                    timers.insert(kind, ScopedTimer::after(delay, timer_tx.clone(), elapsed));
                }
                TimerCommand::Cancel(kind) => {
                    timers.remove(&kind);
                }
                TimerCommand::CancelAll => timers.clear(),
            }
        }
        let next = coordinator.state();
        state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
