//! A mounted player: bridge subscription, overlay timers and progress hook,
//! all torn down together when the session is dropped.

use std::sync::Arc;

use tokio::sync::watch;

use tsukimi_bridge::{AllowList, EventBridge, MessagePort, PlayerEvent, PlayerEventKind};
use tsukimi_core::listeners::{Listener, Subscription};
use tsukimi_core::overlay::{OverlayEvent, OverlayState, OverlayTimings};
use tsukimi_core::selection::SelectionTicket;

use crate::overlay::OverlayDriver;

/// How the player was mounted.
#[derive(Debug, Clone, Copy)]
pub struct Mount {
    pub ticket: SelectionTicket,
    /// The title already has progress, so show the resume banner.
    pub resuming: bool,
    pub muted: bool,
}

pub struct PlayerSession {
    ticket: SelectionTicket,
    overlay: OverlayDriver,
    _hooks: Vec<Subscription<PlayerEvent>>,
    bridge: EventBridge,
}

impl PlayerSession {
    /// Attach to `port` and start routing trusted telemetry to the overlay
    /// and to `hook`.
    pub fn start(
        port: &impl MessagePort,
        allow_list: AllowList,
        timings: OverlayTimings,
        mount: Mount,
        hook: Option<Listener<PlayerEvent>>,
    ) -> Self {
        let bridge = EventBridge::attach(port, allow_list);
        let overlay = OverlayDriver::spawn(timings);
        overlay.send(OverlayEvent::Mounted {
            resuming: mount.resuming,
            muted: mount.muted,
        });

        let forward: Listener<PlayerEvent> = {
            let tx = overlay.sender();
            Arc::new(move |event: &PlayerEvent| {
                for overlay_event in overlay_events(event) {
                    let _ = tx.send(overlay_event);
                }
            })
        };
        let mut hooks = vec![bridge.subscribe(forward)];
        if let Some(hook) = hook {
            hooks.push(bridge.subscribe(hook));
        }

        tracing::debug!(ticket = mount.ticket.value(), "Player session started");
        Self {
            ticket: mount.ticket,
            overlay,
            _hooks: hooks,
            bridge,
        }
    }

    pub fn ticket(&self) -> SelectionTicket {
        self.ticket
    }

    pub fn overlay_state(&self) -> OverlayState {
        self.overlay.state()
    }

    pub fn watch_overlay(&self) -> watch::Receiver<OverlayState> {
        self.overlay.watch()
    }

    pub fn user_activity(&self) {
        self.overlay.send(OverlayEvent::UserActivity);
    }

    pub fn dismiss_resume(&self) {
        self.overlay.send(OverlayEvent::DismissResume);
    }

    pub fn bridge(&self) -> &EventBridge {
        &self.bridge
    }
}

/// Overlay inputs carried by one telemetry message.
fn overlay_events(event: &PlayerEvent) -> Vec<OverlayEvent> {
    let mut events = Vec::new();
    if let Some(muted) = event.muted {
        events.push(OverlayEvent::MuteChanged { muted });
    }
    if let (Some(current_time), Some(duration)) = (event.current_time, event.duration) {
        events.push(OverlayEvent::Progress {
            current_time,
            duration,
        });
    }
    if matches!(
        event.kind,
        Some(PlayerEventKind::Ended | PlayerEventKind::Complete)
    ) {
        events.push(OverlayEvent::Ended);
    }
    events
}
