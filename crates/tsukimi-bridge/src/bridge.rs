use std::sync::Arc;

use tsukimi_core::listeners::{Listener, ListenerSet, Subscription};

use crate::envelope::{decode_envelope, PlayerEvent};
use crate::origin::AllowList;
use crate::port::{MessagePort, PortHandler, PortMessage, PortSubscription};

/// Filters raw port traffic down to trusted player telemetry.
///
/// The bridge holds exactly one port subscription for its whole life and
/// detaches when dropped, so a torn-down player can no longer deliver events.
pub struct EventBridge {
    listeners: ListenerSet<PlayerEvent>,
    allow_list: Arc<AllowList>,
    _port: PortSubscription,
}

impl EventBridge {
    pub fn attach(port: &impl MessagePort, allow_list: AllowList) -> Self {
        let listeners = ListenerSet::new();
        let allow_list = Arc::new(allow_list);

        let handler: PortHandler = {
            let listeners = listeners.clone();
            let allow_list = Arc::clone(&allow_list);
            Arc::new(move |message: &PortMessage| {
                dispatch(&allow_list, &listeners, message);
            })
        };
        let port = port.subscribe(handler);
        tracing::debug!(origins = allow_list.len(), "Event bridge attached");

        Self {
            listeners,
            allow_list,
            _port: port,
        }
    }

    /// Register a listener. Adding the same listener twice is a no-op.
    pub fn add_listener(&self, listener: &Listener<PlayerEvent>) -> bool {
        self.listeners.add(listener)
    }

    /// Unregister a listener. Unknown listeners are ignored.
    pub fn remove_listener(&self, listener: &Listener<PlayerEvent>) -> bool {
        self.listeners.remove(listener)
    }

    pub fn subscribe(&self, listener: Listener<PlayerEvent>) -> Subscription<PlayerEvent> {
        self.listeners.subscribe(listener)
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

fn dispatch(allow_list: &AllowList, listeners: &ListenerSet<PlayerEvent>, message: &PortMessage) {
    // Content from an untrusted origin is never looked at.
    if !allow_list.allows(&message.origin) {
        tracing::trace!(origin = %message.origin, "Dropping message from untrusted origin");
        return;
    }
    match decode_envelope(&message.data) {
        Ok(event) => listeners.emit(&event),
        Err(e) => tracing::debug!(origin = %message.origin, error = %e, "Ignoring message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::{json, Value};

    use crate::port::ChannelPort;

    const PLAYER: &str = "https://vidsrc.cc";

    fn recorder() -> (Arc<Mutex<Vec<PlayerEvent>>>, Listener<PlayerEvent>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: Listener<PlayerEvent> = Arc::new(move |event: &PlayerEvent| {
            sink.lock().unwrap().push(event.clone());
        });
        (seen, listener)
    }

    fn tick(time: f64) -> Value {
        json!({ "type": "PLAYER_EVENT", "data": { "event": "timeupdate", "currentTime": time } })
    }

    #[test]
    fn test_untrusted_origin_never_reaches_listeners() {
        let port = ChannelPort::new();
        let bridge = EventBridge::attach(&port, AllowList::new([PLAYER]));
        let (seen, listener) = recorder();
        bridge.add_listener(&listener);

        let payloads = [
            tick(1.0),
            Value::String(tick(2.0).to_string()),
            json!({ "type": "PLAYER_EVENT", "data": "{}" }),
            json!(null),
            json!("garbage"),
        ];
        for origin in [
            "https://evil.example",
            "null",
            "",
            "http://vidsrc.cc",
            "https://vidsrc.cc.evil.example",
        ] {
            for payload in &payloads {
                port.post(origin, payload.clone());
            }
        }
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_events_arrive_in_order() {
        let port = ChannelPort::new();
        let bridge = EventBridge::attach(&port, AllowList::new([PLAYER]));
        let (seen, listener) = recorder();
        bridge.add_listener(&listener);

        port.post(PLAYER, tick(1.0));
        port.post(PLAYER, json!({ "type": "OTHER" }));
        port.post(PLAYER, tick(2.0));
        port.post(PLAYER, Value::String(tick(3.0).to_string()));

        let times: Vec<_> = seen.lock().unwrap().iter().map(|e| e.current_time).collect();
        assert_eq!(times, vec![Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_listener_add_remove_semantics() {
        let port = ChannelPort::new();
        let bridge = EventBridge::attach(&port, AllowList::new([PLAYER]));
        let (seen, listener) = recorder();

        assert!(bridge.add_listener(&listener));
        assert!(!bridge.add_listener(&listener));
        port.post(PLAYER, tick(1.0));
        assert_eq!(seen.lock().unwrap().len(), 1);

        assert!(bridge.remove_listener(&listener));
        assert!(!bridge.remove_listener(&listener));
        port.post(PLAYER, tick(2.0));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_dropping_bridge_detaches_from_port() {
        let port = ChannelPort::new();
        let bridge = EventBridge::attach(&port, AllowList::new([PLAYER]));
        let (seen, listener) = recorder();
        let _subscription = bridge.subscribe(listener);
        assert_eq!(port.subscriber_count(), 1);

        drop(bridge);
        assert_eq!(port.subscriber_count(), 0);
        port.post(PLAYER, tick(1.0));
        assert!(seen.lock().unwrap().is_empty());
    }
}
