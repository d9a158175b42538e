use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;

use tsukimi_bridge::{MessagePort, PortHandler, PortMessage, PortSubscription};

/// Messages posted to the page's `window`.
pub struct WindowMessagePort {
    window: web_sys::Window,
}

impl WindowMessagePort {
    pub fn new() -> Option<Self> {
        web_sys::window().map(|window| Self { window })
    }
}

impl MessagePort for WindowMessagePort {
    fn subscribe(&self, handler: PortHandler) -> PortSubscription {
        let closure = Closure::wrap(Box::new(move |event: web_sys::MessageEvent| {
            // Non-JSON payloads (transferables, DOM nodes) carry nothing we read.
            let data = serde_wasm_bindgen::from_value(event.data())
                .unwrap_or(serde_json::Value::Null);
            handler(&PortMessage {
                origin: event.origin(),
                data,
            });
        }) as Box<dyn Fn(web_sys::MessageEvent)>);

        if let Err(e) = self
            .window
            .add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())
        {
            tracing::warn!("Failed to attach message listener: {e:?}");
        }

        let window = self.window.clone();
        PortSubscription::new(move || {
            let _ = window
                .remove_event_listener_with_callback("message", closure.as_ref().unchecked_ref());
            drop(closure);
        })
    }
}
