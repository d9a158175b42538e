//! Cross-origin event bridge between embedded players and the app.
//!
//! Messages arrive through a [`MessagePort`], are checked against an
//! [`AllowList`] of player origins, unwrapped from their `PLAYER_EVENT`
//! envelope and handed to listeners in arrival order.

mod bridge;
mod envelope;
mod error;
mod origin;
mod port;

pub use bridge::EventBridge;
pub use envelope::{decode_envelope, PlayerEvent, PlayerEventKind, PLAYER_EVENT_TYPE};
pub use error::BridgeError;
pub use origin::{AllowList, Origin};
pub use port::{ChannelPort, MessagePort, PortHandler, PortMessage, PortSubscription};
