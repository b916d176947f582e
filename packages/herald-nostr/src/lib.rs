//! Nostr wire model, key handling and relay publishing.

pub mod broadcast;
pub mod event;
pub mod keys;
pub mod relay;
pub mod subscription;

mod error;

pub use broadcast::{BroadcastReport, Broadcaster, RelayFailure};
pub use error::{Error, Result};
pub use event::{Event, EventTemplate, Tag};
pub use keys::{Keys, npub, verify};
pub use relay::{RelayClient, WebSocketRelay};
pub use subscription::{Filter, Subscription};

use std::{future::Future, pin::Pin};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Live activity (NIP-53).
pub const KIND_LIVE_ACTIVITY: u16 = 30_311;
/// Interactive room, addressable by its `d` tag.
pub const KIND_INTERACTIVE_ROOM: u16 = 30_312;
/// Conference event scheduled inside an interactive room.
pub const KIND_ROOM_MEETING: u16 = 30_313;
