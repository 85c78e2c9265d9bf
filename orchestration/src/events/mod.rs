//! Per-session event delivery

pub mod broadcaster;
pub mod types;

pub use broadcaster::{EventBroadcaster, SharedEventBroadcaster, SubscriberId, Subscription};
pub use types::SessionEvent;
