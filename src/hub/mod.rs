//! Flat publish/subscribe router between the channels and the mission components.

mod message_hub;

pub use message_hub::{Binding, MessageHub, ObserverHandle};
