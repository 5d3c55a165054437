//! Typed command/event bindings layered over the mission's channels.

mod service_pair;

pub use service_pair::{PairError, ServicePair};
