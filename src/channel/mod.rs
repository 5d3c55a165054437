//! Logical channels to the remote services and their transport links.

mod channel_manager;
mod endpoint;
#[cfg(test)]
pub(crate) mod loopback;
mod socket_link;

pub use channel_manager::{
    Channel, ChannelError, ChannelManager, ChannelName, ChannelSignal, ChannelState, Connector,
    LinkEvent,
};
pub use socket_link::SocketConnector;
#[cfg(test)]
pub use {channel_manager::LinkEventKind, endpoint::Endpoint};
