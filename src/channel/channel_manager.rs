use super::endpoint::{Endpoint, EndpointError};
use crate::messages::LinkStatus;
use crate::{event, info, log, warn};
use std::{collections::BTreeMap, fmt::Display, sync::Arc};
use strum_macros::Display;
use tokio::sync::mpsc;

/// Logical name of a channel, e.g. `"guidance"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(Arc<str>);

impl ChannelName {
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for ChannelName {
    fn from(value: &str) -> Self { Self(Arc::from(value)) }
}

impl Display for ChannelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

/// Handle to an open channel. The generation distinguishes a re-opened channel of the same
/// name from a closed predecessor, so traffic of the old link can never leak into the new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    name: ChannelName,
    generation: u64,
}

impl Channel {
    pub fn name(&self) -> &ChannelName { &self.name }
    pub fn generation(&self) -> u64 { self.generation }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Display)]
pub enum ChannelError {
    BadEndpoint(EndpointError),
    NotOpen,
    NotConnected,
    LinkClosed,
}

impl std::error::Error for ChannelError {}

impl From<EndpointError> for ChannelError {
    fn from(value: EndpointError) -> Self { ChannelError::BadEndpoint(value) }
}

/// Raw notification pushed by a transport link into the event loop inbox.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkEvent {
    pub channel: ChannelName,
    pub generation: u64,
    pub kind: LinkEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEventKind {
    Connected,
    Disconnected,
    Frame(Vec<u8>),
}

/// What a transport needs to know to establish a link.
#[derive(Debug, Clone)]
pub struct LinkTarget {
    pub channel: ChannelName,
    pub generation: u64,
    pub endpoint: Endpoint,
}

impl LinkTarget {
    pub fn event(&self, kind: LinkEventKind) -> LinkEvent {
        LinkEvent { channel: self.channel.clone(), generation: self.generation, kind }
    }
}

/// Outbound half of an established transport link.
pub trait Link {
    /// Queues a frame body for transmission. Must not block.
    fn transmit(&mut self, frame: Vec<u8>) -> Result<(), ChannelError>;
    /// Stops the link. No events may be produced afterwards.
    fn shutdown(&mut self);
}

/// Transport collaborator: turns an endpoint into a running link that reports connection
/// changes and inbound frames as [`LinkEvent`]s. Reconnecting is the connector's business.
pub trait Connector {
    fn connect(&self, target: LinkTarget, events: mpsc::UnboundedSender<LinkEvent>) -> Box<dyn Link>;
}

/// A link event that survived filtering and matters to the rest of the mission.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    Status(Channel, LinkStatus),
    Frame(Channel, Vec<u8>),
}

struct ChannelEntry {
    endpoint: Endpoint,
    generation: u64,
    state: ChannelState,
    link: Box<dyn Link>,
}

/// Owns every logical channel of the mission and tracks its connection state.
pub struct ChannelManager {
    connector: Box<dyn Connector>,
    events: mpsc::UnboundedSender<LinkEvent>,
    channels: BTreeMap<ChannelName, ChannelEntry>,
    next_generation: u64,
}

impl ChannelManager {
    pub fn new(connector: Box<dyn Connector>, events: mpsc::UnboundedSender<LinkEvent>) -> Self {
        Self { connector, events, channels: BTreeMap::new(), next_generation: 1 }
    }

    /// Opens the channel `name` towards `endpoint`, or returns the existing handle if a
    /// channel with that name is already open.
    ///
    /// # Arguments
    /// - `name`: Logical channel name.
    /// - `endpoint`: Endpoint configuration string, e.g. `unix:///run/guidance.sock`.
    ///
    /// # Returns
    /// A handle to the channel, or `ChannelError::BadEndpoint` if `endpoint` cannot be parsed.
    pub fn open(&mut self, name: &str, endpoint: &str) -> Result<Channel, ChannelError> {
        let name = ChannelName::from(name);
        let endpoint = Endpoint::try_from(endpoint)?;
        if let Some(entry) = self.channels.get(&name) {
            if entry.endpoint != endpoint {
                warn!("Channel {name} already open on {}, ignoring {endpoint}", entry.endpoint);
            }
            return Ok(Channel { name, generation: entry.generation });
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        let target = LinkTarget { channel: name.clone(), generation, endpoint: endpoint.clone() };
        let link = self.connector.connect(target, self.events.clone());
        info!("Opened channel {name} on {endpoint}");
        self.channels.insert(
            name.clone(),
            ChannelEntry { endpoint, generation, state: ChannelState::Connecting, link },
        );
        Ok(Channel { name, generation })
    }

    /// Closes `channel` and shuts its link down.
    ///
    /// # Returns
    /// `false` if the channel was already closed (or re-opened under a new generation).
    pub fn close(&mut self, channel: &Channel) -> bool {
        match self.channels.get(&channel.name) {
            Some(entry) if entry.generation == channel.generation => {}
            _ => return false,
        }
        if let Some(mut entry) = self.channels.remove(&channel.name) {
            entry.link.shutdown();
            info!("Closed channel {} ({})", channel.name, entry.endpoint);
        }
        true
    }

    /// Filters a raw link event against the current channel table.
    ///
    /// Status changes are only surfaced when the state actually changes, frames only while
    /// the channel is connected. Events from closed channels are dropped.
    pub fn accept(&mut self, event: LinkEvent) -> Option<ChannelSignal> {
        let Some(entry) = self.channels.get_mut(&event.channel) else {
            event!("Dropping link event for closed channel {}", event.channel);
            return None;
        };
        if entry.generation != event.generation {
            event!("Dropping stale link event for channel {}", event.channel);
            return None;
        }
        let channel = Channel { name: event.channel, generation: event.generation };
        match event.kind {
            LinkEventKind::Connected => {
                if entry.state == ChannelState::Connected {
                    return None;
                }
                entry.state = ChannelState::Connected;
                log!("Channel {} connected", channel.name);
                Some(ChannelSignal::Status(channel, LinkStatus::Connected))
            }
            LinkEventKind::Disconnected => {
                if entry.state == ChannelState::Disconnected {
                    return None;
                }
                entry.state = ChannelState::Disconnected;
                log!("Channel {} disconnected", channel.name);
                Some(ChannelSignal::Status(channel, LinkStatus::Disconnected))
            }
            LinkEventKind::Frame(frame) => {
                if entry.state != ChannelState::Connected {
                    event!("Dropping frame on unconnected channel {}", channel.name);
                    return None;
                }
                Some(ChannelSignal::Frame(channel, frame))
            }
        }
    }

    /// Hands a frame to the channel's link.
    pub fn transmit(&mut self, channel: &Channel, frame: Vec<u8>) -> Result<(), ChannelError> {
        let entry = self.live_entry_mut(channel).ok_or(ChannelError::NotOpen)?;
        if entry.state != ChannelState::Connected {
            return Err(ChannelError::NotConnected);
        }
        entry.link.transmit(frame)
    }

    /// Current state of `channel`, `None` once it is closed.
    pub fn state(&self, channel: &Channel) -> Option<ChannelState> {
        self.channels
            .get(&channel.name)
            .filter(|entry| entry.generation == channel.generation)
            .map(|entry| entry.state)
    }

    /// Handle of the open channel called `name`.
    pub fn channel(&self, name: &str) -> Option<Channel> {
        let name = ChannelName::from(name);
        let generation = self.channels.get(&name)?.generation;
        Some(Channel { name, generation })
    }

    pub fn open_count(&self) -> usize { self.channels.len() }

    fn live_entry_mut(&mut self, channel: &Channel) -> Option<&mut ChannelEntry> {
        self.channels.get_mut(&channel.name).filter(|entry| entry.generation == channel.generation)
    }
}
