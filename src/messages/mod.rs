//! Wire schemas of every service the mission talks to, and the static message identifiers
//! the hub and the state machine route on.
//!
//! Each schema module holds `prost` types for its command and event sets. Variants carry
//! `strum` discriminants, so the (schema, kind, variant) identifier of a message is known
//! without looking at its payload.

pub(crate) mod flight;
pub(crate) mod guidance;
pub(crate) mod operator;
pub(crate) mod perception;

use std::fmt::{Display, Formatter};
use strum_macros::{Display, IntoStaticStr};

/// The schema a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SchemaName {
    Link,
    Operator,
    Flight,
    Guidance,
    Perception,
}

/// Whether a message is a connection status, a command or an event of its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Kind {
    Status,
    Command,
    Event,
}

/// Static routing key of a message: `(schema, kind, variant)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId {
    schema: SchemaName,
    kind: Kind,
    variant: &'static str,
}

impl MessageId {
    pub const fn new(schema: SchemaName, kind: Kind, variant: &'static str) -> Self {
        Self { schema, kind, variant }
    }

    pub fn schema(&self) -> SchemaName { self.schema }
    pub fn kind(&self) -> Kind { self.kind }
    pub fn variant(&self) -> &'static str { self.variant }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.schema, self.kind, self.variant)
    }
}

/// Connection status changes surfaced by the channel manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

impl From<LinkStatus> for MessageId {
    fn from(value: LinkStatus) -> Self { MessageId::new(SchemaName::Link, Kind::Status, value.into()) }
}

/// Everything that can be dispatched through the hub.
///
/// Inbound traffic only: commands received from the operator, events received from the
/// services, and link status changes.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Link(LinkStatus),
    Operator(operator::Command),
    Flight(flight::Event),
    Guidance(guidance::Event),
    Perception(perception::Event),
}

impl Message {
    /// Resolves the routing identifier from the variant tag alone.
    pub fn id(&self) -> MessageId {
        match self {
            Message::Link(status) => MessageId::from(*status),
            Message::Operator(cmd) => MessageId::from(operator::CommandKind::from(cmd)),
            Message::Flight(ev) => MessageId::from(flight::EventKind::from(ev)),
            Message::Guidance(ev) => MessageId::from(guidance::EventKind::from(ev)),
            Message::Perception(ev) => MessageId::from(perception::EventKind::from(ev)),
        }
    }
}

/// A frame that could not be turned into a [`Message`].
#[derive(Debug, Display)]
pub enum ProtocolError {
    Malformed(prost::DecodeError),
    EmptyFrame,
}

impl std::error::Error for ProtocolError {}

impl From<prost::DecodeError> for ProtocolError {
    fn from(value: prost::DecodeError) -> Self { ProtocolError::Malformed(value) }
}

/// Binds a wire schema to the direction the mission uses it in.
///
/// `Outbound` is what a [`ServicePair`](crate::service::ServicePair) sends over its channel,
/// inbound frames decode straight into a [`Message`].
pub trait Schema {
    const NAME: SchemaName;
    type Outbound: Clone + std::fmt::Debug;

    fn outbound_id(message: &Self::Outbound) -> MessageId;
    fn encode(message: &Self::Outbound) -> Vec<u8>;
    fn decode(frame: &[u8]) -> Result<Message, ProtocolError>;
}

/// Decodes a length-stripped frame into its envelope type.
pub(crate) fn decode_envelope<T: prost::Message + Default>(frame: &[u8]) -> Result<T, ProtocolError> {
    Ok(T::decode(frame)?)
}

/// Encodes an envelope into a frame body.
pub(crate) fn encode_envelope<T: prost::Message>(envelope: &T) -> Vec<u8> { envelope.encode_to_vec() }
