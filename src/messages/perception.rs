//! Perception service schema.

use super::{Kind, Message, MessageId, ProtocolError, Schema, SchemaName};
use strum_macros::{EnumDiscriminants, EnumIter, IntoStaticStr};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Request {
    #[prost(oneof = "Command", tags = "1, 2")]
    pub content: Option<Command>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Report {
    #[prost(oneof = "Event", tags = "1, 2")]
    pub content: Option<Event>,
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Start {}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Stop {}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Count {
    #[prost(uint32, tag = "1")]
    pub tally: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Detection {
    #[prost(string, tag = "1")]
    pub label: String,
    #[prost(float, tag = "2")]
    pub confidence: f32,
}

#[derive(Clone, PartialEq, prost::Oneof, EnumDiscriminants)]
#[strum_discriminants(
    name(CommandKind),
    derive(Hash, IntoStaticStr, EnumIter),
    strum(serialize_all = "snake_case")
)]
pub enum Command {
    #[prost(message, tag = "1")]
    Start(Start),
    #[prost(message, tag = "2")]
    Stop(Stop),
}

#[derive(Clone, PartialEq, prost::Oneof, EnumDiscriminants)]
#[strum_discriminants(
    name(EventKind),
    derive(Hash, IntoStaticStr, EnumIter),
    strum(serialize_all = "snake_case")
)]
pub enum Event {
    #[prost(message, tag = "1")]
    Count(Count),
    #[prost(message, tag = "2")]
    Detection(Detection),
}

impl From<CommandKind> for MessageId {
    fn from(value: CommandKind) -> Self { MessageId::new(SchemaName::Perception, Kind::Command, value.into()) }
}

impl From<EventKind> for MessageId {
    fn from(value: EventKind) -> Self { MessageId::new(SchemaName::Perception, Kind::Event, value.into()) }
}

pub struct PerceptionApi;

impl Schema for PerceptionApi {
    const NAME: SchemaName = SchemaName::Perception;
    type Outbound = Command;

    fn outbound_id(message: &Command) -> MessageId { MessageId::from(CommandKind::from(message)) }

    fn encode(message: &Command) -> Vec<u8> {
        super::encode_envelope(&Request { content: Some(message.clone()) })
    }

    fn decode(frame: &[u8]) -> Result<Message, ProtocolError> {
        super::decode_envelope::<Report>(frame)?
            .content
            .map(Message::Perception)
            .ok_or(ProtocolError::EmptyFrame)
    }
}
