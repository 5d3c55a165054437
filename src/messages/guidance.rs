//! Guidance subsystem schema.

use super::{Kind, Message, MessageId, ProtocolError, Schema, SchemaName};
use std::collections::BTreeMap;
use strum_macros::{EnumDiscriminants, EnumIter, IntoStaticStr};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Request {
    #[prost(oneof = "Command", tags = "1, 2, 3")]
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

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigureMode {
    #[prost(string, tag = "1")]
    pub mode: String,
    #[prost(btree_map = "string, string", tag = "2")]
    pub params: BTreeMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModeApplied {
    #[prost(string, tag = "1")]
    pub mode: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Fault {
    #[prost(string, tag = "1")]
    pub reason: String,
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
    #[prost(message, tag = "3")]
    ConfigureMode(ConfigureMode),
}

#[derive(Clone, PartialEq, prost::Oneof, EnumDiscriminants)]
#[strum_discriminants(
    name(EventKind),
    derive(Hash, IntoStaticStr, EnumIter),
    strum(serialize_all = "snake_case")
)]
pub enum Event {
    #[prost(message, tag = "1")]
    ModeApplied(ModeApplied),
    #[prost(message, tag = "2")]
    Fault(Fault),
}

impl From<CommandKind> for MessageId {
    fn from(value: CommandKind) -> Self { MessageId::new(SchemaName::Guidance, Kind::Command, value.into()) }
}

impl From<EventKind> for MessageId {
    fn from(value: EventKind) -> Self { MessageId::new(SchemaName::Guidance, Kind::Event, value.into()) }
}

pub struct GuidanceApi;

impl Schema for GuidanceApi {
    const NAME: SchemaName = SchemaName::Guidance;
    type Outbound = Command;

    fn outbound_id(message: &Command) -> MessageId { MessageId::from(CommandKind::from(message)) }

    fn encode(message: &Command) -> Vec<u8> {
        super::encode_envelope(&Request { content: Some(message.clone()) })
    }

    fn decode(frame: &[u8]) -> Result<Message, ProtocolError> {
        super::decode_envelope::<Report>(frame)?
            .content
            .map(Message::Guidance)
            .ok_or(ProtocolError::EmptyFrame)
    }
}
