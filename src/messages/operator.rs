//! Operator interface schema. The mission serves this one: commands come in from the
//! operator console, events go out to it.

use super::{Kind, Message, MessageId, ProtocolError, Schema, SchemaName};
use strum_macros::{EnumDiscriminants, EnumIter, IntoStaticStr};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Upstream {
    #[prost(oneof = "Command", tags = "1, 2, 3, 4, 5")]
    pub content: Option<Command>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Downstream {
    #[prost(oneof = "Event", tags = "1, 2, 3, 4")]
    pub content: Option<Event>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ping {
    #[prost(string, optional, tag = "1")]
    pub echo: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Say {
    #[prost(string, optional, tag = "1")]
    pub text: Option<String>,
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Hold {}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Takeoff {
    #[prost(float, tag = "1")]
    pub altitude_m: f32,
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Land {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Pong {
    #[prost(string, optional, tag = "1")]
    pub echo: Option<String>,
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Count {
    #[prost(uint64, tag = "1")]
    pub value: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StateReport {
    #[prost(string, tag = "1")]
    pub path: String,
    #[prost(uint64, tag = "2")]
    pub transitions: u64,
    /// False when the last mode change of the mission could not be fully sent.
    #[prost(bool, tag = "3")]
    pub mode_ok: bool,
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Telemetry {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(bool, tag = "2")]
    pub armed: bool,
    #[prost(float, tag = "3")]
    pub altitude_m: f32,
    #[prost(float, tag = "4")]
    pub battery: f32,
}

#[derive(Clone, PartialEq, prost::Oneof, EnumDiscriminants)]
#[strum_discriminants(
    name(CommandKind),
    derive(Hash, IntoStaticStr, EnumIter),
    strum(serialize_all = "snake_case")
)]
pub enum Command {
    #[prost(message, tag = "1")]
    Ping(Ping),
    #[prost(message, tag = "2")]
    Say(Say),
    #[prost(message, tag = "3")]
    Hold(Hold),
    #[prost(message, tag = "4")]
    Takeoff(Takeoff),
    #[prost(message, tag = "5")]
    Land(Land),
}

#[derive(Clone, PartialEq, prost::Oneof, EnumDiscriminants)]
#[strum_discriminants(
    name(EventKind),
    derive(Hash, IntoStaticStr, EnumIter),
    strum(serialize_all = "snake_case")
)]
pub enum Event {
    #[prost(message, tag = "1")]
    Pong(Pong),
    #[prost(message, tag = "2")]
    Count(Count),
    #[prost(message, tag = "3")]
    StateReport(StateReport),
    #[prost(message, tag = "4")]
    Telemetry(Telemetry),
}

impl From<CommandKind> for MessageId {
    fn from(value: CommandKind) -> Self { MessageId::new(SchemaName::Operator, Kind::Command, value.into()) }
}

impl From<EventKind> for MessageId {
    fn from(value: EventKind) -> Self { MessageId::new(SchemaName::Operator, Kind::Event, value.into()) }
}

pub struct OperatorApi;

impl Schema for OperatorApi {
    const NAME: SchemaName = SchemaName::Operator;
    type Outbound = Event;

    fn outbound_id(message: &Event) -> MessageId { MessageId::from(EventKind::from(message)) }

    fn encode(message: &Event) -> Vec<u8> {
        super::encode_envelope(&Downstream { content: Some(message.clone()) })
    }

    fn decode(frame: &[u8]) -> Result<Message, ProtocolError> {
        super::decode_envelope::<Upstream>(frame)?
            .content
            .map(Message::Operator)
            .ok_or(ProtocolError::EmptyFrame)
    }
}
