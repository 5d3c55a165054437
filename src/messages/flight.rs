//! Flight controller schema.

use super::{Kind, Message, MessageId, ProtocolError, Schema, SchemaName};
use strum_macros::{EnumDiscriminants, EnumIter, IntoStaticStr};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Request {
    #[prost(oneof = "Command", tags = "1")]
    pub content: Option<Command>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Report {
    #[prost(oneof = "Event", tags = "1, 2, 3")]
    pub content: Option<Event>,
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct SetEstimationMode {
    #[prost(enumeration = "EstimationMode", tag = "1")]
    pub mode: i32,
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Status {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(bool, tag = "2")]
    pub armed: bool,
    #[prost(float, tag = "3")]
    pub altitude_m: f32,
    #[prost(float, tag = "4")]
    pub battery: f32,
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Airborne {}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct Landed {}

#[derive(Clone, PartialEq, prost::Oneof, EnumDiscriminants)]
#[strum_discriminants(
    name(CommandKind),
    derive(Hash, IntoStaticStr, EnumIter),
    strum(serialize_all = "snake_case")
)]
pub enum Command {
    #[prost(message, tag = "1")]
    SetEstimationMode(SetEstimationMode),
}

#[derive(Clone, PartialEq, prost::Oneof, EnumDiscriminants)]
#[strum_discriminants(
    name(EventKind),
    derive(Hash, IntoStaticStr, EnumIter),
    strum(serialize_all = "snake_case")
)]
pub enum Event {
    #[prost(message, tag = "1")]
    Status(Status),
    #[prost(message, tag = "2")]
    Airborne(Airborne),
    #[prost(message, tag = "3")]
    Landed(Landed),
}

/// State estimation source the flight controller should fuse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum EstimationMode {
    None = 0,
    Ground = 1,
    Inertial = 2,
    Visual = 3,
}

impl EstimationMode {
    /// String value of the enum field names used in the `ProtoBuf` definition.
    pub fn as_str_name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ground => "ground",
            Self::Inertial => "inertial",
            Self::Visual => "visual",
        }
    }
}

impl From<CommandKind> for MessageId {
    fn from(value: CommandKind) -> Self { MessageId::new(SchemaName::Flight, Kind::Command, value.into()) }
}

impl From<EventKind> for MessageId {
    fn from(value: EventKind) -> Self { MessageId::new(SchemaName::Flight, Kind::Event, value.into()) }
}

pub struct FlightApi;

impl Schema for FlightApi {
    const NAME: SchemaName = SchemaName::Flight;
    type Outbound = Command;

    fn outbound_id(message: &Command) -> MessageId { MessageId::from(CommandKind::from(message)) }

    fn encode(message: &Command) -> Vec<u8> {
        super::encode_envelope(&Request { content: Some(message.clone()) })
    }

    fn decode(frame: &[u8]) -> Result<Message, ProtocolError> {
        super::decode_envelope::<Report>(frame)?
            .content
            .map(Message::Flight)
            .ok_or(ProtocolError::EmptyFrame)
    }
}
