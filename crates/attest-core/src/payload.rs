//! Decrypted payload schema (protobuf)

use prost::Message;

/// Top-level message inside a verified token
#[derive(Clone, PartialEq, Message)]
pub struct ProfilePayload {
    #[prost(string, tag = "1")]
    pub receipt_id: String,
    #[prost(string, tag = "2")]
    pub remember_me_id: String,
    #[prost(string, tag = "3")]
    pub parent_remember_me_id: String,
    #[prost(uint64, tag = "4")]
    pub timestamp_micros: u64,
    #[prost(message, repeated, tag = "5")]
    pub attributes: Vec<AttributeRecord>,
}

/// One named, typed attribute as sent by the service
#[derive(Clone, PartialEq, Message)]
pub struct AttributeRecord {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
    /// Raw discriminator; kept as an integer so unknown kinds survive decoding
    #[prost(int32, tag = "3")]
    pub content_type: i32,
    #[prost(message, repeated, tag = "4")]
    pub anchors: Vec<AnchorRecord>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AnchorRecord {
    #[prost(string, tag = "1")]
    pub anchor_type: String,
    #[prost(string, tag = "2")]
    pub sub_type: String,
    #[prost(uint64, tag = "3")]
    pub signed_timestamp_micros: u64,
    #[prost(string, tag = "4")]
    pub issuing_entity: String,
    #[prost(string, tag = "5")]
    pub value: String,
}

/// Known content type discriminators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ContentType {
    String = 1,
    Jpeg = 2,
    Date = 3,
    Png = 4,
    Json = 5,
    Int = 7,
}

impl ContentType {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Self::String),
            2 => Some(Self::Jpeg),
            3 => Some(Self::Date),
            4 => Some(Self::Png),
            5 => Some(Self::Json),
            7 => Some(Self::Int),
            _ => None,
        }
    }
}

impl ProfilePayload {
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(bytes)
    }

    pub fn encode_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }
}
