//! Protocol error types

use std::fmt;

/// Why bytes from the broker could not be turned into a [`Packet`](super::Packet)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A field ran past the end of the packet body
    InsufficientData,
    /// Packet type a broker never sends to a client
    InvalidPacketType(u8),
    /// Variable byte integer longer than four bytes
    InvalidRemainingLength,
    /// PUBLISH with QoS bits set to 3
    InvalidQoS(u8),
    InvalidUtf8,
    /// Reserved fixed-header or acknowledge flags set (packet type)
    InvalidFlags(u8),
    MalformedPacket(&'static str),
    /// Remaining length above the configured limit
    PacketTooLarge,
    /// v5.0 reason code outside the known set
    InvalidReasonCode(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData => write!(f, "truncated packet"),
            Self::InvalidPacketType(t) => write!(f, "unexpected packet type {} from broker", t),
            Self::InvalidRemainingLength => write!(f, "invalid remaining length encoding"),
            Self::InvalidQoS(q) => write!(f, "invalid QoS {}", q),
            Self::InvalidUtf8 => write!(f, "topic is not valid UTF-8"),
            Self::InvalidFlags(t) => write!(f, "reserved flags set on packet type {}", t),
            Self::MalformedPacket(msg) => write!(f, "malformed packet: {}", msg),
            Self::PacketTooLarge => write!(f, "packet exceeds maximum size"),
            Self::InvalidReasonCode(r) => write!(f, "unknown reason code 0x{:02X}", r),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Why a client packet could not be serialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Remaining length above the protocol maximum
    PacketTooLarge,
    /// String or binary field longer than 65535 bytes
    StringTooLong,
    /// Packet type a client never sends
    UnsupportedPacket(u8),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PacketTooLarge => write!(f, "packet exceeds protocol maximum"),
            Self::StringTooLong => write!(f, "field longer than 65535 bytes"),
            Self::UnsupportedPacket(t) => write!(f, "packet type {} is not sent by a client", t),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Codec failure or a broker breaking the expected exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    Decode(DecodeError),
    Encode(EncodeError),
    /// Well-formed packet in the wrong place
    Violation(&'static str),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode: {}", e),
            Self::Encode(e) => write!(f, "encode: {}", e),
            Self::Violation(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Violation(_) => None,
        }
    }
}

impl From<DecodeError> for ProtocolError {
    fn from(e: DecodeError) -> Self {
        ProtocolError::Decode(e)
    }
}

impl From<EncodeError> for ProtocolError {
    fn from(e: EncodeError) -> Self {
        ProtocolError::Encode(e)
    }
}
