//! MQTT Packet Decoder
//!
//! Decodes broker-to-client packets for both v3.1.1 and v5.0

use bytes::Bytes;

use super::{read_string, read_u16, read_variable_int, skip_properties, DEFAULT_MAX_PACKET_SIZE};
use crate::protocol::{
    ConnAck, DecodeError, Disconnect, Packet, ProtocolVersion, PubAck, Publish, QoS, ReasonCode,
    SubAck,
};

/// MQTT Packet Decoder
pub struct Decoder {
    /// Maximum packet size
    max_packet_size: usize,
    /// Protocol version negotiated in CONNECT
    protocol_version: ProtocolVersion,
}

impl Decoder {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            protocol_version: version,
        }
    }

    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size.min(super::MAX_REMAINING_LENGTH);
        self
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Decode a packet from the buffer
    /// Returns (packet, bytes_consumed), `None` when the buffer holds only
    /// part of a packet
    pub fn decode(&self, buf: &[u8]) -> Result<Option<(Packet, usize)>, DecodeError> {
        if buf.len() < 2 {
            return Ok(None);
        }

        // Parse fixed header
        let first_byte = buf[0];
        let packet_type = first_byte >> 4;
        let flags = first_byte & 0x0F;

        let (remaining_length, len_bytes) = match read_variable_int(&buf[1..]) {
            Ok(r) => r,
            Err(DecodeError::InsufficientData) => return Ok(None),
            Err(e) => return Err(e),
        };

        if remaining_length as usize > self.max_packet_size {
            return Err(DecodeError::PacketTooLarge);
        }

        let total_len = 1 + len_bytes + remaining_length as usize;
        if buf.len() < total_len {
            return Ok(None);
        }

        let body = &buf[1 + len_bytes..total_len];

        let packet = match packet_type {
            2 => self.decode_connack(flags, body)?,
            3 => self.decode_publish(flags, body)?,
            4 => self.decode_puback(flags, body)?,
            9 => self.decode_suback(flags, body)?,
            13 => {
                if flags != 0 {
                    return Err(DecodeError::InvalidFlags(13));
                }
                Packet::PingResp
            }
            14 => self.decode_disconnect(flags, body)?,
            _ => return Err(DecodeError::InvalidPacketType(packet_type)),
        };

        Ok(Some((packet, total_len)))
    }

    fn is_v5(&self) -> bool {
        self.protocol_version.has_properties()
    }

    fn decode_connack(&self, flags: u8, body: &[u8]) -> Result<Packet, DecodeError> {
        if flags != 0 {
            return Err(DecodeError::InvalidFlags(2));
        }
        if body.len() < 2 {
            return Err(DecodeError::InsufficientData);
        }

        let acknowledge_flags = body[0];
        // Only bit 0 is valid (session present)
        if (acknowledge_flags & 0xFE) != 0 {
            return Err(DecodeError::InvalidFlags(2));
        }

        let reason_byte = body[1];
        let reason_code = if self.is_v5() {
            if body.len() > 2 {
                skip_properties(&body[2..])?;
            }
            ReasonCode::from_u8(reason_byte).ok_or(DecodeError::InvalidReasonCode(reason_byte))?
        } else {
            ReasonCode::from_v3_connack_code(reason_byte)
        };

        Ok(Packet::ConnAck(ConnAck {
            session_present: (acknowledge_flags & 0x01) != 0,
            reason_code,
        }))
    }

    fn decode_publish(&self, flags: u8, body: &[u8]) -> Result<Packet, DecodeError> {
        let dup = (flags & 0x08) != 0;
        let qos_bits = (flags >> 1) & 0x03;
        let retain = (flags & 0x01) != 0;

        let qos = QoS::from_u8(qos_bits).ok_or(DecodeError::InvalidQoS(qos_bits))?;
        if qos == QoS::AtMostOnce && dup {
            return Err(DecodeError::MalformedPacket("DUP must be 0 for QoS 0"));
        }

        let (topic, mut pos) = read_string(body)?;
        if topic.contains('+') || topic.contains('#') {
            return Err(DecodeError::MalformedPacket("topic contains wildcard"));
        }

        let packet_id = if qos != QoS::AtMostOnce {
            let id = read_u16(&body[pos..])?;
            if id == 0 {
                return Err(DecodeError::MalformedPacket("packet id cannot be 0"));
            }
            pos += 2;
            Some(id)
        } else {
            None
        };

        if self.is_v5() {
            pos += skip_properties(&body[pos..])?;
        }

        Ok(Packet::Publish(Publish {
            dup,
            qos,
            retain,
            topic: topic.to_string(),
            packet_id,
            payload: Bytes::copy_from_slice(&body[pos..]),
        }))
    }

    fn decode_puback(&self, flags: u8, body: &[u8]) -> Result<Packet, DecodeError> {
        if flags != 0 {
            return Err(DecodeError::InvalidFlags(4));
        }
        let packet_id = read_u16(body)?;

        // v5.0 may omit the reason code when it is Success
        let reason_code = match body.get(2) {
            Some(&b) if self.is_v5() => {
                ReasonCode::from_u8(b).ok_or(DecodeError::InvalidReasonCode(b))?
            }
            _ => ReasonCode::Success,
        };

        Ok(Packet::PubAck(PubAck {
            packet_id,
            reason_code,
        }))
    }

    fn decode_suback(&self, flags: u8, body: &[u8]) -> Result<Packet, DecodeError> {
        if flags != 0 {
            return Err(DecodeError::InvalidFlags(9));
        }
        let packet_id = read_u16(body)?;
        let mut pos = 2;

        if self.is_v5() {
            pos += skip_properties(&body[pos..])?;
        }

        if pos >= body.len() {
            return Err(DecodeError::MalformedPacket("SUBACK without reason codes"));
        }

        let reason_codes = body[pos..]
            .iter()
            .map(|&b| {
                if self.is_v5() {
                    ReasonCode::from_u8(b).ok_or(DecodeError::InvalidReasonCode(b))
                } else {
                    Ok(ReasonCode::from_v3_suback_code(b))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Packet::SubAck(SubAck {
            packet_id,
            reason_codes,
        }))
    }

    fn decode_disconnect(&self, flags: u8, body: &[u8]) -> Result<Packet, DecodeError> {
        if flags != 0 {
            return Err(DecodeError::InvalidFlags(14));
        }

        // v3.1.1 brokers never send DISCONNECT; accept it anyway as a close notice
        let reason_code = match body.first() {
            Some(&b) if self.is_v5() => {
                ReasonCode::from_u8(b).ok_or(DecodeError::InvalidReasonCode(b))?
            }
            _ => ReasonCode::Success,
        };

        Ok(Packet::Disconnect(Disconnect { reason_code }))
    }
}
