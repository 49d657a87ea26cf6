//! MQTT Packet Encoder
//!
//! Encodes client-to-broker packets for both v3.1.1 and v5.0. v5.0 property
//! blocks are always written empty.
//!
//! Each packet body is built in a scratch buffer first so the remaining
//! length in the fixed header is taken from the bytes actually written.

use bytes::{BufMut, BytesMut};

use super::{write_binary, write_string, write_variable_int};
use crate::protocol::{Connect, EncodeError, Packet, ProtocolVersion, ReasonCode, Subscribe};

/// Fixed-header first bytes for client packets
const CONNECT: u8 = 0x10;
const PUBACK: u8 = 0x40;
/// SUBSCRIBE requires the reserved flag bits 0010
const SUBSCRIBE: u8 = 0x82;
const PINGREQ: u8 = 0xC0;
const DISCONNECT: u8 = 0xE0;

/// MQTT Packet Encoder
pub struct Encoder {
    protocol_version: ProtocolVersion,
}

impl Encoder {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            protocol_version: version,
        }
    }

    /// Append the encoded packet to `buf`
    pub fn encode(&self, packet: &Packet, buf: &mut BytesMut) -> Result<(), EncodeError> {
        let mut body = BytesMut::new();

        let first_byte = match packet {
            Packet::Connect(connect) => {
                self.connect_body(connect, &mut body)?;
                CONNECT
            }
            Packet::Subscribe(subscribe) => {
                self.subscribe_body(subscribe, &mut body)?;
                SUBSCRIBE
            }
            Packet::PubAck(puback) => {
                body.put_u16(puback.packet_id);
                // v5.0 lets Success be implied by omitting the reason code
                if self.v5() && puback.reason_code != ReasonCode::Success {
                    body.put_u8(puback.reason_code as u8);
                    body.put_u8(0x00);
                }
                PUBACK
            }
            Packet::PingReq => PINGREQ,
            Packet::Disconnect(disconnect) => {
                if self.v5() && disconnect.reason_code != ReasonCode::Success {
                    body.put_u8(disconnect.reason_code as u8);
                }
                DISCONNECT
            }
            other => return Err(EncodeError::UnsupportedPacket(other.packet_type())),
        };

        buf.put_u8(first_byte);
        write_variable_int(buf, body.len() as u32)?;
        buf.extend_from_slice(&body);
        Ok(())
    }

    fn v5(&self) -> bool {
        self.protocol_version.has_properties()
    }

    fn connect_body(&self, connect: &Connect, body: &mut BytesMut) -> Result<(), EncodeError> {
        write_string(body, "MQTT")?;
        body.put_u8(connect.protocol_version.level());

        let mut flags = 0u8;
        if connect.clean_start {
            flags |= 0x02;
        }
        if connect.password.is_some() {
            flags |= 0x40;
        }
        if connect.username.is_some() {
            flags |= 0x80;
        }
        body.put_u8(flags);
        body.put_u16(connect.keep_alive);

        if connect.protocol_version.has_properties() {
            body.put_u8(0x00);
        }

        write_string(body, &connect.client_id)?;
        if let Some(username) = &connect.username {
            write_string(body, username)?;
        }
        if let Some(password) = &connect.password {
            write_binary(body, password)?;
        }
        Ok(())
    }

    fn subscribe_body(&self, subscribe: &Subscribe, body: &mut BytesMut) -> Result<(), EncodeError> {
        body.put_u16(subscribe.packet_id);
        if self.v5() {
            body.put_u8(0x00);
        }

        for sub in &subscribe.subscriptions {
            write_string(body, &sub.filter)?;
            // With no_local, retain_as_published and retain_handling all zero the
            // v5.0 options byte is the v3.1.1 requested QoS byte
            body.put_u8(sub.qos as u8);
        }
        Ok(())
    }
}
