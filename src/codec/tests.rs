//! MQTT Codec Tests
//!
//! Byte-level checks of the client packets we send and the broker packets
//! we accept, for both v3.1.1 and v5.0.

use bytes::{Bytes, BytesMut};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::{read_variable_int, write_variable_int};
use crate::codec::{Decoder, Encoder};
use crate::protocol::{
    ConnAck, Connect, DecodeError, Disconnect, EncodeError, Packet, ProtocolVersion, PubAck,
    Publish, QoS, ReasonCode, SubAck, Subscribe, Subscription,
};

fn encode_packet(packet: &Packet, version: ProtocolVersion) -> Vec<u8> {
    let encoder = Encoder::new(version);
    let mut buf = BytesMut::new();
    encoder.encode(packet, &mut buf).unwrap();
    buf.to_vec()
}

fn decode_packet(buf: &[u8], version: ProtocolVersion) -> Result<Packet, DecodeError> {
    match Decoder::new(version).decode(buf)? {
        Some((packet, consumed)) => {
            assert_eq!(consumed, buf.len());
            Ok(packet)
        }
        None => Err(DecodeError::InsufficientData),
    }
}

fn connect(version: ProtocolVersion) -> Packet {
    Packet::Connect(Box::new(Connect {
        protocol_version: version,
        client_id: "bridge".to_string(),
        ..Default::default()
    }))
}

// ============================================================================
// Encoding
// ============================================================================

#[test]
fn test_connect_v311_bytes() {
    let encoded = encode_packet(&connect(ProtocolVersion::V311), ProtocolVersion::V311);
    let mut expected = vec![0x10, 0x12, 0x00, 0x04];
    expected.extend_from_slice(b"MQTT");
    expected.extend_from_slice(&[0x04, 0x02, 0x00, 0x3C, 0x00, 0x06]);
    expected.extend_from_slice(b"bridge");
    assert_eq!(encoded, expected);
}

#[test]
fn test_connect_v5_has_empty_properties() {
    let encoded = encode_packet(&connect(ProtocolVersion::V5), ProtocolVersion::V5);
    let mut expected = vec![0x10, 0x13, 0x00, 0x04];
    expected.extend_from_slice(b"MQTT");
    expected.extend_from_slice(&[0x05, 0x02, 0x00, 0x3C, 0x00, 0x00, 0x06]);
    expected.extend_from_slice(b"bridge");
    assert_eq!(encoded, expected);
}

#[test]
fn test_connect_with_credentials() {
    let packet = Packet::Connect(Box::new(Connect {
        protocol_version: ProtocolVersion::V311,
        client_id: "bridge".to_string(),
        clean_start: false,
        keep_alive: 0,
        username: Some("u".to_string()),
        password: Some(Bytes::from_static(b"p")),
    }));
    let encoded = encode_packet(&packet, ProtocolVersion::V311);

    assert_eq!(encoded[1], 24); // remaining length
    assert_eq!(encoded[9], 0xC0); // username + password, no clean session
    assert_eq!(&encoded[10..12], &[0x00, 0x00]); // keep alive
    assert_eq!(&encoded[encoded.len() - 6..], &[0x00, 0x01, b'u', 0x00, 0x01, b'p']);
}

#[test]
fn test_subscribe_all_topics() {
    let packet = Packet::Subscribe(Subscribe {
        packet_id: 1,
        subscriptions: vec![Subscription {
            filter: "#".to_string(),
            qos: QoS::AtMostOnce,
        }],
    });

    assert_eq!(
        encode_packet(&packet, ProtocolVersion::V311),
        vec![0x82, 0x06, 0x00, 0x01, 0x00, 0x01, b'#', 0x00]
    );
    assert_eq!(
        encode_packet(&packet, ProtocolVersion::V5),
        vec![0x82, 0x07, 0x00, 0x01, 0x00, 0x00, 0x01, b'#', 0x00]
    );
}

#[test]
fn test_subscribe_qos1_options_byte() {
    let packet = Packet::Subscribe(Subscribe {
        packet_id: 9,
        subscriptions: vec![Subscription {
            filter: "tele/+/SENSOR".to_string(),
            qos: QoS::AtLeastOnce,
        }],
    });
    let encoded = encode_packet(&packet, ProtocolVersion::V311);
    assert_eq!(*encoded.last().unwrap(), 0x01);
}

#[test]
fn test_puback_pingreq_disconnect() {
    assert_eq!(
        encode_packet(&Packet::PubAck(PubAck::new(7)), ProtocolVersion::V311),
        vec![0x40, 0x02, 0x00, 0x07]
    );
    assert_eq!(
        encode_packet(&Packet::PubAck(PubAck::new(7)), ProtocolVersion::V5),
        vec![0x40, 0x02, 0x00, 0x07]
    );
    assert_eq!(
        encode_packet(&Packet::PingReq, ProtocolVersion::V311),
        vec![0xC0, 0x00]
    );
    assert_eq!(
        encode_packet(
            &Packet::Disconnect(Disconnect::default()),
            ProtocolVersion::V5
        ),
        vec![0xE0, 0x00]
    );
}

#[test]
fn test_v5_reason_codes_written_when_not_success() {
    let puback = Packet::PubAck(PubAck {
        packet_id: 7,
        reason_code: ReasonCode::ImplementationError,
    });
    assert_eq!(
        encode_packet(&puback, ProtocolVersion::V5),
        vec![0x40, 0x04, 0x00, 0x07, 0x83, 0x00]
    );
    // v3.1.1 has no reason codes
    assert_eq!(
        encode_packet(&puback, ProtocolVersion::V311),
        vec![0x40, 0x02, 0x00, 0x07]
    );

    let disconnect = Packet::Disconnect(Disconnect {
        reason_code: ReasonCode::AdministrativeAction,
    });
    assert_eq!(
        encode_packet(&disconnect, ProtocolVersion::V5),
        vec![0xE0, 0x01, 0x98]
    );
}

#[test]
fn test_encode_rejects_broker_packets() {
    let encoder = Encoder::new(ProtocolVersion::V311);
    let mut buf = BytesMut::new();
    let result = encoder.encode(&Packet::ConnAck(ConnAck::default()), &mut buf);
    assert_eq!(result, Err(EncodeError::UnsupportedPacket(2)));
    assert!(buf.is_empty());
}

// ============================================================================
// Decoding
// ============================================================================

#[test]
fn test_connack_v311() {
    assert_eq!(
        decode_packet(&[0x20, 0x02, 0x00, 0x00], ProtocolVersion::V311).unwrap(),
        Packet::ConnAck(ConnAck {
            session_present: false,
            reason_code: ReasonCode::Success,
        })
    );
    assert_eq!(
        decode_packet(&[0x20, 0x02, 0x01, 0x05], ProtocolVersion::V311).unwrap(),
        Packet::ConnAck(ConnAck {
            session_present: true,
            reason_code: ReasonCode::NotAuthorized,
        })
    );
}

#[test]
fn test_connack_v5_with_properties() {
    assert_eq!(
        decode_packet(&[0x20, 0x03, 0x00, 0x87, 0x00], ProtocolVersion::V5).unwrap(),
        Packet::ConnAck(ConnAck {
            session_present: false,
            reason_code: ReasonCode::NotAuthorized,
        })
    );
    // Receive Maximum property (0x21) = 10
    assert_eq!(
        decode_packet(
            &[0x20, 0x06, 0x00, 0x00, 0x03, 0x21, 0x00, 0x0A],
            ProtocolVersion::V5
        )
        .unwrap(),
        Packet::ConnAck(ConnAck::default())
    );
}

#[test]
fn test_connack_reserved_flags() {
    assert_eq!(
        decode_packet(&[0x20, 0x02, 0x02, 0x00], ProtocolVersion::V311),
        Err(DecodeError::InvalidFlags(2))
    );
}

#[test]
fn test_publish_qos0_v311() {
    let buf = [0x30, 0x07, 0x00, 0x03, b'a', b'/', b'b', b'h', b'i'];
    assert_eq!(
        decode_packet(&buf, ProtocolVersion::V311).unwrap(),
        Packet::Publish(Publish {
            topic: "a/b".to_string(),
            payload: Bytes::from_static(b"hi"),
            ..Default::default()
        })
    );
}

#[test]
fn test_publish_qos1_carries_packet_id() {
    let buf = [
        0x33, 0x09, 0x00, 0x03, b'a', b'/', b'b', 0x00, 0x0A, b'h', b'i',
    ];
    match decode_packet(&buf, ProtocolVersion::V311).unwrap() {
        Packet::Publish(publish) => {
            assert_eq!(publish.qos, QoS::AtLeastOnce);
            assert!(publish.retain);
            assert_eq!(publish.packet_id, Some(10));
            assert_eq!(publish.payload, Bytes::from_static(b"hi"));
        }
        other => panic!("Expected PUBLISH, got {:?}", other),
    }
}

#[test]
fn test_publish_v5_skips_properties() {
    // Payload Format Indicator (0x01) = 1
    let buf = [
        0x30, 0x0A, 0x00, 0x03, b'a', b'/', b'b', 0x02, 0x01, 0x01, b'h', b'i',
    ];
    match decode_packet(&buf, ProtocolVersion::V5).unwrap() {
        Packet::Publish(publish) => {
            assert_eq!(publish.topic, "a/b");
            assert_eq!(publish.payload, Bytes::from_static(b"hi"));
        }
        other => panic!("Expected PUBLISH, got {:?}", other),
    }
}

#[test]
fn test_publish_rejects_wildcard_topic() {
    let buf = [0x30, 0x05, 0x00, 0x03, b'a', b'/', b'#'];
    assert_eq!(
        decode_packet(&buf, ProtocolVersion::V311),
        Err(DecodeError::MalformedPacket("topic contains wildcard"))
    );
}

#[test]
fn test_suback() {
    assert_eq!(
        decode_packet(&[0x90, 0x03, 0x00, 0x01, 0x00], ProtocolVersion::V311).unwrap(),
        Packet::SubAck(SubAck {
            packet_id: 1,
            reason_codes: vec![ReasonCode::Success],
        })
    );

    match decode_packet(&[0x90, 0x03, 0x00, 0x01, 0x80], ProtocolVersion::V311).unwrap() {
        Packet::SubAck(suback) => assert!(suback.reason_codes[0].is_error()),
        other => panic!("Expected SUBACK, got {:?}", other),
    }

    assert_eq!(
        decode_packet(
            &[0x90, 0x04, 0x00, 0x01, 0x00, 0xA2],
            ProtocolVersion::V5
        )
        .unwrap(),
        Packet::SubAck(SubAck {
            packet_id: 1,
            reason_codes: vec![ReasonCode::WildcardSubsNotSupported],
        })
    );
}

#[test]
fn test_pingresp_and_server_disconnect() {
    assert_eq!(
        decode_packet(&[0xD0, 0x00], ProtocolVersion::V311).unwrap(),
        Packet::PingResp
    );
    assert_eq!(
        decode_packet(&[0xE0, 0x02, 0x8B, 0x00], ProtocolVersion::V5).unwrap(),
        Packet::Disconnect(Disconnect {
            reason_code: ReasonCode::ServerShuttingDown,
        })
    );
}

#[test]
fn test_partial_packets_wait_for_more_data() {
    let decoder = Decoder::new(ProtocolVersion::V311);
    let buf = [0x30, 0x07, 0x00, 0x03, b'a', b'/', b'b', b'h', b'i'];

    assert_eq!(decoder.decode(&buf[..1]), Ok(None));
    assert_eq!(decoder.decode(&buf[..5]), Ok(None));
    assert!(decoder.decode(&buf).unwrap().is_some());
}

#[test]
fn test_back_to_back_packets() {
    let decoder = Decoder::new(ProtocolVersion::V311);
    let buf = [0x90, 0x03, 0x00, 0x01, 0x00, 0xD0, 0x00];

    let (first, consumed) = decoder.decode(&buf).unwrap().unwrap();
    assert!(matches!(first, Packet::SubAck(_)));
    assert_eq!(consumed, 5);

    let (second, consumed) = decoder.decode(&buf[5..]).unwrap().unwrap();
    assert_eq!(second, Packet::PingResp);
    assert_eq!(consumed, 2);
}

#[test]
fn test_client_packets_are_not_accepted() {
    let encoded = encode_packet(&connect(ProtocolVersion::V311), ProtocolVersion::V311);
    assert_eq!(
        decode_packet(&encoded, ProtocolVersion::V311),
        Err(DecodeError::InvalidPacketType(1))
    );
}

#[test]
fn test_max_packet_size() {
    let decoder = Decoder::new(ProtocolVersion::V311).with_max_packet_size(4);
    let buf = [0x30, 0x07, 0x00, 0x03, b'a', b'/', b'b', b'h', b'i'];
    assert_eq!(decoder.decode(&buf), Err(DecodeError::PacketTooLarge));
}

#[test]
fn test_variable_int_overlong() {
    assert_eq!(
        read_variable_int(&[0xFF, 0xFF, 0xFF, 0xFF, 0x01]),
        Err(DecodeError::InvalidRemainingLength)
    );
    assert_eq!(
        read_variable_int(&[0xFF, 0xFF]),
        Err(DecodeError::InsufficientData)
    );
}

proptest! {
    #[test]
    fn prop_variable_int_roundtrip(value in 0u32..268_435_455u32) {
        let mut buf = BytesMut::new();
        let written = write_variable_int(&mut buf, value).unwrap();
        let (decoded, consumed) = read_variable_int(&buf).unwrap();
        prop_assert_eq!(value, decoded);
        prop_assert_eq!(written, consumed);
    }
}
