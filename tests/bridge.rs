//! Bridge Integration Tests
//!
//! Runs the full bridge against an in-process mock broker and a mock Fluent
//! forward collector.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use mqtt_fluent_bridge::bridge::{Bridge, BridgeError, BridgeState};
use mqtt_fluent_bridge::codec::{write_string, write_variable_int};
use mqtt_fluent_bridge::config::{Config, MqttProtocol};
use mqtt_fluent_bridge::ClientError;

type Entry = (String, u64, Map<String, Value>);

/// Read one MQTT packet: (first byte, body)
async fn read_packet(socket: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let first = socket.read_u8().await.ok()?;
    let mut len = 0usize;
    let mut shift = 0;
    loop {
        let b = socket.read_u8().await.ok()?;
        len |= ((b & 0x7F) as usize) << shift;
        if b & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    let mut body = vec![0u8; len];
    socket.read_exact(&mut body).await.ok()?;
    Some((first, body))
}

fn publish_frame(topic: &str, payload: &[u8], v5: bool) -> Vec<u8> {
    let mut body = BytesMut::new();
    write_string(&mut body, topic).unwrap();
    if v5 {
        // Payload Format Indicator = 1
        body.extend_from_slice(&[0x02, 0x01, 0x01]);
    }
    body.extend_from_slice(payload);

    let mut frame = BytesMut::new();
    frame.extend_from_slice(&[0x30]);
    write_variable_int(&mut frame, body.len() as u32).unwrap();
    frame.extend_from_slice(&body);
    frame.to_vec()
}

/// Accept one client, complete the handshake, publish `messages`, then
/// return the first byte of the next packet the client sends.
fn spawn_broker(
    listener: TcpListener,
    v5: bool,
    messages: Vec<(&'static str, Vec<u8>)>,
) -> JoinHandle<Option<u8>> {
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let (first, connect) = read_packet(&mut socket).await.unwrap();
        assert_eq!(first, 0x10);
        assert_eq!(connect[6], if v5 { 5 } else { 4 });
        let connack: &[u8] = if v5 {
            &[0x20, 0x03, 0x00, 0x00, 0x00]
        } else {
            &[0x20, 0x02, 0x00, 0x00]
        };
        socket.write_all(connack).await.unwrap();

        let (first, sub) = read_packet(&mut socket).await.unwrap();
        assert_eq!(first, 0x82);
        let filter_at = if v5 { 5 } else { 4 };
        assert_eq!(&sub[filter_at..filter_at + 1], b"#");
        let suback = if v5 {
            vec![0x90, 0x04, sub[0], sub[1], 0x00, 0x00]
        } else {
            vec![0x90, 0x03, sub[0], sub[1], 0x00]
        };
        socket.write_all(&suback).await.unwrap();

        for (topic, payload) in messages {
            socket
                .write_all(&publish_frame(topic, &payload, v5))
                .await
                .unwrap();
        }

        read_packet(&mut socket).await.map(|(first, _)| first)
    })
}

/// Accept one connection and decode every forward entry until EOF
fn spawn_collector(listener: TcpListener) -> JoinHandle<Vec<Entry>> {
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        socket.read_to_end(&mut buf).await.unwrap();

        let mut de = rmp_serde::Deserializer::new(&buf[..]);
        let mut entries = Vec::new();
        while let Ok(entry) = serde::Deserialize::deserialize(&mut de) {
            entries.push(entry);
        }
        entries
    })
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

fn telemetry() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("tele/PlugA/LWT", b"Online".to_vec()),
        (
            "tele/PlugA/SENSOR",
            br#"{"ENERGY":{"Power":12,"Voltage":230,"Current":0.05}}"#.to_vec(),
        ),
        ("tele/PlugA/SENSOR", b"{not json".to_vec()),
        ("homeassistant/discovery/PlugA/config", b"{}".to_vec()),
        (
            "tele/PlugB/STATE",
            br#"{"POWER":"MAYBE","Wifi":{"SSId":"home","RSSI":80,"Signal":-50},"UptimeSec":1}"#
                .to_vec(),
        ),
        ("stat/PlugA/RESULT", br#"{"POWER":"ON"}"#.to_vec()),
        (
            "tele/PlugB/STATE",
            br#"{"POWER":"ON","Wifi":{"SSId":"home","RSSI":80,"Signal":-50},"UptimeSec":120}"#
                .to_vec(),
        ),
    ]
}

async fn run_end_to_end(protocol: &str) {
    let (mqtt_listener, mqtt_addr) = bind().await;
    let (fluent_listener, fluent_addr) = bind().await;
    let v5 = protocol == "v5";

    let config = Config::parse(&format!(
        r#"
[mqtt]
address = "{}"
protocol = "{}"
keepalive = 0
connect_timeout = "2s"
disconnect_grace = "500ms"

[fluent]
address = "{}"
tag_prefix = "fluentbit"

[stats]
progress_interval = 1
"#,
        mqtt_addr, protocol, fluent_addr
    ))
    .unwrap();
    assert_eq!(config.mqtt.protocol == MqttProtocol::V5, v5);

    let broker = spawn_broker(mqtt_listener, v5, telemetry());
    let collector = spawn_collector(fluent_listener);

    let bridge = Arc::new(Bridge::new(config));
    let stats = bridge.stats();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let running = {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            bridge
                .run(async {
                    let _ = stop_rx.await;
                })
                .await
        })
    };

    // Every message has been routed once the last record is forwarded
    timeout(Duration::from_secs(5), async {
        while stats.forwarded() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("records not forwarded in time");
    assert_eq!(bridge.state(), BridgeState::Running);

    stop_tx.send(()).unwrap();
    timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(bridge.state(), BridgeState::Stopped);
    assert_eq!(broker.await.unwrap(), Some(0xE0));

    let entries = collector.await.unwrap();
    assert_eq!(entries.len(), 2);

    let (tag, time, record) = &entries[0];
    assert_eq!(tag, "fluentbit.wattage");
    assert!(*time > 1_577_836_800);
    assert_eq!(
        Value::Object(record.clone()),
        json!({
            "hardware_name": "PlugA",
            "source_topic": "tele/PlugA/SENSOR",
            "power": 12,
            "voltage": 230,
            "current": 0.05,
        })
    );

    let (tag, _, record) = &entries[1];
    assert_eq!(tag, "fluentbit.status");
    assert_eq!(
        Value::Object(record.clone()),
        json!({
            "hardware_name": "PlugB",
            "source_topic": "tele/PlugB/STATE",
            "wifi_name": "home",
            "power": true,
            "uptime": 120,
            "wifi_rssi": 80,
            "wifi_signal": -50,
        })
    );

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.received, 7);
    assert_eq!(snapshot.forwarded, 2);
    assert_eq!(snapshot.ignored, 2);
    assert_eq!(snapshot.unmatched, 1);
    assert_eq!(snapshot.dropped, 2);
    assert_eq!(snapshot.send_failures, 0);
}

#[tokio::test]
async fn test_end_to_end_v311() {
    run_end_to_end("v3.1.1").await;
}

#[tokio::test]
async fn test_end_to_end_v5() {
    run_end_to_end("v5").await;
}

#[tokio::test]
async fn test_unreachable_broker_fails_run() {
    let (mqtt_listener, mqtt_addr) = bind().await;
    drop(mqtt_listener);
    let (fluent_listener, fluent_addr) = bind().await;
    let collector = spawn_collector(fluent_listener);

    let mut config = Config::default();
    config.mqtt.address = mqtt_addr;
    config.mqtt.connect_timeout = Duration::from_secs(2);
    config.fluent.address = fluent_addr;

    let bridge = Bridge::new(config);
    let result = bridge.run(std::future::pending()).await;

    assert!(matches!(
        result,
        Err(BridgeError::Client(ClientError::ConnectionLost(_)))
    ));
    assert_eq!(bridge.state(), BridgeState::Stopped);

    // Sink was connected, then closed without sending anything
    let entries = timeout(Duration::from_secs(2), collector)
        .await
        .unwrap()
        .unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_unreachable_collector_fails_run() {
    let (mqtt_listener, mqtt_addr) = bind().await;
    let (fluent_listener, fluent_addr) = bind().await;
    drop(fluent_listener);

    let mut config = Config::default();
    config.mqtt.address = mqtt_addr;
    config.fluent.address = fluent_addr;

    let bridge = Bridge::new(config);
    let result = bridge.run(std::future::pending()).await;

    assert!(matches!(result, Err(BridgeError::Sink(_))));
    assert_eq!(bridge.state(), BridgeState::Stopped);

    // Broker is never contacted
    let accepted = timeout(Duration::from_millis(100), mqtt_listener.accept()).await;
    assert!(accepted.is_err());
}
