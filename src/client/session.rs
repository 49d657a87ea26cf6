//! Broker session: handshake, subscription and the message loop

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, info, trace, warn};

use super::{ClientCommand, ClientError, ClientHandle, MessageHandler};
use crate::codec::{read_string, read_variable_int, Decoder, Encoder};
use crate::config::MqttConfig;
use crate::protocol::{
    Connect, DecodeError, Disconnect, Packet, ProtocolError, PubAck, Publish, QoS, ReasonCode,
    Subscribe, Subscription,
};

const PUBLISH_TYPE: u8 = 3;

/// Buffered packet reader over the socket's read half
struct PacketReader {
    stream: OwnedReadHalf,
    decoder: Decoder,
    buf: BytesMut,
    /// Bytes of an oversized PUBLISH still to be discarded
    discard: usize,
}

impl PacketReader {
    fn new(stream: OwnedReadHalf, decoder: Decoder) -> Self {
        Self {
            stream,
            decoder,
            buf: BytesMut::with_capacity(4096),
            discard: 0,
        }
    }

    /// Next complete packet. Cancel safe: partial data stays in the buffer.
    ///
    /// A PUBLISH above the packet size limit is dropped and reading continues.
    async fn next_packet(&mut self) -> Result<Packet, ClientError> {
        loop {
            if self.discard > 0 {
                let n = self.discard.min(self.buf.len());
                self.buf.advance(n);
                self.discard -= n;
            }

            if self.discard == 0 {
                match self.decoder.decode(&self.buf) {
                    Ok(Some((packet, consumed))) => {
                        self.buf.advance(consumed);
                        return Ok(packet);
                    }
                    Ok(None) => {}
                    Err(DecodeError::PacketTooLarge) if self.buf[0] >> 4 == PUBLISH_TYPE => {
                        self.drop_oversized_publish()?;
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let n = self.stream.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(ClientError::ConnectionLost(
                    "Connection closed by broker".to_string(),
                ));
            }
        }
    }

    fn drop_oversized_publish(&mut self) -> Result<(), ClientError> {
        let (remaining, len_bytes) = read_variable_int(&self.buf[1..])?;
        let header_len = 1 + len_bytes;
        let topic = read_string(&self.buf[header_len..])
            .map(|(topic, _)| topic.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());

        warn!(
            "Dropping oversized message - {} ({} bytes, limit {})",
            topic,
            remaining,
            self.decoder.max_packet_size()
        );
        self.discard = header_len + remaining as usize;
        Ok(())
    }
}

/// Encoding packet writer over the socket's write half
struct PacketWriter {
    stream: OwnedWriteHalf,
    encoder: Encoder,
    buf: BytesMut,
}

impl PacketWriter {
    async fn send(&mut self, packet: &Packet) -> Result<(), ClientError> {
        self.buf.clear();
        self.encoder.encode(packet, &mut self.buf)?;
        self.stream.write_all(&self.buf).await?;
        Ok(())
    }
}

/// A connected broker session
pub struct MqttClient {
    reader: PacketReader,
    writer: PacketWriter,
    keep_alive: u16,
    request_timeout: Duration,
    next_packet_id: u16,
    /// PUBLISH packets that arrived before the SUBACK
    pending: VecDeque<Publish>,
}

impl MqttClient {
    /// Open a TCP connection and complete the CONNECT/CONNACK handshake
    pub async fn connect(config: &MqttConfig) -> Result<Self, ClientError> {
        let (host, port) = config.parse_address();
        let version = config.protocol_version();

        let stream = timeout(
            config.connect_timeout,
            TcpStream::connect(format!("{}:{}", host, port)),
        )
        .await
        .map_err(|_| ClientError::Timeout)??;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY on broker connection: {}", e);
        }

        debug!("TCP connected to {}", config.address);

        let (read_half, write_half) = stream.into_split();
        let mut client = Self {
            reader: PacketReader::new(
                read_half,
                Decoder::new(version).with_max_packet_size(config.max_packet_size),
            ),
            writer: PacketWriter {
                stream: write_half,
                encoder: Encoder::new(version),
                buf: BytesMut::with_capacity(256),
            },
            keep_alive: config.keepalive,
            request_timeout: config.connect_timeout,
            next_packet_id: 1,
            pending: VecDeque::new(),
        };

        let connect = Packet::Connect(Box::new(Connect {
            protocol_version: version,
            client_id: config.client_id.clone(),
            clean_start: config.clean_start,
            keep_alive: config.keepalive,
            username: config.username.clone(),
            password: config.password.as_ref().map(|p| Bytes::from(p.clone())),
        }));
        client.writer.send(&connect).await?;

        debug!("CONNECT sent ({}, client_id={})", version, config.client_id);

        let packet = timeout(client.request_timeout, client.reader.next_packet())
            .await
            .map_err(|_| ClientError::Timeout)??;

        match packet {
            Packet::ConnAck(connack) => {
                if connack.reason_code != ReasonCode::Success {
                    return Err(ClientError::Rejected(connack.reason_code));
                }
                info!(
                    "Connected to broker {} (session_present={})",
                    config.address, connack.session_present
                );
            }
            _ => {
                return Err(ProtocolError::Violation("expected CONNACK").into());
            }
        }

        Ok(client)
    }

    fn next_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
        id
    }

    /// Subscribe to a single filter and wait for the SUBACK
    ///
    /// Returns the QoS granted by the broker.
    pub async fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<QoS, ClientError> {
        let packet_id = self.next_packet_id();
        let subscribe = Packet::Subscribe(Subscribe {
            packet_id,
            subscriptions: vec![Subscription {
                filter: filter.to_string(),
                qos,
            }],
        });
        self.writer.send(&subscribe).await?;

        let deadline = Instant::now() + self.request_timeout;
        loop {
            let packet = tokio::time::timeout_at(deadline, self.reader.next_packet())
                .await
                .map_err(|_| ClientError::Timeout)??;

            match packet {
                Packet::SubAck(suback) if suback.packet_id == packet_id => {
                    let code = suback
                        .reason_codes
                        .first()
                        .copied()
                        .ok_or(ProtocolError::Violation("SUBACK without reason codes"))?;
                    if code.is_error() {
                        return Err(ClientError::SubscribeRejected(code));
                    }

                    let granted = QoS::from_u8(code as u8).unwrap_or(QoS::AtMostOnce);
                    info!("Subscribed to '{}' (granted {:?})", filter, granted);
                    return Ok(granted);
                }
                Packet::SubAck(_) => {
                    return Err(ProtocolError::Violation("SUBACK packet id mismatch").into());
                }
                Packet::Publish(publish) => self.pending.push_back(publish),
                Packet::Disconnect(disconnect) => {
                    return Err(ClientError::ServerDisconnect(disconnect.reason_code));
                }
                other => {
                    trace!("Ignoring {} while waiting for SUBACK", other.name());
                }
            }
        }
    }

    /// Move the session into a background task delivering messages to `handler`
    pub fn spawn(self, handler: Arc<dyn MessageHandler>) -> ClientHandle {
        let (command_tx, command_rx) = mpsc::channel(1);
        let task = tokio::spawn(self.message_loop(handler, command_rx));
        ClientHandle::new(command_tx, task)
    }

    async fn message_loop(
        mut self,
        handler: Arc<dyn MessageHandler>,
        mut command_rx: mpsc::Receiver<ClientCommand>,
    ) -> Result<(), ClientError> {
        while let Some(publish) = self.pending.pop_front() {
            self.deliver(&handler, publish).await?;
        }

        // Zero keep-alive disables PINGREQ; the timer still needs a non-zero period
        let keepalive_enabled = self.keep_alive > 0;
        let period = Duration::from_secs(u64::from(self.keep_alive.max(1)));
        let mut keepalive_timer = interval_at(Instant::now() + period, period);
        let mut awaiting_pingresp = false;

        loop {
            tokio::select! {
                cmd = command_rx.recv() => {
                    // A dropped handle stops the loop the same way
                    match cmd {
                        Some(ClientCommand::Disconnect) | None => {
                            debug!("Sending DISCONNECT");
                            self.writer
                                .send(&Packet::Disconnect(Disconnect::default()))
                                .await?;
                            let _ = self.writer.stream.shutdown().await;
                            return Ok(());
                        }
                    }
                }

                result = self.reader.next_packet() => {
                    match result? {
                        Packet::Publish(publish) => self.deliver(&handler, publish).await?,
                        Packet::PingResp => {
                            trace!("PINGRESP received");
                            awaiting_pingresp = false;
                        }
                        Packet::Disconnect(disconnect) => {
                            warn!("Broker sent DISCONNECT: {}", disconnect.reason_code);
                            return Err(ClientError::ServerDisconnect(disconnect.reason_code));
                        }
                        other => {
                            debug!("Ignoring unexpected {}", other.name());
                        }
                    }
                }

                _ = keepalive_timer.tick(), if keepalive_enabled => {
                    if awaiting_pingresp {
                        return Err(ClientError::ConnectionLost(
                            "No PINGRESP within keep-alive interval".to_string(),
                        ));
                    }
                    trace!("Sending PINGREQ");
                    self.writer.send(&Packet::PingReq).await?;
                    awaiting_pingresp = true;
                }
            }
        }
    }

    /// Hand one PUBLISH to the handler, then acknowledge it if QoS 1
    async fn deliver(
        &mut self,
        handler: &Arc<dyn MessageHandler>,
        publish: Publish,
    ) -> Result<(), ClientError> {
        let Publish {
            qos,
            topic,
            packet_id,
            payload,
            ..
        } = publish;

        match qos {
            QoS::AtMostOnce => handler.on_message(&topic, payload).await,
            QoS::AtLeastOnce => {
                handler.on_message(&topic, payload).await;
                let packet_id = packet_id
                    .ok_or(ProtocolError::Violation("QoS 1 PUBLISH without packet id"))?;
                self.writer.send(&Packet::PubAck(PubAck::new(packet_id))).await?;
            }
            QoS::ExactlyOnce => {
                return Err(
                    ProtocolError::Violation("QoS 2 PUBLISH on a QoS 0/1 subscription").into(),
                );
            }
        }
        Ok(())
    }
}
