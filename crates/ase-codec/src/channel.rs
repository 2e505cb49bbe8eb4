//! A logical channel within a multiplexed connection.
//!
//! Channels own both directions of one conversation: outgoing packages are
//! serialized into a buffer and flushed as packets of the negotiated size,
//! incoming packets feed a reassembly buffer that packages are parsed from
//! lazily. A short read simply waits for the next packet and retries.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::sync::mpsc;

use tds5_protocol::packages::{DonePackage, EedPackage, EnvChangeType, Package, PackageContext};
use tds5_protocol::packet::{PACKET_HEADER_SIZE, PacketStatus, PacketType};
use tds5_protocol::wire::Reader;

use crate::connection::Shared;
use crate::error::CodecError;
use crate::packet_codec::Packet;

/// Whether a package is a final completion, ending the server's response.
#[must_use]
pub fn is_final_done(package: &Package) -> bool {
    match package {
        Package::Done(done) | Package::DoneProc(done) | Package::DoneInProc(done) => {
            done.status.is_empty()
        }
        _ => false,
    }
}

/// One logical channel of a TDS connection.
///
/// The main channel has id 0 and carries login and most traffic; further
/// channels are announced to the server with a setup packet and torn down
/// with a close packet.
pub struct Channel<T> {
    id: u16,
    shared: Arc<Shared<T>>,
    incoming: mpsc::Receiver<Packet>,

    /// Reassembled payload of the message currently being parsed.
    rx_buf: BytesMut,
    /// The current message's last packet has arrived.
    rx_eom: bool,
    ctx: PackageContext,
    last_was_final_done: bool,
    attn_acked: bool,
    eeds: Vec<EedPackage>,

    out_buf: BytesMut,
    packet_type: PacketType,
    closed: bool,
}

impl<T> Channel<T>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    pub(crate) fn new(id: u16, shared: Arc<Shared<T>>, incoming: mpsc::Receiver<Packet>) -> Self {
        Self {
            id,
            shared,
            incoming,
            rx_buf: BytesMut::new(),
            rx_eom: false,
            ctx: PackageContext::default(),
            // A fresh channel has no response in flight.
            last_was_final_done: true,
            attn_acked: false,
            eeds: Vec::new(),
            out_buf: BytesMut::new(),
            packet_type: PacketType::Normal,
            closed: false,
        }
    }

    /// The channel id.
    #[must_use]
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Set the packet type stamped on outgoing packets. Login traffic
    /// travels in login packets, everything afterwards in normal ones.
    pub fn set_packet_type(&mut self, packet_type: PacketType) {
        self.packet_type = packet_type;
    }

    /// Whether the server has acknowledged an attention since the last
    /// [`Channel::take_attention_ack`].
    #[must_use]
    pub fn attention_acknowledged(&self) -> bool {
        self.attn_acked
    }

    /// Consume the attention acknowledgement flag.
    pub fn take_attention_ack(&mut self) -> bool {
        std::mem::take(&mut self.attn_acked)
    }

    /// Collected server messages since the last [`Channel::take_eeds`].
    pub fn take_eeds(&mut self) -> Vec<EedPackage> {
        std::mem::take(&mut self.eeds)
    }

    /// Reinstate row formats for data packages of the next response.
    ///
    /// Cursor fetches return rows without repeating the ROWFMT of the
    /// open; the formats remembered from the open are injected here.
    pub fn set_row_formats(&mut self, formats: Arc<Vec<tds5_protocol::field::FieldFmt>>) {
        self.ctx.row_formats = Some(formats);
    }

    /// Serialize a package into the send buffer, flushing any packets
    /// that are already full.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or a full packet cannot
    /// be sent.
    pub async fn queue_package(&mut self, package: &Package) -> Result<(), CodecError> {
        self.ensure_open()?;
        package.write_to(&mut self.out_buf)?;

        let payload_size = self.shared.packet_size() - PACKET_HEADER_SIZE;
        while self.out_buf.len() > payload_size {
            let payload = self.out_buf.split_to(payload_size);
            self.send_packet(payload, false).await?;
        }
        Ok(())
    }

    /// Send whatever is queued as the final packet of the message.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet cannot be sent.
    pub async fn flush(&mut self) -> Result<(), CodecError> {
        self.ensure_open()?;
        let payload = self.out_buf.split();
        self.send_packet(payload, true).await
    }

    /// Queue a package and flush it as a complete message.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or sending fails.
    pub async fn send_package(&mut self, package: &Package) -> Result<(), CodecError> {
        self.queue_package(package).await?;
        self.flush().await
    }

    /// Request cancellation of the in-flight command with a header-only
    /// attention packet. The response must still be drained; the server
    /// acknowledges with an attention ack on its final packet.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet cannot be sent.
    pub async fn cancel(&mut self) -> Result<(), CodecError> {
        self.ensure_open()?;
        let packet = Packet::header_only(
            PacketType::Attn,
            PacketStatus::END_OF_MESSAGE | PacketStatus::ATTN,
            self.id,
        );
        self.shared.send_packet(packet).await
    }

    /// Receive the next package from the server.
    ///
    /// Environment changes and informational server messages are handled
    /// here and never surface; the negotiated packet size is applied to
    /// the connection as a side effect. When a message ends without a
    /// final completion package, one is synthesized so consumers can
    /// always drain to a final done.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ConnectionClosed`] once the connection's
    /// reader has stopped, or a protocol error on malformed input.
    pub async fn next_package(&mut self) -> Result<Package, CodecError> {
        loop {
            if !self.rx_buf.is_empty() {
                let mut reader = Reader::new(&self.rx_buf);
                match Package::read(&mut reader, &mut self.ctx) {
                    Ok(package) => {
                        let consumed = reader.position();
                        self.rx_buf.advance(consumed);
                        if let Some(package) = self.process(package) {
                            return Ok(package);
                        }
                        continue;
                    }
                    Err(err) if err.is_incomplete() => {
                        if self.rx_eom {
                            // The message ended mid-package. Nothing more
                            // is coming for it, so drop the remainder.
                            tracing::warn!(
                                channel = self.id,
                                remaining = self.rx_buf.len(),
                                "message ended with a partial package, discarding"
                            );
                            self.rx_buf.clear();
                        }
                    }
                    Err(err) => return Err(err.into()),
                }
            }

            if self.rx_buf.is_empty() && self.rx_eom {
                self.rx_eom = false;
                self.ctx.reset();
                if !self.last_was_final_done {
                    self.last_was_final_done = true;
                    return Ok(Package::Done(DonePackage::final_done()));
                }
            }

            let packet = self
                .incoming
                .recv()
                .await
                .ok_or(CodecError::ConnectionClosed)?;

            if packet.total_size() == PACKET_HEADER_SIZE {
                if packet
                    .header
                    .status
                    .intersects(PacketStatus::ATTN_ACK | PacketStatus::ATTN)
                {
                    self.attn_acked = true;
                }
                continue;
            }

            if packet.is_end_of_message() {
                self.rx_eom = true;
            }
            self.rx_buf.extend_from_slice(&packet.payload);
        }
    }

    /// Receive packages until the predicate matches, collecting server
    /// messages along the way.
    ///
    /// On a protocol or IO error the collected messages stay available
    /// through [`Channel::take_eeds`].
    ///
    /// # Errors
    ///
    /// Returns the first error from [`Channel::next_package`].
    pub async fn next_package_until<F>(&mut self, mut predicate: F) -> Result<Package, CodecError>
    where
        F: FnMut(&Package) -> bool,
    {
        loop {
            let package = self.next_package().await?;
            if let Package::Eed(eed) = &package {
                self.eeds.push(eed.clone());
                if predicate(&package) {
                    return Ok(package);
                }
                continue;
            }
            if predicate(&package) {
                return Ok(package);
            }
        }
    }

    /// Discard packages up to and including the final completion.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`Channel::next_package`].
    pub async fn drain_to_final_done(&mut self) -> Result<DonePackage, CodecError> {
        loop {
            if let Package::Done(done) | Package::DoneProc(done) | Package::DoneInProc(done) =
                self.next_package_until(is_final_done).await?
            {
                return Ok(done);
            }
        }
    }

    /// Close the channel, announcing it to the server for ids above 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the close packet cannot be sent.
    pub async fn close(mut self) -> Result<(), CodecError> {
        self.closed = true;
        self.shared.deregister(self.id);
        if self.id != 0 {
            let packet = Packet::header_only(
                PacketType::Close,
                PacketStatus::END_OF_MESSAGE,
                self.id,
            );
            self.shared.send_packet(packet).await?;
        }
        Ok(())
    }

    /// Route side-channel packages; returns the package if it should
    /// surface to the consumer.
    fn process(&mut self, package: Package) -> Option<Package> {
        self.last_was_final_done = is_final_done(&package);

        match package {
            Package::EnvChange(env) => {
                for change in &env.changes {
                    if change.change_type == EnvChangeType::PacketSize {
                        match change.new_value.parse::<usize>() {
                            Ok(size) => self.shared.set_packet_size(size),
                            Err(_) => tracing::warn!(
                                value = %change.new_value,
                                "unparsable packet size in env change"
                            ),
                        }
                    }
                    self.shared.call_env_change_hooks(
                        change.change_type,
                        &change.old_value,
                        &change.new_value,
                    );
                }
                None
            }
            Package::Eed(eed) if eed.is_info() => {
                tracing::debug!(
                    msg_number = eed.msg_number,
                    message = %eed.msg,
                    "informational server message"
                );
                None
            }
            Package::Eed(eed) => {
                self.shared.call_eed_hooks(&eed);
                Some(Package::Eed(eed))
            }
            other => Some(other),
        }
    }

    async fn send_packet(&mut self, payload: BytesMut, end_of_message: bool) -> Result<(), CodecError> {
        let status = if end_of_message {
            PacketStatus::END_OF_MESSAGE
        } else {
            PacketStatus::empty()
        };
        let header = tds5_protocol::packet::PacketHeader::new(self.packet_type, status, self.id);
        self.shared.send_packet(Packet::new(header, payload)).await
    }

    fn ensure_open(&self) -> Result<(), CodecError> {
        if self.closed {
            return Err(CodecError::ChannelClosed(self.id));
        }
        Ok(())
    }
}

impl<T> Drop for Channel<T> {
    fn drop(&mut self) {
        if !self.closed {
            self.shared.deregister(self.id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::packet_codec::Tds5Codec;
    use futures_util::{SinkExt, StreamExt};
    use tds5_protocol::packages::{DoneStatus, EnvChange, EnvChangePackage, LanguagePackage};
    use tds5_protocol::packet::PacketHeader;
    use tokio::io::DuplexStream;
    use tokio_util::codec::Framed;

    type Server = Framed<DuplexStream, Tds5Codec>;

    fn pair() -> (Connection<DuplexStream>, Server) {
        let (client_end, server_end) = tokio::io::duplex(1 << 16);
        let conn = Connection::new(client_end);
        (conn, Framed::new(server_end, Tds5Codec::new()))
    }

    async fn send_message(server: &mut Server, channel: u16, packages: &[Package]) {
        let mut payload = BytesMut::new();
        for package in packages {
            package.write_to(&mut payload).unwrap();
        }
        let header = PacketHeader::new(PacketType::Normal, PacketStatus::END_OF_MESSAGE, channel);
        server.send(Packet::new(header, payload)).await.unwrap();
    }

    #[tokio::test]
    async fn test_large_message_is_chunked() {
        let (conn, mut server) = pair();
        let mut channel = conn.main_channel().unwrap();

        let stmt = "x".repeat(2000);
        let package = Package::Language(LanguagePackage::new(&stmt));
        channel.send_package(&package).await.unwrap();

        let first = server.next().await.unwrap().unwrap();
        assert_eq!(first.total_size(), 512);
        assert!(!first.is_end_of_message());

        let mut reassembled = BytesMut::from(&first.payload[..]);
        loop {
            let packet = server.next().await.unwrap().unwrap();
            reassembled.extend_from_slice(&packet.payload);
            if packet.is_end_of_message() {
                break;
            }
        }

        let mut reader = Reader::new(&reassembled);
        let mut ctx = PackageContext::default();
        match Package::read(&mut reader, &mut ctx).unwrap() {
            Package::Language(lang) => assert_eq!(lang.cmd, stmt),
            other => panic!("unexpected package {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_package_split_across_packets() {
        let (conn, mut server) = pair();
        let mut channel = conn.main_channel().unwrap();

        let done = DonePackage {
            status: DoneStatus::COUNT,
            count: 42,
            ..DonePackage::default()
        };
        let mut body = BytesMut::new();
        Package::Done(done.clone()).write_to(&mut body).unwrap();

        // First packet carries a single byte of the package.
        let split = body.split_to(1);
        let header = PacketHeader::new(PacketType::Normal, PacketStatus::empty(), 0);
        server.send(Packet::new(header, split)).await.unwrap();

        let header = PacketHeader::new(PacketType::Normal, PacketStatus::END_OF_MESSAGE, 0);
        server.send(Packet::new(header, body)).await.unwrap();

        match channel.next_package().await.unwrap() {
            Package::Done(parsed) => assert_eq!(parsed, done),
            other => panic!("unexpected package {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_env_change_updates_packet_size() {
        let (conn, mut server) = pair();
        let mut channel = conn.main_channel().unwrap();

        let env = EnvChangePackage {
            changes: vec![EnvChange {
                change_type: EnvChangeType::PacketSize,
                new_value: "2048".into(),
                old_value: "512".into(),
            }],
        };
        send_message(&mut server, 0, &[Package::EnvChange(env)]).await;

        // The env change is consumed internally; the message yields a
        // synthesized final completion.
        let package = channel.next_package().await.unwrap();
        assert!(is_final_done(&package));
        assert_eq!(conn.packet_size(), 2048);
    }

    #[tokio::test]
    async fn test_drain_collects_server_messages() {
        let (conn, mut server) = pair();
        let mut channel = conn.main_channel().unwrap();

        let eed = EedPackage {
            msg_number: 208,
            class: 16,
            msg: "object not found".into(),
            server_name: "ASE1".into(),
            ..EedPackage::default()
        };
        let done = DonePackage {
            status: DoneStatus::ERROR,
            ..DonePackage::default()
        };
        send_message(
            &mut server,
            0,
            &[
                Package::Eed(eed.clone()),
                Package::Done(done),
                Package::Done(DonePackage::final_done()),
            ],
        )
        .await;

        let final_done = channel.drain_to_final_done().await.unwrap();
        assert!(final_done.status.is_empty());
        let eeds = channel.take_eeds();
        assert_eq!(eeds.len(), 1);
        assert_eq!(eeds[0].msg_number, 208);
        assert_eq!(eeds[0].msg, eed.msg);
    }

    #[tokio::test]
    async fn test_header_only_attention_ack_sets_flag() {
        let (conn, mut server) = pair();
        let mut channel = conn.main_channel().unwrap();

        let ack = Packet::header_only(
            PacketType::Normal,
            PacketStatus::END_OF_MESSAGE | PacketStatus::ATTN_ACK,
            0,
        );
        server.send(ack).await.unwrap();
        send_message(&mut server, 0, &[Package::Done(DonePackage::final_done())]).await;

        channel.next_package().await.unwrap();
        assert!(channel.take_attention_ack());
        assert!(!channel.attention_acknowledged());
    }

    #[tokio::test]
    async fn test_closed_connection_surfaces() {
        let (conn, server) = pair();
        let mut channel = conn.main_channel().unwrap();
        drop(server);

        let err = channel.next_package().await.unwrap_err();
        assert!(matches!(err, CodecError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_channels_are_routed_independently() {
        let (conn, mut server) = pair();
        let mut main = conn.main_channel().unwrap();
        let mut extra = conn.new_channel().await.unwrap();

        // The setup packet for the new channel arrives first.
        let setup = server.next().await.unwrap().unwrap();
        assert_eq!(setup.header.packet_type, PacketType::Setup);
        assert_eq!(setup.header.channel, extra.id());

        let done_main = DonePackage {
            status: DoneStatus::COUNT,
            count: 1,
            ..DonePackage::default()
        };
        let done_extra = DonePackage {
            status: DoneStatus::COUNT,
            count: 2,
            ..DonePackage::default()
        };
        send_message(&mut server, extra.id(), &[Package::Done(done_extra)]).await;
        send_message(&mut server, 0, &[Package::Done(done_main)]).await;

        match main.next_package().await.unwrap() {
            Package::Done(done) => assert_eq!(done.count, 1),
            other => panic!("unexpected package {other:?}"),
        }
        match extra.next_package().await.unwrap() {
            Package::Done(done) => assert_eq!(done.count, 2),
            other => panic!("unexpected package {other:?}"),
        }
    }
}
