//! The multiplexing connection.
//!
//! One TCP connection carries up to 65536 logical channels; every packet
//! names its channel in the header. A background task reads packets off
//! the socket and routes them to the owning channel's queue. Sending goes
//! through a shared sink guarded by an async mutex, so concurrent
//! channels interleave at packet granularity.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use futures_util::stream::SplitSink;
use tds5_protocol::packages::{EedPackage, EnvChangeType};
use tds5_protocol::packet::{DEFAULT_PACKET_SIZE, PacketStatus, PacketType};

use crate::channel::Channel;
use crate::error::CodecError;
use crate::packet_codec::{Packet, Tds5Codec};

/// Packets queued per channel before the reader applies backpressure.
const CHANNEL_QUEUE_SIZE: usize = 100;

/// Called for every environment change the server announces.
pub type EnvChangeHook = Box<dyn Fn(EnvChangeType, &str, &str) + Send + Sync>;

/// Called for every non-informational EED the server sends.
pub type EedHook = Box<dyn Fn(&EedPackage) + Send + Sync>;

pub(crate) struct Shared<T> {
    writer: tokio::sync::Mutex<SplitSink<Framed<T, Tds5Codec>, Packet>>,
    packet_size: AtomicUsize,
    channels: parking_lot::Mutex<HashMap<u16, mpsc::Sender<Packet>>>,
    env_change_hooks: parking_lot::Mutex<Vec<EnvChangeHook>>,
    eed_hooks: parking_lot::Mutex<Vec<EedHook>>,
    closed: AtomicBool,
}

impl<T> Shared<T> {
    pub(crate) fn packet_size(&self) -> usize {
        self.packet_size.load(Ordering::Relaxed)
    }

    pub(crate) fn set_packet_size(&self, size: usize) {
        tracing::debug!(size, "packet size renegotiated");
        self.packet_size.store(size, Ordering::Relaxed);
    }

    pub(crate) fn deregister(&self, channel_id: u16) {
        self.channels.lock().remove(&channel_id);
    }

    pub(crate) fn call_env_change_hooks(&self, change_type: EnvChangeType, old: &str, new: &str) {
        for hook in self.env_change_hooks.lock().iter() {
            hook(change_type, old, new);
        }
    }

    pub(crate) fn call_eed_hooks(&self, eed: &EedPackage) {
        for hook in self.eed_hooks.lock().iter() {
            hook(eed);
        }
    }
}

impl<T> Shared<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) async fn send_packet(&self, packet: Packet) -> Result<(), CodecError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CodecError::ConnectionClosed);
        }
        self.writer.lock().await.send(packet).await
    }
}

/// An open TDS connection multiplexing logical channels.
pub struct Connection<T> {
    shared: Arc<Shared<T>>,
    reader: JoinHandle<()>,
    next_channel_id: AtomicU16,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap a connected transport.
    #[must_use]
    pub fn new(transport: T) -> Self {
        let framed = Framed::new(transport, Tds5Codec::new());
        let (writer, mut packets) = framed.split();

        let shared = Arc::new(Shared {
            writer: tokio::sync::Mutex::new(writer),
            packet_size: AtomicUsize::new(DEFAULT_PACKET_SIZE),
            channels: parking_lot::Mutex::new(HashMap::new()),
            env_change_hooks: parking_lot::Mutex::new(Vec::new()),
            eed_hooks: parking_lot::Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        let reader_shared = Arc::clone(&shared);
        let reader = tokio::spawn(async move {
            while let Some(result) = packets.next().await {
                let packet = match result {
                    Ok(packet) => packet,
                    Err(err) => {
                        tracing::warn!(error = %err, "error reading packet, closing connection");
                        break;
                    }
                };

                let sender = reader_shared
                    .channels
                    .lock()
                    .get(&packet.header.channel)
                    .cloned();
                match sender {
                    Some(sender) => {
                        if sender.send(packet).await.is_err() {
                            tracing::debug!("channel receiver dropped, discarding packet");
                        }
                    }
                    None => {
                        tracing::warn!(
                            channel = packet.header.channel,
                            "received packet for unknown channel"
                        );
                    }
                }
            }

            reader_shared.closed.store(true, Ordering::Release);
            // Dropping the senders wakes every channel with a closed queue.
            reader_shared.channels.lock().clear();
        });

        Self {
            shared,
            reader,
            next_channel_id: AtomicU16::new(1),
        }
    }

    /// Open the main channel, id 0. No channel setup travels for it.
    ///
    /// # Errors
    ///
    /// Returns an error if channel 0 is already open.
    pub fn main_channel(&self) -> Result<Channel<T>, CodecError> {
        self.register(0)
    }

    /// Open an additional logical channel, announcing it to the server
    /// with a setup packet.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed.
    pub async fn new_channel(&self) -> Result<Channel<T>, CodecError> {
        let id = self.next_channel_id.fetch_add(1, Ordering::Relaxed);
        let channel = self.register(id)?;

        let setup = Packet::header_only(PacketType::Setup, PacketStatus::END_OF_MESSAGE, id);
        self.shared.send_packet(setup).await?;

        Ok(channel)
    }

    fn register(&self, id: u16) -> Result<Channel<T>, CodecError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(CodecError::ConnectionClosed);
        }

        let (sender, receiver) = mpsc::channel(CHANNEL_QUEUE_SIZE);
        let mut channels = self.shared.channels.lock();
        if channels.contains_key(&id) {
            return Err(CodecError::ChannelExists(id));
        }
        channels.insert(id, sender);
        drop(channels);

        Ok(Channel::new(id, Arc::clone(&self.shared), receiver))
    }

    /// The currently negotiated packet size.
    #[must_use]
    pub fn packet_size(&self) -> usize {
        self.shared.packet_size()
    }

    /// Register a hook called for every environment change.
    pub fn add_env_change_hook(&self, hook: EnvChangeHook) {
        self.shared.env_change_hooks.lock().push(hook);
    }

    /// Register a hook called for every non-informational server message.
    pub fn add_eed_hook(&self, hook: EedHook) {
        self.shared.eed_hooks.lock().push(hook);
    }

    /// Tear the connection down. Open channels observe a closed queue.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.reader.abort();
        self.shared.channels.lock().clear();
    }
}

impl<T> Drop for Connection<T> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
