//! TCP protocol client
//!
//! Owns the socket, split into independently locked read and write halves,
//! and turns bytes into [`Frame`]s and back.

use super::message_handler::{
    log_subscription_result, FrameRoute, IncomingMessage, MessageForwarder, MessageHandler,
};
use super::ProtocolClient;
use crate::protocol::{Frame, ProtocolError, DEFAULT_MAX_FRAME_SIZE};
use async_trait::async_trait;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, trace, warn};

/// Upper bound on each step of closing the write half
const CLOSE_STEP_TIMEOUT: Duration = Duration::from_secs(1);

struct FrameReader {
    half: OwnedReadHalf,
    buf: BytesMut,
}

/// MQTT client over a plain TCP connection
pub struct TcpClient {
    peer: SocketAddr,
    reader: Mutex<FrameReader>,
    writer: Mutex<OwnedWriteHalf>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    /// Set while a frame is partly written; stays set if that write is abandoned
    mid_frame: AtomicBool,
    forwarder: MessageForwarder,
}

impl TcpClient {
    /// Open a connection to `address` over `network` (`tcp`, `tcp4` or `tcp6`)
    pub async fn dial(network: &str, address: &str) -> Result<Self, ProtocolError> {
        let stream = match network {
            "tcp" => TcpStream::connect(address).await?,
            "tcp4" => Self::connect_matching(address, SocketAddr::is_ipv4).await?,
            "tcp6" => Self::connect_matching(address, SocketAddr::is_ipv6).await?,
            other => return Err(ProtocolError::UnsupportedNetwork(other.to_string())),
        };
        stream.set_nodelay(true)?;

        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        let (closed_tx, _) = watch::channel(false);

        info!(network, %peer, "Transport connection established");

        Ok(Self {
            peer,
            reader: Mutex::new(FrameReader {
                half: read_half,
                buf: BytesMut::with_capacity(4096),
            }),
            writer: Mutex::new(write_half),
            closed: AtomicBool::new(false),
            closed_tx,
            mid_frame: AtomicBool::new(false),
            forwarder: MessageForwarder::new(),
        })
    }

    async fn connect_matching(
        address: &str,
        family: fn(&SocketAddr) -> bool,
    ) -> Result<TcpStream, ProtocolError> {
        let mut last_error = None;
        for candidate in lookup_host(address).await?.filter(|addr| family(addr)) {
            match TcpStream::connect(candidate).await {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }
        Err(match last_error {
            Some(e) => ProtocolError::Io(e),
            None => ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("no address of the requested family for {address}"),
            )),
        })
    }

    /// Deliver received application messages to `sender`
    pub fn with_message_sender(mut self, sender: mpsc::UnboundedSender<IncomingMessage>) -> Self {
        self.forwarder.set_sender(sender);
        self
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtocolClient for TcpClient {
    async fn send_frame(&self, frame: &Frame) -> Result<(), ProtocolError> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }

        let mut buf = BytesMut::with_capacity(frame.encoded_len());
        frame.encode(&mut buf)?;

        // A write stalled on a peer that stopped reading gives up once closed
        let mut closed_rx = self.closed_tx.subscribe();
        let mut writer = tokio::select! {
            biased;
            _ = closed_rx.wait_for(|closed| *closed) => return Err(ProtocolError::ConnectionClosed),
            writer = self.writer.lock() => writer,
        };

        self.mid_frame.store(true, Ordering::SeqCst);
        tokio::select! {
            biased;
            _ = closed_rx.wait_for(|closed| *closed) => {
                debug!(header = frame.header(), "Write abandoned by disconnect");
                return Err(ProtocolError::ConnectionClosed);
            }
            written = async {
                writer.write_all(&buf).await?;
                writer.flush().await
            } => written?,
        }
        self.mid_frame.store(false, Ordering::SeqCst);

        trace!(header = frame.header(), bytes = buf.len(), "Frame written");
        Ok(())
    }

    async fn receive_frame(&self) -> Result<Frame, ProtocolError> {
        let mut closed_rx = self.closed_tx.subscribe();
        if *closed_rx.borrow() {
            return Err(ProtocolError::ConnectionClosed);
        }

        let mut reader = self.reader.lock().await;
        let FrameReader { half, buf } = &mut *reader;
        loop {
            if let Some(frame) = Frame::decode(buf, DEFAULT_MAX_FRAME_SIZE)? {
                trace!(header = frame.header(), bytes = frame.body().len(), "Frame read");
                return Ok(frame);
            }

            tokio::select! {
                _ = closed_rx.changed() => return Err(ProtocolError::ConnectionClosed),
                read = half.read_buf(buf) => {
                    if read? == 0 {
                        return Err(ProtocolError::ConnectionClosed);
                    }
                }
            }
        }
    }

    async fn disconnect(&self) -> Result<(), ProtocolError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // Wakes a blocked receive_frame and any stalled send_frame, which
        // releases the writer
        self.closed_tx.send_replace(true);

        let Ok(mut writer) = tokio::time::timeout(CLOSE_STEP_TIMEOUT, self.writer.lock()).await
        else {
            warn!(peer = %self.peer, "Writer still busy, leaving the socket to close on drop");
            return Ok(());
        };

        // An abandoned write left a partial frame on the wire
        let write_result = if self.mid_frame.load(Ordering::SeqCst) {
            debug!(peer = %self.peer, "Skipping DISCONNECT after a partial write");
            Ok(())
        } else {
            let mut buf = BytesMut::with_capacity(2);
            Frame::disconnect().encode(&mut buf)?;
            match tokio::time::timeout(CLOSE_STEP_TIMEOUT, writer.write_all(&buf)).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(peer = %self.peer, "DISCONNECT not written in time");
                    Ok(())
                }
            }
        };
        let shutdown_result = tokio::time::timeout(CLOSE_STEP_TIMEOUT, writer.shutdown())
            .await
            .unwrap_or(Ok(()));
        drop(writer);
        info!(peer = %self.peer, "Transport connection closed");

        write_result?;
        shutdown_result?;
        Ok(())
    }

    fn handle_frame(&self, frame: Frame) -> Result<Option<Frame>, ProtocolError> {
        match MessageHandler::route_frame(&frame)? {
            FrameRoute::Deliver { message, reply } => {
                if let Err(e) = self.forwarder.forward(message) {
                    debug!("Message not delivered: {}", e);
                }
                Ok(reply)
            }
            FrameRoute::Reply(reply) => Ok(Some(reply)),
            FrameRoute::SubscriptionResult(suback) => {
                log_subscription_result(&suback);
                Ok(None)
            }
            FrameRoute::Infrastructure(packet_type) => {
                debug!(?packet_type, "Broker frame handled");
                Ok(None)
            }
            FrameRoute::Unexpected(packet_type) => {
                warn!(?packet_type, "Ignoring frame a broker should not send");
                Ok(None)
            }
        }
    }
}
