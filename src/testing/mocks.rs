//! Mock implementations for testing
//!
//! Provides a mock [`ProtocolClient`] so the session workers and commands can
//! be exercised without a broker.

use crate::protocol::{Frame, PacketType, ProtocolError};
use crate::transport::ProtocolClient;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::{mpsc, watch};

type Inbound = Result<Frame, ProtocolError>;

/// Mock protocol client
///
/// Inbound frames and read errors are scripted with [`MockClient::push_inbound`]
/// and [`MockClient::push_error`]; `receive_frame` blocks until one is queued
/// or the client is disconnected.
pub struct MockClient {
    sent: Mutex<Vec<Frame>>,
    handled: Mutex<Vec<Frame>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    disconnect_calls: AtomicUsize,
    should_fail_send: bool,
    stall_send: bool,
    auto_connack: bool,
    reply: Option<Frame>,
}

impl MockClient {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (closed_tx, _) = watch::channel(false);
        Self {
            sent: Mutex::new(Vec::new()),
            handled: Mutex::new(Vec::new()),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            closed: AtomicBool::new(false),
            closed_tx,
            disconnect_calls: AtomicUsize::new(0),
            should_fail_send: false,
            stall_send: false,
            auto_connack: false,
            reply: None,
        }
    }

    /// Every `send_frame` fails
    pub fn with_send_failure(mut self) -> Self {
        self.should_fail_send = true;
        self
    }

    /// Every `send_frame` blocks forever, like a write to a peer that
    /// stopped reading
    pub fn with_stalled_send(mut self) -> Self {
        self.stall_send = true;
        self
    }

    /// Answer a sent CONNECT with an accepting CONNACK
    pub fn with_auto_connack(mut self) -> Self {
        self.auto_connack = true;
        self
    }

    /// `handle_frame` returns this reply for every frame
    pub fn with_reply(mut self, reply: Frame) -> Self {
        self.reply = Some(reply);
        self
    }

    pub fn push_inbound(&self, frame: Frame) {
        let _ = self.inbound_tx.send(Ok(frame));
    }

    pub fn push_error(&self, error: ProtocolError) {
        let _ = self.inbound_tx.send(Err(error));
    }

    pub fn sent_frames(&self) -> Vec<Frame> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn handled_frames(&self) -> Vec<Frame> {
        self.handled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolClient for MockClient {
    async fn send_frame(&self, frame: &Frame) -> Result<(), ProtocolError> {
        if self.should_fail_send {
            return Err(ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "Mock send failure",
            )));
        }
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }
        if self.stall_send {
            std::future::pending::<()>().await;
        }

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.clone());

        if self.auto_connack && matches!(frame.packet_type(), Ok(PacketType::Connect)) {
            self.push_inbound(Frame::new(0x20, vec![0x00, 0x00]));
        }
        Ok(())
    }

    async fn receive_frame(&self) -> Result<Frame, ProtocolError> {
        let mut closed_rx = self.closed_tx.subscribe();
        let mut inbound = self.inbound_rx.lock().await;

        tokio::select! {
            biased;
            _ = closed_rx.wait_for(|closed| *closed) => Err(ProtocolError::ConnectionClosed),
            next = inbound.recv() => match next {
                Some(result) => result,
                None => Err(ProtocolError::ConnectionClosed),
            },
        }
    }

    async fn disconnect(&self) -> Result<(), ProtocolError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        self.closed_tx.send_replace(true);
        Ok(())
    }

    fn handle_frame(&self, frame: Frame) -> Result<Option<Frame>, ProtocolError> {
        self.handled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame);
        Ok(self.reply.clone())
    }
}
