//! Shared state of one connection session

use super::handshake::HandshakeOutcome;
use super::signal::{Signal, WorkerGroup};
use crate::error::{ShellError, ShellResult};
use crate::protocol::{Frame, PacketIdAllocator, ProtocolError};
use crate::transport::ProtocolClient;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// State shared by the connection command and its workers.
///
/// A context lives for exactly one connection. Once `disconnecting` is set it
/// never goes back, so reconnecting means building a new context.
pub struct SessionContext {
    client: OnceLock<Arc<dyn ProtocolClient>>,
    disconnecting: AtomicBool,
    workers: WorkerGroup,
    handshake_ack: Signal,
    handshake_end: Signal,
    disconnect_request: Signal,
    disconnect_tx: watch::Sender<bool>,
    outgoing_tx: mpsc::UnboundedSender<Option<Frame>>,
    outgoing_rx: Mutex<Option<mpsc::UnboundedReceiver<Option<Frame>>>>,
    send_loop_end: Signal,
    handshake_outcome: OnceLock<HandshakeOutcome>,
    packet_ids: PacketIdAllocator,
}

impl SessionContext {
    pub fn new() -> Self {
        let (disconnect_tx, _) = watch::channel(false);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        Self {
            client: OnceLock::new(),
            disconnecting: AtomicBool::new(false),
            workers: WorkerGroup::new(),
            handshake_ack: Signal::new(),
            handshake_end: Signal::new(),
            disconnect_request: Signal::new(),
            disconnect_tx,
            outgoing_tx,
            outgoing_rx: Mutex::new(Some(outgoing_rx)),
            send_loop_end: Signal::new(),
            handshake_outcome: OnceLock::new(),
            packet_ids: PacketIdAllocator::new(),
        }
    }

    /// Store the connected client. A context accepts one client only.
    pub fn attach_client(&self, client: Arc<dyn ProtocolClient>) -> ShellResult<()> {
        self.client
            .set(client)
            .map_err(|_| ShellError::AlreadyConnected)
    }

    pub fn client(&self) -> Option<&Arc<dyn ProtocolClient>> {
        self.client.get()
    }

    pub fn has_client(&self) -> bool {
        self.client.get().is_some()
    }

    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting.load(Ordering::SeqCst)
    }

    /// Queue a frame for the send worker
    pub fn enqueue(&self, frame: Frame) -> ShellResult<()> {
        if !self.has_client() || self.is_disconnecting() {
            return Err(ShellError::NotConnected);
        }
        self.outgoing_tx
            .send(Some(frame))
            .map_err(|_| ShellError::NotConnected)
    }

    /// Hand the outgoing queue to the send worker. Only the first call gets it.
    pub(crate) fn take_outgoing(&self) -> Option<mpsc::UnboundedReceiver<Option<Frame>>> {
        self.outgoing_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Subscribe to the teardown broadcast
    pub fn subscribe_disconnect(&self) -> watch::Receiver<bool> {
        self.disconnect_tx.subscribe()
    }

    /// Begin teardown: set `disconnecting`, wake every worker and close the
    /// client.
    ///
    /// Only the first caller does any work. This never waits for workers,
    /// so workers call it themselves.
    pub async fn disconnect(&self) -> Result<(), ProtocolError> {
        if self
            .disconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Disconnect already in progress");
            return Ok(());
        }

        info!("Disconnecting session");
        self.handshake_end.fire();
        self.send_loop_end.fire();
        self.disconnect_tx.send_replace(true);

        let Some(client) = self.client.get() else {
            return Ok(());
        };
        if let Err(e) = client.disconnect().await {
            warn!(error = %e, "Client did not close cleanly");
            return Err(e);
        }
        Ok(())
    }

    /// Disconnect and wait until every worker has finished
    pub async fn shutdown(&self) -> Result<(), ProtocolError> {
        let result = self.disconnect().await;
        self.workers.wait().await;
        result
    }

    /// Ask the send worker to run the disconnect routine
    pub fn request_disconnect(&self) {
        self.disconnect_request.fire();
        // Wake the send loop so the request is serviced promptly
        let _ = self.outgoing_tx.send(None);
    }

    pub(crate) fn record_handshake(&self, outcome: HandshakeOutcome) {
        if self.handshake_outcome.set(outcome).is_err() {
            debug!(?outcome, "Handshake outcome already recorded");
        }
    }

    pub fn handshake_outcome(&self) -> Option<HandshakeOutcome> {
        self.handshake_outcome.get().copied()
    }

    pub fn next_packet_id(&self) -> u16 {
        self.packet_ids.next_id()
    }

    pub fn workers(&self) -> &WorkerGroup {
        &self.workers
    }

    pub(crate) fn handshake_ack(&self) -> &Signal {
        &self.handshake_ack
    }

    pub(crate) fn handshake_end(&self) -> &Signal {
        &self.handshake_end
    }

    pub(crate) fn disconnect_request(&self) -> &Signal {
        &self.disconnect_request
    }

    pub(crate) fn send_loop_end(&self) -> &Signal {
        &self.send_loop_end
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("connected", &self.has_client())
            .field("disconnecting", &self.is_disconnecting())
            .field("workers", &self.workers.len())
            .field("handshake_outcome", &self.handshake_outcome())
            .finish()
    }
}
