//! Receive worker: pumps inbound frames until the connection ends

use super::context::SessionContext;
use super::dispatch;
use crate::protocol::ProtocolError;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Why the receive loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveExit {
    /// Teardown was already under way
    Disconnecting,
    /// A pending disconnect request raced the read failure
    DisconnectRequested,
    /// The connection failed on its own
    Failed(String),
}

pub async fn run(ctx: Arc<SessionContext>) -> ReceiveExit {
    let mut disconnect_rx = ctx.subscribe_disconnect();

    loop {
        let received = tokio::select! {
            biased;
            _ = disconnect_rx.wait_for(|disconnecting| *disconnecting) => {
                debug!("Receive loop stopped by disconnect");
                return ReceiveExit::Disconnecting;
            }
            received = receive(&ctx) => received,
        };

        match received {
            Ok(frame) => {
                trace!(header = frame.header(), "Frame received");
                dispatch::handle(&ctx, frame);
            }
            Err(e) => return classify_failure(&ctx, e).await,
        }
    }
}

async fn receive(ctx: &SessionContext) -> Result<crate::protocol::Frame, ProtocolError> {
    match ctx.client() {
        Some(client) => client.receive_frame().await,
        None => Err(ProtocolError::NotConnected),
    }
}

async fn classify_failure(ctx: &SessionContext, e: ProtocolError) -> ReceiveExit {
    if ctx.is_disconnecting() {
        debug!(error = %e, "Read ended during teardown");
        return ReceiveExit::Disconnecting;
    }

    if ctx.disconnect_request().try_take() {
        debug!(error = %e, "Read ended while a disconnect was requested");
        if let Err(e) = ctx.disconnect().await {
            debug!(error = %e, "Requested disconnect failed");
        }
        return ReceiveExit::DisconnectRequested;
    }

    error!(error = %e, "Connection lost");
    // Bring the other workers down too; reconnecting is up to the user
    if let Err(e) = ctx.disconnect().await {
        debug!(error = %e, "Disconnect after read failure failed");
    }
    ReceiveExit::Failed(e.to_string())
}
