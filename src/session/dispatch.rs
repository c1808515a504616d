//! Inbound frame dispatch

use super::context::SessionContext;
use crate::protocol::{ConnAck, Frame, PacketType};
use tracing::{debug, error, warn};

/// Apply the orchestrator's side effects for one inbound frame.
///
/// CONNACK is consumed here; every other frame goes to the client. Nothing
/// in here blocks on another worker.
pub fn handle(ctx: &SessionContext, frame: Frame) {
    let packet_type = match frame.packet_type() {
        Ok(packet_type) => packet_type,
        Err(e) => {
            warn!(header = frame.header(), error = %e, "Dropping unidentifiable frame");
            return;
        }
    };

    if packet_type == PacketType::ConnAck {
        match ConnAck::parse(&frame) {
            Ok(connack) if connack.is_accepted() => {
                debug!(session_present = connack.session_present, "CONNACK accepted");
                ctx.handshake_ack().fire();
            }
            Ok(connack) => {
                warn!(code = ?connack.code, "Broker refused the connection");
            }
            Err(e) => warn!(error = %e, "Malformed CONNACK"),
        }
        return;
    }

    let Some(client) = ctx.client() else {
        warn!(?packet_type, "Frame received without a client");
        return;
    };

    match client.handle_frame(frame) {
        Ok(Some(reply)) => {
            if let Err(e) = ctx.enqueue(reply) {
                debug!(?packet_type, error = %e, "Reply not queued");
            }
        }
        Ok(None) => {}
        Err(e) => error!(?packet_type, error = %e, "Client failed to handle frame"),
    }
}
