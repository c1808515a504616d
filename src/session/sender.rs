//! Send worker: the single writer of the session
//!
//! Every outbound write, whether keep-alive ping or queued frame, goes
//! through [`send_frame`] from this loop.

use super::context::SessionContext;
use crate::protocol::Frame;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, trace, warn};

pub const DEFAULT_KEEP_ALIVE_SECS: u16 = 60;

/// Keep-alive timer setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAlive {
    Disabled,
    Every(Duration),
}

impl KeepAlive {
    /// `None` means the default interval, `Some(0)` disables pings
    pub fn from_secs(secs: Option<u16>) -> Self {
        match secs.unwrap_or(DEFAULT_KEEP_ALIVE_SECS) {
            0 => KeepAlive::Disabled,
            secs => KeepAlive::Every(Duration::from_secs(u64::from(secs))),
        }
    }

    pub fn period(&self) -> Option<Duration> {
        match self {
            KeepAlive::Disabled => None,
            KeepAlive::Every(period) => Some(*period),
        }
    }
}

/// Result of one pass through [`send_frame`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Session is disconnecting, nothing written
    Skipped,
    /// A pending disconnect request was serviced instead of writing
    Disconnected,
    /// No-op frame, nothing to write
    Empty,
    Sent,
    /// Write given up because the session started disconnecting
    Abandoned,
    /// Write failed; the receive worker decides whether the link is dead
    Failed(String),
}

pub async fn run(ctx: Arc<SessionContext>, keep_alive: KeepAlive) {
    let Some(mut outgoing) = ctx.take_outgoing() else {
        error!("Outgoing queue already taken, send worker not started");
        return;
    };

    let mut ticker = keep_alive.period().map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    debug!(keep_alive = ?keep_alive, "Send loop started");

    loop {
        tokio::select! {
            biased;
            _ = ctx.send_loop_end().wait() => {
                debug!("Send loop stopped");
                break;
            }
            _ = next_tick(&mut ticker) => {
                trace!("Keep-alive tick");
                send_frame(&ctx, Some(Frame::pingreq())).await;
            }
            queued = outgoing.recv() => match queued {
                Some(frame) => {
                    send_frame(&ctx, frame).await;
                }
                // The context owns the sender, so this only happens once it is gone
                None => break,
            },
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Guarded write path shared by keep-alive and queued sends
pub async fn send_frame(ctx: &SessionContext, frame: Option<Frame>) -> SendOutcome {
    if ctx.is_disconnecting() {
        return SendOutcome::Skipped;
    }

    if ctx.disconnect_request().try_take() {
        debug!("Servicing disconnect request");
        if let Err(e) = ctx.disconnect().await {
            debug!(error = %e, "Requested disconnect failed");
        }
        return SendOutcome::Disconnected;
    }

    let Some(frame) = frame else {
        return SendOutcome::Empty;
    };
    let Some(client) = ctx.client() else {
        warn!("No client to send through");
        return SendOutcome::Failed("not connected".to_string());
    };

    // A peer that stops reading would otherwise hold this worker forever
    let mut disconnecting = ctx.subscribe_disconnect();
    let written = tokio::select! {
        biased;
        _ = disconnecting.wait_for(|d| *d) => {
            debug!(header = frame.header(), "Send abandoned, session disconnecting");
            return SendOutcome::Abandoned;
        }
        written = client.send_frame(&frame) => written,
    };

    match written {
        Ok(()) => {
            trace!(header = frame.header(), "Frame sent");
            SendOutcome::Sent
        }
        Err(e) => {
            error!(header = frame.header(), error = %e, "Failed to send frame");
            SendOutcome::Failed(e.to_string())
        }
    }
}
