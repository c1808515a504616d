//! Connection session orchestration
//!
//! A session runs three workers against one [`SessionContext`]:
//!
//! - the handshake supervisor waits a bounded time for CONNACK
//! - the receive worker pumps inbound frames into [`dispatch::handle`]
//! - the send worker owns every outbound write, including keep-alive pings
//!
//! Teardown goes through [`SessionContext::disconnect`], which any worker or
//! command may call.

pub mod context;
pub mod dispatch;
pub mod handshake;
pub mod receiver;
pub mod sender;
pub mod signal;

pub use context::SessionContext;
pub use handshake::{HandshakeOutcome, DEFAULT_HANDSHAKE_TIMEOUT};
pub use receiver::ReceiveExit;
pub use sender::{KeepAlive, SendOutcome, DEFAULT_KEEP_ALIVE_SECS};
pub use signal::{Signal, WorkerGroup};

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Start the handshake supervisor, receive worker and send worker.
///
/// Returns as soon as they are spawned; await them through
/// [`SessionContext::shutdown`] or [`WorkerGroup::wait`].
pub fn spawn_workers(ctx: &Arc<SessionContext>, keep_alive: KeepAlive, handshake_timeout: Duration) {
    let workers = ctx.workers();

    let supervisor_ctx = ctx.clone();
    workers.spawn("handshake", async move {
        handshake::supervise(supervisor_ctx, handshake_timeout).await;
    });

    let receive_ctx = ctx.clone();
    workers.spawn("receive", async move {
        let exit = receiver::run(receive_ctx).await;
        debug!(?exit, "Receive worker exited");
    });

    let send_ctx = ctx.clone();
    workers.spawn("send", sender::run(send_ctx, keep_alive));
}
