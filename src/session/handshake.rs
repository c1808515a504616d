//! CONNACK supervision with a bounded wait

use super::context::SessionContext;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Terminal state of the handshake supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Broker accepted the connection
    Acked,
    /// Teardown began before the broker answered
    Aborted,
    /// No answer in time; the supervisor started teardown itself
    TimedOut,
}

/// Absent or zero falls back to [`DEFAULT_HANDSHAKE_TIMEOUT`]
pub fn resolve_timeout(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(timeout) if !timeout.is_zero() => timeout,
        _ => DEFAULT_HANDSHAKE_TIMEOUT,
    }
}

/// Wait for the broker to acknowledge CONNECT.
///
/// An ack or abort that is already pending wins over an elapsed timer.
pub async fn supervise(ctx: Arc<SessionContext>, timeout: Duration) -> HandshakeOutcome {
    debug!(?timeout, "Waiting for CONNACK");

    let outcome = tokio::select! {
        biased;
        _ = ctx.handshake_ack().wait() => HandshakeOutcome::Acked,
        _ = ctx.handshake_end().wait() => HandshakeOutcome::Aborted,
        _ = tokio::time::sleep(timeout) => HandshakeOutcome::TimedOut,
    };

    match outcome {
        HandshakeOutcome::Acked => info!("Connection acknowledged by broker"),
        HandshakeOutcome::Aborted => debug!("Handshake aborted by disconnect"),
        HandshakeOutcome::TimedOut => {
            warn!(?timeout, "No CONNACK before timeout, disconnecting");
            if let Err(e) = ctx.disconnect().await {
                debug!(error = %e, "Disconnect after handshake timeout failed");
            }
        }
    }

    ctx.record_handshake(outcome);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClient;

    fn connected() -> (Arc<SessionContext>, Arc<MockClient>) {
        let ctx = Arc::new(SessionContext::new());
        let client = Arc::new(MockClient::new());
        ctx.attach_client(client.clone()).unwrap();
        (ctx, client)
    }

    #[test]
    fn test_resolve_timeout_defaults() {
        assert_eq!(resolve_timeout(None), DEFAULT_HANDSHAKE_TIMEOUT);
        assert_eq!(resolve_timeout(Some(Duration::ZERO)), DEFAULT_HANDSHAKE_TIMEOUT);
        assert_eq!(
            resolve_timeout(Some(Duration::from_millis(250))),
            Duration::from_millis(250)
        );
    }

    #[tokio::test]
    async fn test_ack_completes_handshake() {
        let (ctx, client) = connected();
        ctx.handshake_ack().fire();

        let outcome = supervise(ctx.clone(), Duration::from_secs(5)).await;

        assert_eq!(outcome, HandshakeOutcome::Acked);
        assert!(!ctx.is_disconnecting());
        assert_eq!(client.disconnect_calls(), 0);
        assert_eq!(ctx.handshake_outcome(), Some(HandshakeOutcome::Acked));
    }

    #[tokio::test]
    async fn test_pending_ack_beats_elapsed_timer() {
        let (ctx, _client) = connected();
        ctx.handshake_ack().fire();

        let outcome = supervise(ctx.clone(), Duration::from_nanos(1)).await;
        assert_eq!(outcome, HandshakeOutcome::Acked);
    }

    #[tokio::test]
    async fn test_abort_does_not_disconnect_again() {
        let (ctx, client) = connected();
        let supervisor = tokio::spawn(supervise(ctx.clone(), Duration::from_secs(5)));

        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.disconnect().await.unwrap();

        assert_eq!(supervisor.await.unwrap(), HandshakeOutcome::Aborted);
        assert_eq!(client.disconnect_calls(), 1);
    }

    #[tokio::test]
    async fn test_pending_abort_beats_elapsed_timer() {
        let (ctx, client) = connected();
        ctx.disconnect().await.unwrap();

        let outcome = supervise(ctx.clone(), Duration::from_nanos(1)).await;

        assert_eq!(outcome, HandshakeOutcome::Aborted);
        assert_eq!(client.disconnect_calls(), 1);
        assert_eq!(ctx.handshake_outcome(), Some(HandshakeOutcome::Aborted));
    }

    #[tokio::test]
    async fn test_pending_end_beats_elapsed_timer() {
        let (ctx, client) = connected();
        ctx.handshake_end().fire();

        let outcome = supervise(ctx.clone(), Duration::from_nanos(1)).await;

        assert_eq!(outcome, HandshakeOutcome::Aborted);
        assert!(!ctx.is_disconnecting());
        assert_eq!(client.disconnect_calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_runs_disconnect() {
        let (ctx, client) = connected();

        let outcome = supervise(ctx.clone(), Duration::from_millis(20)).await;

        assert_eq!(outcome, HandshakeOutcome::TimedOut);
        assert!(ctx.is_disconnecting());
        assert_eq!(client.disconnect_calls(), 1);
    }
}
