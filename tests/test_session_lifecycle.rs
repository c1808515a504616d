//! Session lifecycle tests against an in-process broker
//!
//! Each test drives a real TCP connection through `conn`, so the handshake
//! supervisor, receive worker and send worker all run as they do in the shell.

mod test_helpers;

use bytes::Bytes;
use mqttsh::command::{ConnCommand, DisconnCommand, PubCommand};
use mqttsh::protocol::{ConnectPacket, Frame, PacketType, PublishPacket, QoS};
use mqttsh::session::{receiver, HandshakeOutcome, ReceiveExit, SessionContext};
use mqttsh::{ShellConfig, ShellError, ShellOutcome};
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{closed_port_address, wait_until, FakeBroker};
use tokio::sync::mpsc;

fn new_context() -> Arc<SessionContext> {
    Arc::new(SessionContext::new())
}

#[tokio::test]
async fn test_immediate_connack_completes_handshake() {
    let broker = FakeBroker::bind().await;
    let ctx = new_context();

    let cmd = ConnCommand::new(["-a", broker.address.as_str(), "-k", "0"], ctx.clone()).unwrap();
    let (result, (connect, mut conn)) = tokio::join!(cmd.run(), async {
        let mut conn = broker.accept().await;
        let connect = conn.accept_session().await;
        (connect, conn)
    });
    result.unwrap();
    assert_eq!(connect.packet_type().unwrap(), PacketType::Connect);

    assert!(
        wait_until(
            || ctx.handshake_outcome() == Some(HandshakeOutcome::Acked),
            Duration::from_secs(2)
        )
        .await
    );
    assert!(!ctx.is_disconnecting());

    ctx.shutdown().await.unwrap();
    assert!(ctx.workers().is_empty());

    let disconnect = conn.read_frame_within(Duration::from_secs(2)).await;
    assert_eq!(disconnect, Some(Frame::disconnect()));
}

#[tokio::test]
async fn test_missing_connack_times_out_and_tears_down() {
    let broker = FakeBroker::bind().await;
    let ctx = new_context();

    let mut cmd = ConnCommand::new(["-a", broker.address.as_str()], ctx.clone()).unwrap();
    cmd.handshake_timeout = Some(Duration::from_nanos(1));

    let (result, _conn) = tokio::join!(cmd.run(), broker.accept());
    result.unwrap();

    tokio::time::timeout(Duration::from_secs(2), ctx.workers().wait())
        .await
        .expect("workers should finish after the handshake times out");

    assert_eq!(ctx.handshake_outcome(), Some(HandshakeOutcome::TimedOut));
    assert!(ctx.is_disconnecting());

    // A later read on the closed transport is expected, not an error
    assert_eq!(receiver::run(ctx.clone()).await, ReceiveExit::Disconnecting);
    let client = ctx.client().unwrap();
    assert!(client.receive_frame().await.is_err());
}

#[tokio::test]
async fn test_dial_failure_starts_no_workers() {
    let ctx = new_context();
    let address = closed_port_address().await;

    let cmd = ConnCommand::new(["-a", address.as_str()], ctx.clone()).unwrap();
    let result = cmd.run().await;

    assert!(matches!(result, Err(ShellError::Dial { .. })));
    assert!(!ctx.has_client());
    assert!(ctx.workers().is_empty());
}

#[tokio::test]
async fn test_argument_error_is_reported_before_dialing() {
    let result = ConnCommand::new(["--not-exit-flag"], new_context());
    assert!(matches!(result, Err(ShellError::ArgsParse { .. })));
}

#[tokio::test]
async fn test_keep_alive_sends_pingreq() {
    let broker = FakeBroker::bind().await;
    let ctx = new_context();

    let cmd = ConnCommand::new(["-a", broker.address.as_str(), "-k", "1"], ctx.clone()).unwrap();
    let (result, mut conn) = tokio::join!(cmd.run(), broker.accept());
    result.unwrap();

    let connect = conn.accept_session().await;
    assert_eq!(connect.packet_type().unwrap(), PacketType::Connect);
    // Keep-alive sits in bytes 8 and 9 of the CONNECT body
    assert_eq!(&connect.body()[8..10], &[0x00, 0x01]);

    let ping = conn.read_frame_within(Duration::from_millis(2500)).await;
    assert_eq!(ping, Some(Frame::pingreq()));

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_queued_publish_reaches_broker() {
    let broker = FakeBroker::bind().await;
    let ctx = new_context();

    let cmd = ConnCommand::new(["-a", broker.address.as_str(), "-k", "0"], ctx.clone()).unwrap();
    let (result, mut conn) = tokio::join!(cmd.run(), broker.accept());
    result.unwrap();
    conn.accept_session().await;

    PubCommand::new(["-t", "greetings", "-m", "hello", "-q", "1"], ctx.clone())
        .unwrap()
        .run()
        .unwrap();

    let frame = conn
        .read_frame_within(Duration::from_secs(2))
        .await
        .expect("publish should arrive");
    let publish = PublishPacket::parse(&frame).unwrap();
    assert_eq!(publish.topic, "greetings");
    assert_eq!(publish.payload.as_ref(), b"hello");
    assert_eq!(publish.qos, QoS::AtLeastOnce);
    assert!(publish.packet_id.is_some());

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_inbound_publish_is_delivered_and_acknowledged() {
    let broker = FakeBroker::bind().await;
    let ctx = new_context();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let cmd = ConnCommand::new(["-a", broker.address.as_str(), "-k", "0"], ctx.clone())
        .unwrap()
        .with_message_sender(tx);
    let (result, mut conn) = tokio::join!(cmd.run(), broker.accept());
    result.unwrap();
    conn.accept_session().await;

    let inbound = PublishPacket {
        topic: "sensors/temp".to_string(),
        payload: Bytes::from_static(b"21.5"),
        qos: QoS::AtLeastOnce,
        retain: false,
        dup: false,
        packet_id: Some(42),
    };
    conn.write_frame(&inbound.to_frame().unwrap()).await;

    let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("message should be forwarded")
        .unwrap();
    assert_eq!(message.topic, "sensors/temp");
    assert_eq!(message.payload.as_ref(), b"21.5");

    let puback = conn
        .read_frame_within(Duration::from_secs(2))
        .await
        .expect("PUBACK should be sent");
    assert_eq!(puback.packet_type().unwrap(), PacketType::PubAck);
    assert_eq!(puback.body().as_ref(), &[0x00, 42]);

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_broker_hangup_ends_session() {
    let broker = FakeBroker::bind().await;
    let ctx = new_context();

    let cmd = ConnCommand::new(["-a", broker.address.as_str(), "-k", "0"], ctx.clone()).unwrap();
    let (result, mut conn) = tokio::join!(cmd.run(), broker.accept());
    result.unwrap();
    conn.accept_session().await;
    assert!(
        wait_until(
            || ctx.handshake_outcome().is_some(),
            Duration::from_secs(2)
        )
        .await
    );

    conn.close().await;

    tokio::time::timeout(Duration::from_secs(2), ctx.workers().wait())
        .await
        .expect("workers should stop after the broker hangs up");
    assert!(ctx.is_disconnecting());
}

#[tokio::test]
async fn test_connect_packet_carries_options() {
    let broker = FakeBroker::bind().await;
    let ctx = new_context();

    let cmd = ConnCommand::new(
        [
            "-a",
            broker.address.as_str(),
            "-i",
            "probe-1",
            "-u",
            "alice",
            "-P",
            "secret",
            "-k",
            "0",
        ],
        ctx.clone(),
    )
    .unwrap();
    let (result, mut conn) = tokio::join!(cmd.run(), broker.accept());
    result.unwrap();

    let connect = conn.accept_session().await;
    let expected = ConnectPacket {
        keep_alive: 0,
        username: Some("alice".to_string()),
        password: Some("secret".to_string()),
        ..ConnectPacket::new("probe-1")
    }
    .to_frame()
    .unwrap();
    assert_eq!(connect, expected);

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shell_reconnects_after_disconn() {
    let broker = FakeBroker::bind().await;
    let mut shell = mqttsh::Shell::new(ShellConfig::default());
    let conn_line = format!("conn -a {} -k 0", broker.address);

    for _ in 0..2 {
        let (outcome, mut conn) = tokio::join!(shell.execute(&conn_line), broker.accept());
        assert_eq!(outcome.unwrap(), ShellOutcome::Continue);
        conn.accept_session().await;

        let ctx = shell.context().clone();
        assert!(
            wait_until(
                || ctx.handshake_outcome() == Some(HandshakeOutcome::Acked),
                Duration::from_secs(2)
            )
            .await
        );

        assert_eq!(
            shell.execute("disconn").await.unwrap(),
            ShellOutcome::Continue
        );
        assert!(ctx.is_disconnecting());
        assert!(!shell.context().has_client());
    }

    assert_eq!(shell.execute("quit").await.unwrap(), ShellOutcome::Quit);
}

/// Start a session whose broker accepts CONNECT and then never reads again,
/// with enough queued PUBLISH traffic to fill both socket buffers
async fn session_with_stalled_broker(
    broker: &FakeBroker,
) -> (Arc<SessionContext>, test_helpers::BrokerConnection) {
    let ctx = new_context();
    let cmd = ConnCommand::new(["-a", broker.address.as_str(), "-k", "0"], ctx.clone()).unwrap();
    let (result, mut conn) = tokio::join!(cmd.run(), broker.accept());
    result.unwrap();
    conn.accept_session().await;

    let payload = Bytes::from(vec![0x5A; 200 * 1024]);
    for _ in 0..64 {
        let publish = PublishPacket {
            topic: "bulk".to_string(),
            payload: payload.clone(),
            qos: QoS::AtMostOnce,
            retain: false,
            dup: false,
            packet_id: None,
        };
        ctx.enqueue(publish.to_frame().unwrap()).unwrap();
    }
    // Give the send worker time to block on the full socket
    tokio::time::sleep(Duration::from_millis(200)).await;
    (ctx, conn)
}

#[tokio::test]
async fn test_shutdown_completes_when_broker_stops_reading() {
    let broker = FakeBroker::bind().await;
    let (ctx, _conn) = session_with_stalled_broker(&broker).await;

    let result = tokio::time::timeout(Duration::from_secs(5), ctx.shutdown())
        .await
        .expect("shutdown should not wait on a stalled write");
    assert!(result.is_ok());
    assert!(ctx.is_disconnecting());
    assert!(ctx.workers().is_empty());
}

#[tokio::test]
async fn test_disconn_completes_when_broker_stops_reading() {
    let broker = FakeBroker::bind().await;
    let (ctx, _conn) = session_with_stalled_broker(&broker).await;

    let cmd = DisconnCommand::new(Vec::<String>::new(), ctx.clone()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), cmd.run())
        .await
        .expect("disconn should fall back when the send worker is stuck")
        .unwrap();
    assert!(ctx.is_disconnecting());
    assert!(ctx.workers().is_empty());
}
