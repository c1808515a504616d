//! Test helpers for integration tests: a scripted in-process broker

#![allow(dead_code)]

use bytes::BytesMut;
use mqttsh::protocol::{Frame, DEFAULT_MAX_FRAME_SIZE};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// CONNACK accepting the connection
pub const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

/// Listener the client under test dials
pub struct FakeBroker {
    listener: TcpListener,
    pub address: String,
}

impl FakeBroker {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        Self { listener, address }
    }

    pub async fn accept(&self) -> BrokerConnection {
        let (socket, _) = tokio::time::timeout(Duration::from_secs(5), self.listener.accept())
            .await
            .expect("client should connect")
            .unwrap();
        BrokerConnection {
            socket,
            buf: BytesMut::new(),
        }
    }
}

/// Broker side of one client connection
pub struct BrokerConnection {
    socket: TcpStream,
    buf: BytesMut,
}

impl BrokerConnection {
    /// Next frame from the client, `None` once the client closed the socket
    pub async fn read_frame(&mut self) -> Option<Frame> {
        loop {
            if let Some(frame) = Frame::decode(&mut self.buf, DEFAULT_MAX_FRAME_SIZE).unwrap() {
                return Some(frame);
            }
            match self.socket.read_buf(&mut self.buf).await {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }
        }
    }

    /// Like [`BrokerConnection::read_frame`], giving up after `limit`
    pub async fn read_frame_within(&mut self, limit: Duration) -> Option<Frame> {
        tokio::time::timeout(limit, self.read_frame())
            .await
            .ok()
            .flatten()
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) {
        self.socket.write_all(bytes).await.unwrap();
    }

    pub async fn write_frame(&mut self, frame: &Frame) {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf).unwrap();
        self.write_raw(&buf).await;
    }

    /// Read the CONNECT and accept it
    pub async fn accept_session(&mut self) -> Frame {
        let connect = self
            .read_frame_within(Duration::from_secs(5))
            .await
            .expect("client should send CONNECT");
        self.write_raw(&CONNACK_ACCEPTED).await;
        connect
    }

    pub async fn close(mut self) {
        let _ = self.socket.shutdown().await;
    }
}

/// An address nothing listens on
pub async fn closed_port_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    address
}

/// Poll `condition` until it holds or `limit` passes
pub async fn wait_until<F: Fn() -> bool>(condition: F, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
