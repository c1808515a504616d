//! Transport layer for broker communication
//!
//! This module provides the protocol client abstraction the session
//! orchestrator drives, and its TCP implementation.

use crate::protocol::{Frame, ProtocolError};

pub mod client;
pub mod message_handler;

pub use client::TcpClient;
pub use message_handler::{IncomingMessage, MessageForwarder, MessageHandler};

/// Protocol client trait
///
/// Implementations must tolerate one concurrent reader and one concurrent
/// writer: the session runs a single receive loop and funnels every write
/// through a single send loop.
#[async_trait::async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Write one frame to the broker
    async fn send_frame(&self, frame: &Frame) -> Result<(), ProtocolError>;

    /// Block until the next inbound frame arrives or the connection ends
    async fn receive_frame(&self) -> Result<Frame, ProtocolError>;

    /// Close the connection gracefully. Calling it more than once is a no-op.
    async fn disconnect(&self) -> Result<(), ProtocolError>;

    /// Protocol-level handling of an inbound frame other than CONNACK.
    ///
    /// Returns a reply frame when the protocol requires one (PUBACK for an
    /// inbound QoS 1 PUBLISH, for instance).
    fn handle_frame(&self, frame: Frame) -> Result<Option<Frame>, ProtocolError>;
}
