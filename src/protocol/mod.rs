//! Minimal MQTT 3.1.1 wire support
//!
//! Framing lives in [`codec`]; [`packets`] builds and reads the handful of
//! packet layouts the shell needs. The session orchestrator only looks at
//! [`Frame::packet_type`] and asks for [`Frame::pingreq`].

pub mod codec;
pub mod packets;

pub use codec::{Frame, PacketType, ProtocolError, DEFAULT_MAX_FRAME_SIZE};
pub use packets::{
    ConnAck, ConnectPacket, ConnectReturnCode, PacketIdAllocator, PublishPacket, QoS, SubAck,
    Will,
};
