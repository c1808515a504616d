//! Builders and parsers for the MQTT 3.1.1 packets the shell uses

use super::codec::{Frame, PacketType, ProtocolError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicU16, Ordering};

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;

/// Quality of service level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(ProtocolError::malformed(format!("invalid QoS {other}"))),
        }
    }
}

/// Last will registered with the broker on CONNECT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub message: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

/// CONNECT packet contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    pub client_id: String,
    pub clean_session: bool,
    /// Keep-alive in seconds, 0 disables it on the broker side
    pub keep_alive: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub will: Option<Will>,
}

impl ConnectPacket {
    pub fn new<S: Into<String>>(client_id: S) -> Self {
        Self {
            client_id: client_id.into(),
            clean_session: true,
            keep_alive: 60,
            username: None,
            password: None,
            will: None,
        }
    }

    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        if self.password.is_some() && self.username.is_none() {
            return Err(ProtocolError::malformed(
                "a password requires a username in MQTT 3.1.1",
            ));
        }

        let mut flags = 0u8;
        if self.clean_session {
            flags |= 0x02;
        }
        if let Some(will) = &self.will {
            flags |= 0x04 | ((will.qos as u8) << 3);
            if will.retain {
                flags |= 0x20;
            }
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        if self.username.is_some() {
            flags |= 0x80;
        }

        let mut body = BytesMut::new();
        write_string(&mut body, PROTOCOL_NAME)?;
        body.put_u8(PROTOCOL_LEVEL);
        body.put_u8(flags);
        body.put_u16(self.keep_alive);

        write_string(&mut body, &self.client_id)?;
        if let Some(will) = &self.will {
            write_string(&mut body, &will.topic)?;
            write_binary(&mut body, &will.message)?;
        }
        if let Some(username) = &self.username {
            write_string(&mut body, username)?;
        }
        if let Some(password) = &self.password {
            write_binary(&mut body, password.as_bytes())?;
        }

        Ok(Frame::new(0x10, body.freeze()))
    }
}

/// CONNACK return codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    Accepted,
    UnacceptableProtocolVersion,
    IdentifierRejected,
    ServerUnavailable,
    BadCredentials,
    NotAuthorized,
    Reserved(u8),
}

impl From<u8> for ConnectReturnCode {
    fn from(code: u8) -> Self {
        match code {
            0 => ConnectReturnCode::Accepted,
            1 => ConnectReturnCode::UnacceptableProtocolVersion,
            2 => ConnectReturnCode::IdentifierRejected,
            3 => ConnectReturnCode::ServerUnavailable,
            4 => ConnectReturnCode::BadCredentials,
            5 => ConnectReturnCode::NotAuthorized,
            other => ConnectReturnCode::Reserved(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub code: ConnectReturnCode,
}

impl ConnAck {
    pub fn parse(frame: &Frame) -> Result<Self, ProtocolError> {
        expect_type(frame, PacketType::ConnAck)?;
        let body = frame.body();
        if body.len() != 2 {
            return Err(ProtocolError::malformed(format!(
                "CONNACK body must be 2 bytes, got {}",
                body.len()
            )));
        }
        Ok(Self {
            session_present: body[0] & 0x01 == 0x01,
            code: ConnectReturnCode::from(body[1]),
        })
    }

    pub fn is_accepted(&self) -> bool {
        self.code == ConnectReturnCode::Accepted
    }
}

/// PUBLISH packet contents, used both outbound and inbound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    /// Present exactly when `qos` is above `AtMostOnce`
    pub packet_id: Option<u16>,
}

impl PublishPacket {
    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        let mut header = 0x30 | ((self.qos as u8) << 1);
        if self.retain {
            header |= 0x01;
        }
        if self.dup {
            header |= 0x08;
        }

        let mut body = BytesMut::with_capacity(2 + self.topic.len() + 2 + self.payload.len());
        write_string(&mut body, &self.topic)?;
        match (self.qos, self.packet_id) {
            (QoS::AtMostOnce, _) => {}
            (_, Some(packet_id)) => body.put_u16(packet_id),
            (_, None) => {
                return Err(ProtocolError::malformed(
                    "PUBLISH with QoS above 0 needs a packet identifier",
                ))
            }
        }
        body.put_slice(&self.payload);

        Ok(Frame::new(header, body.freeze()))
    }

    pub fn parse(frame: &Frame) -> Result<Self, ProtocolError> {
        expect_type(frame, PacketType::Publish)?;
        let flags = frame.flags();
        let qos = QoS::try_from((flags >> 1) & 0x03)?;
        let mut body = frame.body().clone();

        let topic = read_string(&mut body)?;
        let packet_id = match qos {
            QoS::AtMostOnce => None,
            _ => Some(read_u16(&mut body)?),
        };

        Ok(Self {
            topic,
            payload: body,
            qos,
            retain: flags & 0x01 == 0x01,
            dup: flags & 0x08 == 0x08,
            packet_id,
        })
    }
}

/// SUBSCRIBE with a single topic filter
pub fn subscribe_frame(packet_id: u16, filter: &str, qos: QoS) -> Result<Frame, ProtocolError> {
    let mut body = BytesMut::with_capacity(2 + 2 + filter.len() + 1);
    body.put_u16(packet_id);
    write_string(&mut body, filter)?;
    body.put_u8(qos as u8);
    Ok(Frame::new(0x82, body.freeze()))
}

/// UNSUBSCRIBE with a single topic filter
pub fn unsubscribe_frame(packet_id: u16, filter: &str) -> Result<Frame, ProtocolError> {
    let mut body = BytesMut::with_capacity(2 + 2 + filter.len());
    body.put_u16(packet_id);
    write_string(&mut body, filter)?;
    Ok(Frame::new(0xA2, body.freeze()))
}

pub fn puback_frame(packet_id: u16) -> Frame {
    packet_id_frame(0x40, packet_id)
}

pub fn pubrec_frame(packet_id: u16) -> Frame {
    packet_id_frame(0x50, packet_id)
}

pub fn pubrel_frame(packet_id: u16) -> Frame {
    packet_id_frame(0x62, packet_id)
}

pub fn pubcomp_frame(packet_id: u16) -> Frame {
    packet_id_frame(0x70, packet_id)
}

/// Read the packet identifier that leads the body of acks and SUBACK
pub fn parse_packet_id(frame: &Frame) -> Result<u16, ProtocolError> {
    let mut body = frame.body().clone();
    read_u16(&mut body)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub packet_id: u16,
    pub return_codes: Vec<u8>,
}

impl SubAck {
    pub fn parse(frame: &Frame) -> Result<Self, ProtocolError> {
        expect_type(frame, PacketType::SubAck)?;
        let mut body = frame.body().clone();
        let packet_id = read_u16(&mut body)?;
        Ok(Self {
            packet_id,
            return_codes: body.to_vec(),
        })
    }

    /// 0x80 marks a rejected filter
    pub fn has_failures(&self) -> bool {
        self.return_codes.iter().any(|&code| code >= 0x80)
    }
}

/// Hands out non-zero packet identifiers, wrapping after 65535
#[derive(Debug)]
pub struct PacketIdAllocator {
    next: AtomicU16,
}

impl PacketIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU16::new(1),
        }
    }

    pub fn next_id(&self) -> u16 {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}

impl Default for PacketIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn packet_id_frame(header: u8, packet_id: u16) -> Frame {
    Frame::new(header, Bytes::copy_from_slice(&packet_id.to_be_bytes()))
}

fn expect_type(frame: &Frame, expected: PacketType) -> Result<(), ProtocolError> {
    let actual = frame.packet_type()?;
    if actual != expected {
        return Err(ProtocolError::malformed(format!(
            "expected {expected:?}, got {actual:?}"
        )));
    }
    Ok(())
}

fn write_string(dst: &mut BytesMut, value: &str) -> Result<(), ProtocolError> {
    write_binary(dst, value.as_bytes())
}

fn write_binary(dst: &mut BytesMut, value: &[u8]) -> Result<(), ProtocolError> {
    let len = u16::try_from(value.len()).map_err(|_| {
        ProtocolError::malformed(format!("field of {} bytes exceeds 65535", value.len()))
    })?;
    dst.put_u16(len);
    dst.put_slice(value);
    Ok(())
}

fn read_u16(src: &mut Bytes) -> Result<u16, ProtocolError> {
    if src.remaining() < 2 {
        return Err(ProtocolError::malformed("truncated packet identifier"));
    }
    Ok(src.get_u16())
}

fn read_string(src: &mut Bytes) -> Result<String, ProtocolError> {
    let len = read_u16(src)? as usize;
    if src.remaining() < len {
        return Err(ProtocolError::malformed("truncated string"));
    }
    let raw = src.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|e| ProtocolError::malformed(e.to_string()))
}
