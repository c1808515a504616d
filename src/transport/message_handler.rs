//! Inbound frame handling for the TCP client
//!
//! Pure decisions about what an inbound frame means live on
//! [`MessageHandler`]; [`MessageForwarder`] hands received messages to
//! whoever prints them.

use crate::protocol::packets::{
    parse_packet_id, puback_frame, pubcomp_frame, pubrec_frame, pubrel_frame,
};
use crate::protocol::{Frame, PacketType, ProtocolError, PublishPacket, QoS, SubAck};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Application message received from the broker
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn from_publish(publish: &PublishPacket) -> Self {
        Self {
            topic: publish.topic.clone(),
            payload: publish.payload.clone(),
            qos: publish.qos,
            retain: publish.retain,
            received_at: Utc::now(),
        }
    }
}

/// What the client should do with an inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameRoute {
    /// Deliver the message, then send the reply if there is one
    Deliver {
        message: IncomingMessage,
        reply: Option<Frame>,
    },
    /// Send a protocol reply only
    Reply(Frame),
    /// Subscription result
    SubscriptionResult(SubAck),
    /// Nothing to do besides noting it
    Infrastructure(PacketType),
    /// Brokers never send this type to a client
    Unexpected(PacketType),
}

/// Pure routing decisions for inbound frames
pub struct MessageHandler;

impl MessageHandler {
    pub fn route_frame(frame: &Frame) -> Result<FrameRoute, ProtocolError> {
        let route = match frame.packet_type()? {
            PacketType::Publish => {
                let publish = PublishPacket::parse(frame)?;
                let reply = Self::publish_reply(&publish);
                FrameRoute::Deliver {
                    message: IncomingMessage::from_publish(&publish),
                    reply,
                }
            }
            // QoS 2 flow, outbound side
            PacketType::PubRec => FrameRoute::Reply(pubrel_frame(parse_packet_id(frame)?)),
            // QoS 2 flow, inbound side
            PacketType::PubRel => FrameRoute::Reply(pubcomp_frame(parse_packet_id(frame)?)),
            PacketType::SubAck => FrameRoute::SubscriptionResult(SubAck::parse(frame)?),
            packet_type @ (PacketType::ConnAck
            | PacketType::PubAck
            | PacketType::PubComp
            | PacketType::UnsubAck
            | PacketType::PingResp) => FrameRoute::Infrastructure(packet_type),
            packet_type => FrameRoute::Unexpected(packet_type),
        };
        Ok(route)
    }

    /// Acknowledgement owed for an inbound PUBLISH
    pub fn publish_reply(publish: &PublishPacket) -> Option<Frame> {
        match (publish.qos, publish.packet_id) {
            (QoS::AtLeastOnce, Some(packet_id)) => Some(puback_frame(packet_id)),
            (QoS::ExactlyOnce, Some(packet_id)) => Some(pubrec_frame(packet_id)),
            _ => None,
        }
    }
}

/// Forwards received messages to a consumer channel
#[derive(Debug, Default)]
pub struct MessageForwarder {
    sender: Option<mpsc::UnboundedSender<IncomingMessage>>,
}

impl MessageForwarder {
    pub fn new() -> Self {
        Self { sender: None }
    }

    pub fn set_sender(&mut self, sender: mpsc::UnboundedSender<IncomingMessage>) {
        self.sender = Some(sender);
    }

    pub fn forward(&self, message: IncomingMessage) -> Result<(), String> {
        match &self.sender {
            Some(sender) => {
                debug!(topic = %message.topic, bytes = message.payload.len(), "Forwarding message");
                sender
                    .send(message)
                    .map_err(|e| format!("Failed to forward message: {e}"))
            }
            None => {
                warn!(topic = %message.topic, "Received message but no consumer configured - message dropped");
                Err("No message consumer configured".to_string())
            }
        }
    }
}

/// Log a SUBACK the way the shell reports it
pub(crate) fn log_subscription_result(suback: &SubAck) {
    if suback.has_failures() {
        warn!(
            packet_id = suback.packet_id,
            return_codes = ?suback.return_codes,
            "Subscription rejected by broker"
        );
    } else {
        info!(
            packet_id = suback.packet_id,
            return_codes = ?suback.return_codes,
            "Subscription confirmed"
        );
    }
}
