//! The `pub` command

use super::{parse_args, qos_parser, to_qos};
use crate::error::ShellResult;
use crate::protocol::{PublishPacket, QoS};
use crate::session::SessionContext;
use bytes::Bytes;
use clap::Parser;
use std::ffi::OsString;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "pub", no_binary_name = true, about = "Publish a message")]
struct PubArgs {
    /// Topic to publish to
    #[arg(short, long)]
    topic: String,

    /// Message payload
    #[arg(short, long, default_value = "")]
    message: String,

    #[arg(short, long, default_value_t = 0, value_parser = qos_parser())]
    qos: u8,

    /// Ask the broker to retain the message
    #[arg(short, long)]
    retain: bool,
}

pub struct PubCommand {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    ctx: Arc<SessionContext>,
}

impl PubCommand {
    pub fn new<I, S>(args: I, ctx: Arc<SessionContext>) -> ShellResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString> + Clone,
    {
        let args: PubArgs = parse_args(args)?;
        Ok(Self {
            topic: args.topic,
            payload: Bytes::from(args.message),
            qos: to_qos(args.qos)?,
            retain: args.retain,
            ctx,
        })
    }

    /// Queue the PUBLISH on the session
    pub fn run(&self) -> ShellResult<()> {
        let packet_id = match self.qos {
            QoS::AtMostOnce => None,
            _ => Some(self.ctx.next_packet_id()),
        };
        let frame = PublishPacket {
            topic: self.topic.clone(),
            payload: self.payload.clone(),
            qos: self.qos,
            retain: self.retain,
            dup: false,
            packet_id,
        }
        .to_frame()?;

        self.ctx.enqueue(frame)?;
        debug!(topic = %self.topic, qos = ?self.qos, ?packet_id, "Publish queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShellError;
    use crate::testing::MockClient;

    #[test]
    fn test_topic_is_required() {
        let result = PubCommand::new(["-m", "hello"], Arc::new(SessionContext::new()));
        assert!(matches!(result, Err(ShellError::ArgsParse { .. })));
    }

    #[test]
    fn test_publish_requires_connection() {
        let cmd = PubCommand::new(["-t", "a/b"], Arc::new(SessionContext::new())).unwrap();
        assert!(matches!(cmd.run(), Err(ShellError::NotConnected)));
    }

    #[test]
    fn test_publish_is_queued() {
        let ctx = Arc::new(SessionContext::new());
        ctx.attach_client(Arc::new(MockClient::new())).unwrap();
        let mut outgoing = ctx.take_outgoing().unwrap();

        let cmd = PubCommand::new(
            ["-t", "a/b", "-m", "hello world", "-q", "1", "-r"],
            ctx.clone(),
        )
        .unwrap();
        cmd.run().unwrap();

        let frame = outgoing.try_recv().unwrap().unwrap();
        let publish = PublishPacket::parse(&frame).unwrap();
        assert_eq!(publish.topic, "a/b");
        assert_eq!(publish.payload.as_ref(), b"hello world");
        assert_eq!(publish.qos, QoS::AtLeastOnce);
        assert!(publish.retain);
        assert_eq!(publish.packet_id, Some(1));
    }
}
