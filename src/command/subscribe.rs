//! The `sub` and `unsub` commands

use super::{parse_args, qos_parser, to_qos};
use crate::error::ShellResult;
use crate::protocol::packets::{subscribe_frame, unsubscribe_frame};
use crate::protocol::QoS;
use crate::session::SessionContext;
use clap::Parser;
use std::ffi::OsString;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "sub", no_binary_name = true, about = "Subscribe to a topic filter")]
struct SubArgs {
    /// Topic filter, wildcards allowed
    #[arg(short, long)]
    topic: String,

    /// Maximum QoS to receive at
    #[arg(short, long, default_value_t = 0, value_parser = qos_parser())]
    qos: u8,
}

#[derive(Debug, Parser)]
#[command(name = "unsub", no_binary_name = true, about = "Unsubscribe from a topic filter")]
struct UnsubArgs {
    #[arg(short, long)]
    topic: String,
}

pub struct SubCommand {
    pub topic: String,
    pub qos: QoS,
    ctx: Arc<SessionContext>,
}

impl SubCommand {
    pub fn new<I, S>(args: I, ctx: Arc<SessionContext>) -> ShellResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString> + Clone,
    {
        let args: SubArgs = parse_args(args)?;
        Ok(Self {
            topic: args.topic,
            qos: to_qos(args.qos)?,
            ctx,
        })
    }

    pub fn run(&self) -> ShellResult<()> {
        let packet_id = self.ctx.next_packet_id();
        self.ctx
            .enqueue(subscribe_frame(packet_id, &self.topic, self.qos)?)?;
        debug!(topic = %self.topic, packet_id, "Subscribe queued");
        Ok(())
    }
}

pub struct UnsubCommand {
    pub topic: String,
    ctx: Arc<SessionContext>,
}

impl UnsubCommand {
    pub fn new<I, S>(args: I, ctx: Arc<SessionContext>) -> ShellResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString> + Clone,
    {
        let args: UnsubArgs = parse_args(args)?;
        Ok(Self {
            topic: args.topic,
            ctx,
        })
    }

    pub fn run(&self) -> ShellResult<()> {
        let packet_id = self.ctx.next_packet_id();
        self.ctx
            .enqueue(unsubscribe_frame(packet_id, &self.topic)?)?;
        debug!(topic = %self.topic, packet_id, "Unsubscribe queued");
        Ok(())
    }
}
