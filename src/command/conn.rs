//! The `conn` command: dial, CONNECT, and start the session workers

use super::{parse_args, qos_parser, to_qos};
use crate::config::ShellConfig;
use crate::error::{ShellError, ShellResult};
use crate::protocol::{ConnectPacket, Frame, Will};
use crate::session::handshake::resolve_timeout;
use crate::session::{spawn_workers, KeepAlive, SessionContext, DEFAULT_KEEP_ALIVE_SECS};
use crate::transport::{IncomingMessage, ProtocolClient, TcpClient};
use bytes::Bytes;
use clap::Parser;
use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "conn", no_binary_name = true, about = "Connect to a broker")]
struct ConnArgs {
    /// Network to dial (tcp, tcp4, tcp6)
    #[arg(short, long)]
    network: Option<String>,

    /// Broker address as host:port
    #[arg(short, long)]
    address: Option<String>,

    /// Client identifier (random when omitted)
    #[arg(short = 'i', long)]
    client_id: Option<String>,

    #[arg(short, long)]
    username: Option<String>,

    #[arg(short = 'P', long)]
    password: Option<String>,

    /// Start a clean session
    #[arg(long, value_name = "BOOL")]
    clean_session: Option<bool>,

    /// Keep-alive in seconds, 0 disables pings
    #[arg(short, long, value_name = "SECS")]
    keep_alive: Option<u16>,

    #[arg(long)]
    will_topic: Option<String>,

    #[arg(long, requires = "will_topic")]
    will_message: Option<String>,

    #[arg(long, default_value_t = 0, value_parser = qos_parser())]
    will_qos: u8,

    #[arg(long, requires = "will_topic")]
    will_retain: bool,

    /// Seconds to wait for CONNACK
    #[arg(short = 't', long, value_name = "SECS")]
    connack_timeout: Option<u64>,
}

/// CONNECT options, before defaults are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub client_id: String,
    pub clean_session: bool,
    /// `None` means the default interval, `Some(0)` disables keep-alive
    pub keep_alive: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub will: Option<Will>,
}

impl ConnectOptions {
    pub fn new<S: Into<String>>(client_id: S) -> Self {
        Self {
            client_id: client_id.into(),
            clean_session: true,
            keep_alive: None,
            username: None,
            password: None,
            will: None,
        }
    }

    pub fn to_packet(&self) -> ConnectPacket {
        ConnectPacket {
            client_id: self.client_id.clone(),
            clean_session: self.clean_session,
            keep_alive: self.keep_alive.unwrap_or(DEFAULT_KEEP_ALIVE_SECS),
            username: self.username.clone(),
            password: self.password.clone(),
            will: self.will.clone(),
        }
    }

    pub fn keep_alive_timer(&self) -> KeepAlive {
        KeepAlive::from_secs(self.keep_alive)
    }
}

/// Random client identifier, 23 characters long
pub fn generate_client_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("mqttsh-{}", &id[..16])
}

/// Connection command
///
/// Holds everything needed to open one session. `run` returns once the
/// workers are started; the handshake completes in the background.
pub struct ConnCommand {
    pub network: String,
    pub address: String,
    pub connect_options: ConnectOptions,
    /// `None` or zero means the default of 30 seconds
    pub handshake_timeout: Option<Duration>,
    ctx: Arc<SessionContext>,
    message_sender: Option<mpsc::UnboundedSender<IncomingMessage>>,
}

impl ConnCommand {
    pub fn new<I, S>(args: I, ctx: Arc<SessionContext>) -> ShellResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString> + Clone,
    {
        Self::with_defaults(args, ctx, &ShellConfig::default())
    }

    /// Parse `args`, filling anything not given from `config`
    pub fn with_defaults<I, S>(
        args: I,
        ctx: Arc<SessionContext>,
        config: &ShellConfig,
    ) -> ShellResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString> + Clone,
    {
        let args: ConnArgs = parse_args(args)?;

        let will = match args.will_topic {
            Some(topic) => Some(Will {
                topic,
                message: Bytes::from(args.will_message.unwrap_or_default()),
                qos: to_qos(args.will_qos)?,
                retain: args.will_retain,
            }),
            None => None,
        };

        let username = args.username.or_else(|| config.get_mqtt_username());
        let password = match args.password {
            Some(password) => Some(password),
            None => config.require_mqtt_password()?,
        };
        if password.is_some() && username.is_none() {
            return Err(ShellError::args_parse("a password requires a username"));
        }

        let connect_options = ConnectOptions {
            client_id: args
                .client_id
                .or_else(|| config.session.client_id.clone())
                .unwrap_or_else(generate_client_id),
            clean_session: args
                .clean_session
                .unwrap_or(config.session.clean_session),
            keep_alive: args.keep_alive.or(config.session.keep_alive_secs),
            username,
            password,
            will,
        };

        Ok(Self {
            network: args.network.unwrap_or_else(|| config.broker.network.clone()),
            address: args.address.unwrap_or_else(|| config.broker.address.clone()),
            connect_options,
            handshake_timeout: args
                .connack_timeout
                .or(config.broker.connack_timeout_secs)
                .map(Duration::from_secs),
            ctx,
            message_sender: None,
        })
    }

    /// Deliver received messages to `sender`
    pub fn with_message_sender(mut self, sender: mpsc::UnboundedSender<IncomingMessage>) -> Self {
        self.message_sender = Some(sender);
        self
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    /// Dial the broker, send CONNECT and start the session workers
    pub async fn run(&self) -> ShellResult<()> {
        if self.ctx.has_client() {
            return Err(ShellError::AlreadyConnected);
        }
        let connect = self.connect_frame()?;

        info!(network = %self.network, address = %self.address, "Dialing broker");
        let mut client = TcpClient::dial(&self.network, &self.address)
            .await
            .map_err(|e| ShellError::dial(self.address.clone(), e))?;
        debug!(peer = %client.peer(), "Broker address resolved");
        if let Some(sender) = &self.message_sender {
            client = client.with_message_sender(sender.clone());
        }

        self.launch(Arc::new(client), connect).await
    }

    /// Start the session over an already connected client
    pub async fn start(&self, client: Arc<dyn ProtocolClient>) -> ShellResult<()> {
        if self.ctx.has_client() {
            return Err(ShellError::AlreadyConnected);
        }
        let connect = self.connect_frame()?;
        self.launch(client, connect).await
    }

    fn connect_frame(&self) -> ShellResult<Frame> {
        self.connect_options
            .to_packet()
            .to_frame()
            .map_err(|e| ShellError::args_parse(e.to_string()))
    }

    async fn launch(&self, client: Arc<dyn ProtocolClient>, connect: Frame) -> ShellResult<()> {
        // Nothing else writes yet, so CONNECT goes out before the send worker exists
        if let Err(e) = client.send_frame(&connect).await {
            warn!(error = %e, "Failed to send CONNECT");
            if let Err(e) = client.disconnect().await {
                debug!(error = %e, "Closing after failed CONNECT");
            }
            return Err(e.into());
        }

        if let Err(e) = self.ctx.attach_client(client.clone()) {
            if let Err(e) = client.disconnect().await {
                debug!(error = %e, "Closing unused client");
            }
            return Err(e);
        }

        spawn_workers(
            &self.ctx,
            self.connect_options.keep_alive_timer(),
            resolve_timeout(self.handshake_timeout),
        );
        info!(
            client_id = %self.connect_options.client_id,
            address = %self.address,
            "Session started"
        );
        Ok(())
    }
}
