//! The `disconn` command

use super::parse_args;
use crate::error::{ShellError, ShellResult};
use crate::session::SessionContext;
use clap::Parser;
use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long the send worker gets to service a disconnect request
const REQUEST_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "disconn", no_binary_name = true, about = "Disconnect from the broker")]
struct DisconnArgs {}

pub struct DisconnCommand {
    ctx: Arc<SessionContext>,
    grace: Duration,
}

impl DisconnCommand {
    pub fn new<I, S>(args: I, ctx: Arc<SessionContext>) -> ShellResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString> + Clone,
    {
        let _: DisconnArgs = parse_args(args)?;
        Ok(Self {
            ctx,
            grace: REQUEST_GRACE,
        })
    }

    /// Ask the send worker to tear the session down, then wait for every
    /// worker.
    ///
    /// The request goes through the send worker so the DISCONNECT frame is
    /// ordered after frames already queued. If the worker does not act
    /// within the grace period the session is closed directly.
    pub async fn run(&self) -> ShellResult<()> {
        if !self.ctx.has_client() {
            return Err(ShellError::NotConnected);
        }

        let mut disconnected = self.ctx.subscribe_disconnect();
        let mut result = Ok(());
        if !self.ctx.is_disconnecting() {
            self.ctx.request_disconnect();
            let serviced = tokio::time::timeout(self.grace, disconnected.wait_for(|d| *d))
                .await
                .is_ok();
            if serviced {
                debug!("Disconnect request serviced");
            } else {
                warn!(grace = ?self.grace, "Disconnect request not serviced, closing directly");
                result = self.ctx.disconnect().await;
            }
        }

        self.ctx.workers().wait().await;
        info!("Session closed");
        result.map_err(ShellError::from)
    }
}
