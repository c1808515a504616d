//! mqttsh - interactive MQTT client shell
//!
//! The heart of the crate is the [`session`] module: a connection
//! orchestrator that opens a transport to a broker, supervises the
//! CONNECT/CONNACK handshake with a bounded wait, and runs concurrent send and
//! receive workers with keep-alive pings and coordinated teardown.
//!
//! Around it sit:
//! - [`protocol`]: the minimal MQTT 3.1.1 framing the client needs
//! - [`transport`]: the [`ProtocolClient`] seam and its TCP implementation
//! - [`command`] and [`shell`]: the interactive commands driving a session
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mqttsh::command::ConnCommand;
//! use mqttsh::session::SessionContext;
//! use std::sync::Arc;
//!
//! # async fn example() -> mqttsh::ShellResult<()> {
//! let ctx = Arc::new(SessionContext::new());
//! ConnCommand::new(["-a", "localhost:1883", "-k", "30"], ctx.clone())?
//!     .run()
//!     .await?;
//!
//! // ... publish, subscribe ...
//!
//! ctx.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod observability;
pub mod output;
pub mod protocol;
pub mod session;
pub mod shell;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, ShellConfig};
pub use error::{ShellError, ShellResult};
pub use output::OutputFormat;
pub use protocol::{Frame, PacketType, ProtocolError};
pub use session::SessionContext;
pub use shell::{Shell, ShellOutcome};
pub use transport::{ProtocolClient, TcpClient};
