//! Error types for shell commands
//!
//! Argument errors are kept apart from runtime failures so the shell can
//! print usage for the former and a plain message for the latter.

use crate::config::ConfigError;
use crate::protocol::ProtocolError;
use thiserror::Error;

/// Main error type for shell commands
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("{message}")]
    ArgsParse { message: String },

    #[error("Unknown command: {0} (try 'help')")]
    UnknownCommand(String),

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Not connected")]
    NotConnected,

    #[error("Failed to connect to {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: ProtocolError,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    pub fn args_parse<S: Into<String>>(message: S) -> Self {
        Self::ArgsParse {
            message: message.into(),
        }
    }

    pub fn dial<S: Into<String>>(address: S, source: ProtocolError) -> Self {
        Self::Dial {
            address: address.into(),
            source,
        }
    }

    /// True for errors caused by how the command was typed
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            ShellError::ArgsParse { .. } | ShellError::UnknownCommand(_)
        )
    }
}

/// Result type for shell operations
pub type ShellResult<T> = Result<T, ShellError>;
