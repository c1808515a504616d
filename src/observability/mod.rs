//! Observability for the shell: structured logging and span macros

pub mod logging;

// Re-export for convenience
pub use logging::{init_cli_logging, init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{command_span, session_span};
