//! Shell commands
//!
//! Each command parses its own arguments with clap and acts on the current
//! [`SessionContext`](crate::session::SessionContext). Only `conn` touches the
//! transport directly; the others go through the session's outgoing queue or
//! its teardown routine.

pub mod conn;
pub mod disconn;
pub mod publish;
pub mod subscribe;

pub use conn::{ConnCommand, ConnectOptions};
pub use disconn::DisconnCommand;
pub use publish::PubCommand;
pub use subscribe::{SubCommand, UnsubCommand};

use crate::error::{ShellError, ShellResult};
use crate::protocol::QoS;
use clap::Parser;
use std::ffi::OsString;

/// Parse command arguments (without the command name) into `T`
pub(crate) fn parse_args<T, I, S>(args: I) -> ShellResult<T>
where
    T: Parser,
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    T::try_parse_from(args)
        .map_err(|e| ShellError::args_parse(e.render().to_string().trim_end()))
}

/// Value parser shared by every `-q/--qos` flag
pub(crate) fn qos_parser() -> clap::builder::RangedI64ValueParser<u8> {
    clap::value_parser!(u8).range(0..=2)
}

pub(crate) fn to_qos(level: u8) -> ShellResult<QoS> {
    QoS::try_from(level).map_err(|e| ShellError::args_parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Parser)]
    #[command(name = "probe", no_binary_name = true)]
    struct ProbeArgs {
        #[arg(short, long, value_parser = qos_parser())]
        qos: u8,
    }

    #[test]
    fn test_parse_args_accepts_valid_input() {
        let args: ProbeArgs = parse_args(["-q", "2"]).unwrap();
        assert_eq!(args.qos, 2);
        assert_eq!(to_qos(args.qos).unwrap(), QoS::ExactlyOnce);
    }

    #[test]
    fn test_parse_errors_are_argument_errors() {
        let result: ShellResult<ProbeArgs> = parse_args(["-q", "3"]);
        assert!(matches!(result, Err(ShellError::ArgsParse { .. })));

        let result: ShellResult<ProbeArgs> = parse_args(["--bogus"]);
        assert!(matches!(result, Err(ShellError::ArgsParse { .. })));
    }
}
