//! Line-oriented command shell
//!
//! Turns one input line into a command and runs it against the current
//! session. A session context is good for one connection; after it has been
//! torn down the shell swaps in a fresh one before the next `conn`.

use crate::command::{ConnCommand, DisconnCommand, PubCommand, SubCommand, UnsubCommand};
use crate::config::ShellConfig;
use crate::error::{ShellError, ShellResult};
use crate::session::SessionContext;
use crate::transport::IncomingMessage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn, Instrument};

pub const USAGE: &str = "\
Commands:
  conn    [-n NETWORK] [-a HOST:PORT] [-i CLIENT_ID] [-u USER] [-P PASS]
          [--clean-session BOOL] [-k SECS] [-t SECS]
          [--will-topic T [--will-message M] [--will-qos Q] [--will-retain]]
  disconn
  pub     -t TOPIC [-m MESSAGE] [-q QOS] [-r]
  sub     -t FILTER [-q QOS]
  unsub   -t FILTER
  help
  quit

Run any command with -h for details.";

/// What the input loop should do after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellOutcome {
    Continue,
    Quit,
}

pub struct Shell {
    config: ShellConfig,
    ctx: Arc<SessionContext>,
    message_sender: Option<mpsc::UnboundedSender<IncomingMessage>>,
}

impl Shell {
    pub fn new(config: ShellConfig) -> Self {
        Self {
            config,
            ctx: Arc::new(SessionContext::new()),
            message_sender: None,
        }
    }

    /// Deliver messages received by future sessions to `sender`
    pub fn with_message_sender(mut self, sender: mpsc::UnboundedSender<IncomingMessage>) -> Self {
        self.message_sender = Some(sender);
        self
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Run one input line
    pub async fn execute(&mut self, line: &str) -> ShellResult<ShellOutcome> {
        let tokens = tokenize(line)?;
        let Some((name, args)) = tokens.split_first() else {
            return Ok(ShellOutcome::Continue);
        };

        let span = crate::command_span!(command = %name);
        self.dispatch(name, args).instrument(span).await
    }

    async fn dispatch(&mut self, name: &str, args: &[String]) -> ShellResult<ShellOutcome> {
        match name {
            "conn" => {
                if self.ctx.is_disconnecting() {
                    self.refresh_context().await;
                }
                let mut cmd = ConnCommand::with_defaults(args, self.ctx.clone(), &self.config)?;
                if let Some(sender) = &self.message_sender {
                    cmd = cmd.with_message_sender(sender.clone());
                }
                cmd.run().await?;
            }
            "disconn" => {
                let cmd = DisconnCommand::new(args, self.ctx.clone())?;
                let result = cmd.run().await;
                if self.ctx.is_disconnecting() {
                    self.refresh_context().await;
                }
                result?;
            }
            "pub" => PubCommand::new(args, self.ctx.clone())?.run()?,
            "sub" => SubCommand::new(args, self.ctx.clone())?.run()?,
            "unsub" => UnsubCommand::new(args, self.ctx.clone())?.run()?,
            "help" | "?" => println!("{USAGE}"),
            "quit" | "exit" => {
                self.close().await;
                return Ok(ShellOutcome::Quit);
            }
            other => return Err(ShellError::UnknownCommand(other.to_string())),
        }
        Ok(ShellOutcome::Continue)
    }

    /// Tear down the current session, if any
    pub async fn close(&mut self) {
        if !self.ctx.has_client() {
            return;
        }
        if let Err(e) = self.ctx.shutdown().await {
            warn!(error = %e, "Session did not close cleanly");
        }
    }

    async fn refresh_context(&mut self) {
        self.ctx.workers().wait().await;
        self.ctx = Arc::new(SessionContext::new());
        debug!("Fresh session context");
    }
}

/// Split a line into words. Single and double quotes group words; a
/// backslash escapes the next character outside single quotes.
pub fn tokenize(line: &str) -> ShellResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some('\''), '\'') | (Some('"'), '"') => quote = None,
            (Some('\''), c) => current.push(c),
            (_, '\\') => match chars.next() {
                Some(escaped) => {
                    current.push(escaped);
                    in_token = true;
                }
                None => return Err(ShellError::args_parse("trailing backslash")),
            },
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(ShellError::args_parse(format!("unterminated {q} quote")));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_plain_words() {
        assert_eq!(
            tokenize("  pub -t a/b   -m hi ").unwrap(),
            vec!["pub", "-t", "a/b", "-m", "hi"]
        );
        assert!(tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn test_tokenize_quotes_and_escapes() {
        assert_eq!(
            tokenize(r#"pub -m "hello world" -t 'a "b"' x\ y """#).unwrap(),
            vec!["pub", "-m", "hello world", "-t", "a \"b\"", "x y", ""]
        );
        assert_eq!(tokenize(r#"say "a\"b""#).unwrap(), vec!["say", "a\"b"]);
    }

    #[test]
    fn test_tokenize_unterminated_quote() {
        assert!(matches!(
            tokenize("pub -m \"oops"),
            Err(ShellError::ArgsParse { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_line_is_ignored() {
        let mut shell = Shell::new(ShellConfig::default());
        assert_eq!(shell.execute("").await.unwrap(), ShellOutcome::Continue);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let mut shell = Shell::new(ShellConfig::default());
        let result = shell.execute("frobnicate now").await;
        assert!(matches!(result, Err(ShellError::UnknownCommand(name)) if name == "frobnicate"));
    }

    #[tokio::test]
    async fn test_commands_need_a_session() {
        let mut shell = Shell::new(ShellConfig::default());
        assert!(matches!(
            shell.execute("pub -t a -m b").await,
            Err(ShellError::NotConnected)
        ));
        assert!(matches!(
            shell.execute("disconn").await,
            Err(ShellError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_quit_without_session() {
        let mut shell = Shell::new(ShellConfig::default());
        assert_eq!(shell.execute("quit").await.unwrap(), ShellOutcome::Quit);
        assert_eq!(shell.execute("help").await.unwrap(), ShellOutcome::Continue);
    }

    #[tokio::test]
    async fn test_bad_conn_arguments_do_not_dial() {
        let mut shell = Shell::new(ShellConfig::default());
        let result = shell.execute("conn --not-exit-flag").await;
        assert!(matches!(result, Err(ShellError::ArgsParse { .. })));
        assert!(!shell.context().has_client());
    }
}
