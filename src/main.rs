//! mqttsh - Main Entry Point
//!
//! Reads shell commands from stdin and prints received messages to stdout.

use clap::{Parser, Subcommand};
use mqttsh::config::ShellConfig;
use mqttsh::observability::init_cli_logging;
use mqttsh::output::{format_message, OutputFormat};
use mqttsh::shell::{Shell, ShellOutcome};
use mqttsh::transport::IncomingMessage;
use std::io::Write;
use std::path::PathBuf;
use std::process;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::signal;
use tracing::{debug, error, info};

const PROMPT: &str = "mqttsh> ";

/// Interactive MQTT client shell
#[derive(Parser)]
#[command(name = "mqttsh")]
#[command(about = "Interactive MQTT client shell")]
#[command(version)]
struct Cli {
    /// Configuration file path (default: ./mqttsh.toml if present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format for received messages
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Verbose logging (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the interactive shell (default)
    Shell,
    /// Validate the configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_cli_logging(cli.verbose);
    debug!("Starting mqttsh v{}", env!("CARGO_PKG_VERSION"));

    let config = match ShellConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("mqttsh: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => {
            let format = cli.format.unwrap_or(config.output.format);
            run_shell(config, format).await
        }
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

async fn run_shell(
    config: ShellConfig,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let (message_tx, message_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_messages(message_rx, format));

    let mut shell = Shell::new(config).with_message_sender(message_tx);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("mqttsh {} - type 'help' for commands", env!("CARGO_PKG_VERSION"));
    loop {
        prompt()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = signal::ctrl_c() => {
                println!();
                info!("Interrupted, shutting down");
                None
            }
        };

        // End of input or Ctrl-C
        let Some(line) = line else {
            shell.close().await;
            break;
        };

        match shell.execute(&line).await {
            Ok(ShellOutcome::Continue) => {}
            Ok(ShellOutcome::Quit) => break,
            Err(e) if e.is_usage_error() => eprintln!("{e}"),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    // Drops the last sender so the printer drains and exits
    drop(shell);
    if let Err(e) = printer.await {
        debug!("Printer task ended abnormally: {}", e);
    }
    Ok(())
}

async fn print_messages(mut messages: mpsc::UnboundedReceiver<IncomingMessage>, format: OutputFormat) {
    while let Some(message) = messages.recv().await {
        println!("\r{}", format_message(&message, format));
        let _ = prompt();
    }
}

fn prompt() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(PROMPT.as_bytes())?;
    stdout.flush()
}

fn handle_config_command(
    config: &ShellConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
