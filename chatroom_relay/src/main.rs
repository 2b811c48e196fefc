// CLI entry point for the chat relay.
//
// `chatroom serve` starts a standalone relay server; it runs until stdin is
// closed or reads `/stop`, then drains every connection with a shutdown
// notice. `chatroom connect` is a minimal terminal client built on
// `ChatClient`: each stdin line is sent as a chat message, `/quit` leaves.
//
// Log verbosity comes from `RUST_LOG` (default `info`). Logs go to stderr so
// they do not interleave with chat lines on stdout.

mod cli;

use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::{Context, Result};
use chatroom_relay::{ChatClient, ChatUi, ServerConfig, start_server};
use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Command, ConnectArgs, ServeArgs};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args),
        Command::Connect(args) => connect(args),
    }
}

fn serve(args: ServeArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_json_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.echo {
        config.echo_to_sender = true;
    }

    let (handle, addr) = start_server(config).context("failed to start chat relay")?;
    println!("Chat relay listening on {addr}");
    println!("Type /stop or close stdin to shut down.");

    for line in io::stdin().lock().lines() {
        let line = line?;
        match line.trim() {
            "/stop" => break,
            "/who" => println!("{} connected", handle.connection_count()),
            _ => {}
        }
    }

    info!("stopping chat relay");
    handle.stop();
    Ok(())
}

/// Terminal `ChatUi`: chat lines go to stdout.
struct TerminalUi {
    name: String,
}

impl ChatUi for TerminalUi {
    fn on_chat_line_received(&self, line: &str) {
        println!("{line}");
    }

    fn local_display_name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn on_connection_lost(&self, reason: &str) {
        println!("Disconnected: {reason}");
    }
}

fn connect(args: ConnectArgs) -> Result<()> {
    let ui = Arc::new(TerminalUi { name: args.name });
    let mut client = ChatClient::connect(args.server.as_str(), ui)
        .with_context(|| format!("failed to connect to {}", args.server))?;

    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim() == "/quit" {
            break;
        }
        if line.is_empty() {
            continue;
        }
        if !client.is_connected() {
            break;
        }
        client.send_message(&line)?;
    }

    client.disconnect();
    Ok(())
}
