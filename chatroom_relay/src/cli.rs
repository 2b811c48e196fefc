// Command-line surface of the `chatroom` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat relay server.
    Serve(ServeArgs),
    /// Connect to a relay and chat from the terminal.
    Connect(ConnectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// JSON config file. Flags given here override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Interface to bind.
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port. Use 0 for an ephemeral port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Also send each chat line back to its sender.
    #[arg(long)]
    pub echo: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// Address of the relay to connect to.
    #[arg(long, default_value = "127.0.0.1:7878")]
    pub server: String,

    /// Display name shown to other users.
    #[arg(long)]
    pub name: String,
}
