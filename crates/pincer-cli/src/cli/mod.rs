//! CLI command definitions for the `pincer` binary.

pub mod agent;
pub mod gateway;
pub mod sessions;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Session used by `pincer agent` when none is given.
pub const DEFAULT_SESSION: &str = "cli:direct";

/// A personal assistant agent with tools, subagents and long-lived sessions.
#[derive(Parser)]
#[command(name = "pincer", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON where supported.
    #[arg(long, global = true)]
    pub json: bool,

    /// Log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory (default: ~/.pincer).
    #[arg(long, global = true, env = "PINCER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Talk to the agent: one message with -m, otherwise an interactive prompt.
    Agent {
        /// Send a single message and print the reply.
        #[arg(short, long)]
        message: Option<String>,

        /// Session key to read and extend. A key without a channel is
        /// stored as `cli:<key>`.
        #[arg(short, long, default_value = DEFAULT_SESSION, value_parser = parse_session_key)]
        session: String,
    },

    /// Run the agent loop over the message bus, reading stdin as a channel.
    Gateway,

    /// List stored sessions.
    #[command(alias = "ls")]
    Sessions,
}

/// Qualify a bare session name with the `cli` channel so the stored key
/// matches the `channel:chat` pair replies and subagent reports route to.
fn parse_session_key(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    match raw.split_once(':') {
        Some((channel, chat)) if !channel.is_empty() && !chat.is_empty() => Ok(raw.to_string()),
        Some(_) => Err(format!("session key '{raw}' must look like channel:chat")),
        None if raw.is_empty() => Err("session key must not be empty".to_string()),
        None => Ok(format!("cli:{raw}")),
    }
}
