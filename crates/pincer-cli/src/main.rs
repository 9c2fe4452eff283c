//! Pincer CLI entry point.
//!
//! Binary name: `pincer`
//!
//! Parses CLI arguments, sets up tracing, loads config and sessions, then
//! dispatches to the command handler.

mod cli;
mod state;
mod tools;

use clap::Parser;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(err) = pincer_observe::tracing_setup::init_tracing(cli.verbose, cli.otel) {
        eprintln!("Warning: failed to initialize tracing: {err}");
    }

    let result = run(cli).await;
    pincer_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init(cli.data_dir).await?;

    match cli.command {
        Commands::Agent {
            message: Some(message),
            session,
        } => cli::agent::one_shot(&state, &message, &session).await,
        Commands::Agent {
            message: None,
            session,
        } => cli::agent::interactive(&state, &session).await,
        Commands::Gateway => cli::gateway::run(&state).await,
        Commands::Sessions => cli::sessions::list_sessions(&state, cli.json),
    }
}
