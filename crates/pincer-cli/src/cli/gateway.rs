//! `pincer gateway`: the long-running bus loop.
//!
//! Stdin is the only channel here; each line arrives as a `stdin:gateway`
//! message and every outbound message is printed with its target.

use anyhow::Result;
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use pincer_types::bus::InboundMessage;

use super::agent::spawn_loop;
use crate::state::AppState;

const CHANNEL: &str = "stdin";
const CHAT_ID: &str = "gateway";

pub async fn run(state: &AppState) -> Result<()> {
    let runtime = state.runtime().await?;
    runtime.cancel_on_ctrl_c();

    println!(
        "  {} gateway running on model {}",
        style("⚡").bold(),
        style(&state.config.agent.model).cyan()
    );
    println!("  {}", style("Press Ctrl+C to stop").dim());

    let loop_handle = spawn_loop(&runtime);

    let bus = runtime.bus.clone();
    let cancel = runtime.shutdown.clone();
    let printer = tokio::spawn(async move {
        while let Some(out) = bus.consume_outbound(&cancel).await {
            println!(
                "{} {}",
                style(format!("[{}:{}]", out.channel, out.chat_id)).dim(),
                out.content
            );
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = runtime.shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        runtime
            .bus
            .publish_inbound(InboundMessage::new(CHANNEL, "user", CHAT_ID, line.trim()))
            .await?;
    }

    // Stdin closed: keep serving until interrupted so background subagents
    // can still report in.
    runtime.shutdown.cancelled().await;

    let running = runtime.subagents.running_count();
    if running > 0 {
        info!(running, "abandoning running subagents");
    }
    let _ = loop_handle.await;
    let _ = printer.await;
    println!("\n  Gateway stopped.");
    Ok(())
}
