//! `pincer agent`: one-shot and interactive conversations.

use anyhow::Result;
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};

use pincer_types::bus::InboundMessage;

use crate::state::{AgentRuntime, AppState};

/// Send one message and print the reply.
///
/// ```bash
/// pincer agent -m "summarize today's notes"
/// ```
pub async fn one_shot(state: &AppState, message: &str, session: &str) -> Result<()> {
    let runtime = state.runtime().await?;
    runtime.cancel_on_ctrl_c();

    let reply = runtime
        .agent
        .process_direct(message, session, &runtime.shutdown)
        .await;
    // The turn may have started a compaction; let it commit before exit.
    runtime.agent.compactor().wait_idle().await;
    runtime.shutdown.cancel();

    match reply {
        Ok(text) => {
            println!("{text}");
            Ok(())
        }
        Err(err) => {
            eprintln!("{} {err}", style("error:").red().bold());
            Err(err.into())
        }
    }
}

/// Read lines from stdin and run each as a turn in `session`.
///
/// Runs over the bus so subagent reports are delivered into the same
/// session while the prompt is open.
pub async fn interactive(state: &AppState, session: &str) -> Result<()> {
    let runtime = state.runtime().await?;
    runtime.cancel_on_ctrl_c();

    println!();
    println!(
        "  {} pincer ({}), session {}",
        style("●").green(),
        style(&state.config.agent.model).cyan(),
        style(session).yellow()
    );
    println!("  {}", style("Type 'exit' to quit.").dim());
    println!();

    let loop_handle = spawn_loop(&runtime);
    let printer = spawn_printer(&runtime);

    let (channel, chat_id) = session.split_once(':').unwrap_or(("cli", session));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = runtime.shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit" | "/exit" | "/quit") {
            break;
        }

        let msg = InboundMessage::new(channel, "user", chat_id, line).with_session_key(session);
        runtime.bus.publish_inbound(msg).await?;
    }

    runtime.agent.compactor().wait_idle().await;
    runtime.shutdown.cancel();
    let _ = loop_handle.await;
    let _ = printer.await;
    Ok(())
}

pub(crate) fn spawn_loop(runtime: &AgentRuntime) -> tokio::task::JoinHandle<()> {
    let agent = runtime.agent.clone();
    let bus = runtime.bus.clone();
    let cancel = runtime.shutdown.clone();
    tokio::spawn(async move { agent.run(&bus, &cancel).await })
}

fn spawn_printer(runtime: &AgentRuntime) -> tokio::task::JoinHandle<()> {
    let bus = runtime.bus.clone();
    let cancel = runtime.shutdown.clone();
    tokio::spawn(async move {
        while let Some(reply) = bus.consume_outbound(&cancel).await {
            println!("{} {}", style("pincer>").magenta().bold(), reply.content);
        }
    })
}
