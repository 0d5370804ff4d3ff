//! Terminal front end for the intake chat engine.
//!
//! Typed lines are sent as messages; slash commands drive the voice path:
//!
//! ```text
//! /record   start a push-to-talk recording
//! /stop     finish the recording and transcribe it
//! /cancel   discard the recording
//! /quit     end the session
//! ```

use anyhow::Result;
use tokio::sync::mpsc;

use intake_chat::config::EngineConfig;
use intake_chat::engine::{EngineCommander, EngineEvent, SessionEngine};
use intake_chat::transport::Sender;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = EngineConfig::load().unwrap_or_else(|e| {
        log::warn!("failed to load settings, using defaults: {e}");
        EngineConfig::default()
    });
    let session_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("session-{}", chrono::Utc::now().timestamp_millis()));

    println!(
        "connecting to {} as {session_id}",
        config.transport.server_url
    );
    let (engine, mut handle) = SessionEngine::connect(&config, &session_id).await?;
    let commander = handle.commander();
    let engine_task = tokio::spawn(engine.run());
    println!("connected; type a message, /record to talk, /quit to leave");

    // Plain thread for stdin so a pending blocking read never stalls
    // runtime shutdown.
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => render(event),
                // Engine exited on its own (remote close).
                None => break,
            },
            line = line_rx.recv() => match line {
                Some(line) => {
                    if !dispatch(&commander, line.trim()) {
                        commander.shutdown();
                    }
                }
                // stdin closed
                None => {
                    commander.shutdown();
                    break;
                }
            },
        }
    }

    while let Some(event) = handle.next_event().await {
        render(event);
    }
    engine_task.await?;

    println!("session ended");
    Ok(())
}

/// Handle one input line.  Returns `false` when the session should end.
fn dispatch(commander: &EngineCommander, line: &str) -> bool {
    match line {
        "" => {}
        "/record" => commander.start_recording(),
        "/stop" => commander.stop_recording(),
        "/cancel" => commander.cancel_recording(),
        "/quit" => return false,
        text => commander.send_text(text),
    }
    true
}

fn render(event: EngineEvent) {
    match event {
        EngineEvent::Entry(entry) => {
            let who = match entry.sender {
                Sender::User => "you",
                Sender::Assistant => "assistant",
            };
            let audio = if entry.has_audio { " [audio]" } else { "" };
            println!(
                "{} {who}: {}{audio}",
                entry.timestamp.format("%H:%M:%S"),
                entry.text
            );
        }
        EngineEvent::Connection(state) => println!("-- connection: {state:?}"),
        EngineEvent::Capture(state) => println!("-- capture: {state:?}"),
        EngineEvent::Error(message) => eprintln!("!! {message}"),
    }
}
