use anyhow::{Context, Result};
use parley::{OrchestratorBuilder, SessionConfig, SessionEvent};
use std::io::BufRead;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "commands: c = connect, d = disconnect, s <0..1> = sensitivity, x = clear history, q = quit";

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Parley voice agent");

    let config = match std::env::args().nth(1) {
        Some(path) => SessionConfig::from_toml_file(&path)
            .with_context(|| format!("loading config from {}", path))?
            .with_env_fallback(),
        None => SessionConfig::from_env(),
    };

    let (orchestrator, handle) = OrchestratorBuilder::new().with_config(config).build()?;
    let dispatch = orchestrator.start()?;

    let events = handle.event_receiver();
    std::thread::spawn(move || {
        for event in events.iter() {
            match event {
                SessionEvent::StateChanged(state) => println!("[state] {}", state),
                SessionEvent::SpeakingChanged(speaking) => {
                    println!("[agent] {}", if speaking { "speaking" } else { "listening" })
                }
                SessionEvent::MessageAdded(message) => {
                    println!("[{}] {}", message.role, message.text)
                }
                SessionEvent::LeadUpdated(lead) => match serde_json::to_string(&lead) {
                    Ok(json) => println!("[lead] {}", json),
                    Err(e) => warn!("Could not render lead: {}", e),
                },
                SessionEvent::Error(message) => eprintln!("[error] {}", message),
            }
        }
    });

    println!("{}", HELP);
    handle.connect().context("connecting")?;

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("c") => {
                if let Err(e) = handle.connect() {
                    eprintln!("[error] {}", e.user_message());
                }
            }
            Some("d") => handle.disconnect()?,
            Some("s") => match parts.next().map(str::parse::<f32>) {
                Some(Ok(value)) => handle.set_sensitivity(value)?,
                _ => println!("usage: s <0..1>"),
            },
            Some("x") => handle.clear_history()?,
            Some("q") => break,
            Some(_) => println!("{}", HELP),
            None => {
                if let Some(elapsed) = handle.session_duration() {
                    println!("[session] {}s, volume {}", elapsed.as_secs(), handle.volume());
                }
            }
        }
    }

    handle.shutdown()?;
    if dispatch.join().is_err() {
        warn!("Dispatch thread panicked");
    }
    info!("Goodbye");
    Ok(())
}
