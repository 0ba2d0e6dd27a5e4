//! Spotlite Agent - standalone headless client for Spotlite.
//!
//! Drives the core auth and playback services from a terminal, without a
//! GUI: prints the authorization URL instead of opening it, accepts the
//! pasted redirect URL to finish the login, and exposes playback commands
//! over an interactive prompt.

mod config;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use spotlite_core::{
    bootstrap, BootstrappedServices, FileStore, MemoryStore, PlaySource, SessionStore, Track,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::signal;

use crate::config::AgentConfig;

/// Spotlite Agent - headless Spotify playback controller.
#[derive(Parser, Debug)]
#[command(name = "spotlite-agent")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SPOTLITE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Data directory for persistent state (credential, history).
    #[arg(short = 'd', long, env = "SPOTLITE_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Spotlite Agent v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AgentConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }

    let store: Arc<dyn SessionStore> = match &config.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
            log::info!("Using data directory: {}", dir.display());
            Arc::new(FileStore::open(dir.join("session.json")))
        }
        None => {
            log::info!("No data directory configured - session will not persist");
            Arc::new(MemoryStore::new())
        }
    };

    let services =
        bootstrap(config.to_core_config(), store).context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    // Echo domain events as they happen.
    let mut events = services.events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log::info!("event: {:?}", event);
        }
    });

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Commands: login, logout, play <uri>, pause, resume, seek <ms>, next, prev, vol <0-100>, state, recent, sync, quit");

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !run_command(&services, line.trim(), &mut lines).await? {
                            break;
                        }
                    }
                    // stdin closed
                    None => break,
                }
            }
        }
    }

    log::info!("Shutting down...");
    services.shutdown();
    log::info!("Shutdown complete");
    Ok(())
}

/// Runs one command line. Returns false when the agent should exit.
async fn run_command(
    services: &BootstrappedServices,
    line: &str,
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<bool> {
    let mut parts = line.splitn(2, ' ');
    let command = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();

    match command {
        "" => {}
        "login" => {
            let request = services.auth.begin_login();
            println!("Open this URL in a browser and authorize:");
            println!("  {}", request.url);
            println!("Then paste the full redirect URL here:");
            if let Some(pasted) = lines.next_line().await? {
                let params = parse_redirect_params(pasted.trim());
                match services.auth.complete_login(&params).await {
                    Ok(()) => println!("Logged in."),
                    Err(e) => println!("Login failed: {e}"),
                }
            }
        }
        "logout" => {
            services.auth.logout();
            services.player.reset();
            println!("Logged out.");
        }
        "play" => {
            if rest.is_empty() {
                println!("Usage: play <spotify:track:...>");
            } else {
                let track = track_from_uri(rest);
                match services.player.play(track.clone()).await {
                    Ok(()) => println!("Playing {}", track.uri),
                    Err(e) => println!("Play failed: {e}"),
                }
            }
        }
        "pause" => report(services.player.pause().await),
        "resume" => report(services.player.resume().await),
        "next" => report(services.player.next().await),
        "prev" => report(services.player.previous().await),
        "seek" => match rest.parse::<i64>() {
            Ok(ms) => report(services.player.seek(ms).await),
            Err(_) => println!("Usage: seek <milliseconds>"),
        },
        "vol" => match rest.parse::<f32>() {
            Ok(percent) => report(services.player.set_volume(percent / 100.0).await),
            Err(_) => println!("Usage: vol <0-100>"),
        },
        "state" => {
            let state = services.player.state();
            match &state.current_track {
                Some(track) => println!(
                    "{} - {} [{}] {}ms/{}ms (device: {})",
                    track.name,
                    track.artists.join(", "),
                    if state.is_playing { "playing" } else { "paused" },
                    state.position_ms,
                    state.duration_ms,
                    state.active_device_id.as_deref().unwrap_or("none"),
                ),
                None => println!("Nothing playing."),
            }
        }
        "recent" => {
            let entries = services.player.recently_played();
            if entries.is_empty() {
                println!("No recently played tracks.");
            }
            for (i, entry) in entries.iter().enumerate() {
                println!(
                    "{:2}. {} - {}",
                    i + 1,
                    entry.track.name,
                    entry.track.artists.join(", ")
                );
            }
        }
        "sync" => match services.player.sync_remote_history().await {
            Ok(()) => println!("History synced."),
            Err(e) => println!("Sync failed: {e}"),
        },
        "replay" => match rest.parse::<usize>() {
            Ok(n) if n >= 1 => {
                let entries = services.player.recently_played();
                match entries.get(n - 1) {
                    Some(entry) => {
                        let track = entry.track.clone();
                        services
                            .player
                            .notify_track_played(track.clone(), PlaySource::Replay);
                        report(services.player.play(track).await);
                    }
                    None => println!("No entry {n}."),
                }
            }
            _ => println!("Usage: replay <entry number>"),
        },
        "quit" | "exit" => return Ok(false),
        other => println!("Unknown command: {other}"),
    }
    Ok(true)
}

fn report(result: spotlite_core::PlayerResult<()>) {
    match result {
        Ok(()) => println!("OK"),
        Err(e) => println!("Failed: {e}"),
    }
}

/// Builds a minimal track from a playback URI. Duration and metadata are
/// filled in by the next authoritative state event.
fn track_from_uri(uri: &str) -> Track {
    let id = uri.rsplit(':').next().unwrap_or(uri).to_string();
    Track {
        name: id.clone(),
        id,
        artists: Vec::new(),
        duration_ms: 0,
        uri: uri.to_string(),
    }
}

/// Extracts the query parameters from a pasted redirect URL.
fn parse_redirect_params(pasted: &str) -> HashMap<String, String> {
    let query = pasted.split_once('?').map_or(pasted, |(_, q)| q);
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = urlencoding::decode(key).ok()?.into_owned();
            let value = urlencoding::decode(value).ok()?.into_owned();
            Some((key, value))
        })
        .collect()
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
