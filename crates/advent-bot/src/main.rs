//! advent-bot: hosts one text-adventure game per chat room.
//!
//! Accepts chat traffic over a WebSocket gateway (or the local console),
//! starts or resumes a game per room on demand, relays its output, and
//! saves idle games automatically.

mod bot;
mod config;
mod transport;

use advent_core::SessionManager;
use bot::Bot;
use clap::Parser;
use config::{BotConfig, Overrides};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use transport::console::ConsoleTransport;
use transport::websocket::WebSocketGateway;
use transport::{ChatEvent, ChatTransport};

/// advent-bot: text adventures for chat rooms
#[derive(Parser, Debug)]
#[command(name = "advent-bot", version, about = "Text-adventure chat bot")]
struct Cli {
    /// Config file path
    #[arg(long, default_value = "~/.advent/config.toml")]
    config: String,

    /// WebSocket gateway listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Path to the adventure executable
    #[arg(long)]
    executable: Option<String>,

    /// Directory for save files
    #[arg(long)]
    save_path: Option<String>,

    /// Idle timeout in seconds before a game is saved and closed
    #[arg(long)]
    timeout: Option<u64>,

    /// Upper bound in seconds for one save dialog (0 = wait forever)
    #[arg(long)]
    save_timeout: Option<u64>,

    /// Play on stdin/stdout instead of serving WebSocket clients
    #[arg(long)]
    console: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting advent-bot");

    let config_path = PathBuf::from(&cli.config);
    let overrides = Overrides {
        listen: cli.listen,
        executable: cli.executable,
        save_path: cli.save_path,
        timeout_secs: cli.timeout,
        save_timeout_secs: cli.save_timeout,
        console: cli.console,
    };
    let bot_config = match BotConfig::load(Some(&config_path), overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        executable = %bot_config.session.executable.display(),
        save_path = %bot_config.session.save_path.display(),
        timeout_secs = bot_config.session.session_timeout.as_secs(),
        "session settings"
    );
    let sessions = Arc::new(SessionManager::new(bot_config.session.clone()));

    if bot_config.console {
        let (console, events) = ConsoleTransport::start();
        serve(console, events, sessions).await;
    } else {
        let (gateway, events) = match WebSocketGateway::bind(bot_config.listen).await {
            Ok(bound) => bound,
            Err(e) => {
                error!(error = %e, "failed to start WebSocket gateway");
                std::process::exit(1);
            }
        };
        serve(gateway, events, sessions).await;
    }

    info!("advent-bot stopped");
}

/// Run the bot until the transport ends or a shutdown signal arrives, then
/// save every open game.
async fn serve<T: ChatTransport>(
    transport: Arc<T>,
    events: mpsc::Receiver<ChatEvent>,
    sessions: Arc<SessionManager>,
) {
    let bot = Bot::new(transport, Arc::clone(&sessions));

    tokio::select! {
        _ = bot.run(events) => {}
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    sessions.shutdown().await;
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
