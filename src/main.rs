//! Pong client - headless driver for a single session
//!
//! Reads key commands from stdin (`+d` presses `d`, `-d` releases it) and
//! logs every frame through the tracing renderer.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pong_session_core::app::{SessionDriver, TracingRenderer};
use pong_session_core::config::Config;
use pong_session_core::game::tournament::BRACKET_SIZE;
use pong_session_core::game::{KeyInput, SessionController, SessionMode, SessionOptions};
use pong_session_core::store::ApiClient;
use pong_session_core::ws::WsConnector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Invalid configuration")?;

    init_tracing(&config.log_level);

    info!(mode = ?config.mode, api = %config.api_base_url, "Starting Pong client");

    let mut controller = SessionController::new(
        config.mode,
        SessionOptions {
            max_score: config.max_score,
            seed: config.rng_seed,
            local_identity: None,
            opponent: config.friend.clone(),
            friend_channel: config.friend_channel.clone(),
        },
    );

    if config.mode == SessionMode::Tournament {
        let names = tournament_names(&config.tournament_players);
        controller
            .submit_players(&names)
            .context("Tournament players rejected")?;
    }

    let api = ApiClient::new(&config.api_base_url, config.auth_token.clone());
    let driver = SessionDriver::new(controller, WsConnector, &config.ws_base_url, TracingRenderer::new())
        .with_api(api)
        .with_auth_token(config.auth_token.clone())
        .with_frame_interval(config.frame_interval);

    let keys = spawn_key_reader();
    let summary = driver.run(keys, shutdown_signal()).await;

    match (&summary.champion, summary.final_result) {
        (Some(champion), _) => info!(champion = %champion, "Tournament champion"),
        (None, Some(result)) => info!(score1 = result.score1, score2 = result.score2, "Final score"),
        (None, None) => info!("Session ended without a result"),
    }

    info!(ticks = summary.ticks, "Client shutdown complete");
    Ok(())
}

/// Pad or cut the configured entrants to a full bracket; blanks get seat names
fn tournament_names(configured: &[String]) -> Vec<String> {
    let mut names: Vec<String> = configured.iter().take(BRACKET_SIZE).cloned().collect();
    names.resize(BRACKET_SIZE, String::new());
    names
}

/// Forward stdin key commands to the driver
fn spawn_key_reader() -> mpsc::Receiver<KeyInput> {
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match KeyInput::parse(&line) {
                    Some(input) => {
                        if tx.send(input).await.is_err() {
                            break;
                        }
                    }
                    None => warn!(line = %line, "Unrecognized key command"),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });

    rx
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
