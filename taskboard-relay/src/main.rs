//! Taskboard relay -- realtime project rooms over WebSocket.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9100
//! cargo run --bin taskboard-relay
//!
//! # Run on custom address with an explicit config file
//! cargo run --bin taskboard-relay -- --bind 127.0.0.1:8080 --config relay.toml
//!
//! # Or via environment variable
//! TASKBOARD_ADDR=127.0.0.1:8080 cargo run --bin taskboard-relay
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use taskboard::Board;
use taskboard_relay::config::{RelayCliArgs, RelayConfig};
use taskboard_relay::relay::{self, RelayState};
use taskboard_relay::rooms::RoomBroadcaster;
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(&config.log_level, config.log_file.as_deref());

    tracing::info!(
        addr = %config.bind_addr,
        users = config.users.len(),
        require_membership = config.require_membership,
        "starting taskboard relay"
    );

    let broadcaster = Arc::new(RoomBroadcaster::new());
    let board = Arc::new(
        Board::new()
            .with_policy(config.board_policy())
            .with_events(broadcaster.clone()),
    );
    for user in &config.users {
        board.register_principal(user.principal.clone()).await;
    }

    let state = Arc::new(
        RelayState::new(
            Arc::clone(&board),
            broadcaster,
            Arc::new(config.credentials()),
        )
        .with_max_payload_size(config.max_payload_size)
        .with_require_membership(config.require_membership),
    );

    let sweeper = tokio::spawn(sweep_invitations(board, config.sweep_interval));

    match relay::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            sweeper.abort();
            std::process::exit(1);
        }
    }
    sweeper.abort();
}

/// Initialize logging to stderr, or to a file when one is configured.
///
/// The returned [`WorkerGuard`] must be held until shutdown so buffered
/// file output is flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let file = file_path.and_then(|p| Some((p.parent()?, p.file_name()?)));
    let Some((dir, name)) = file else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    };

    let file_appender = tracing_appender::rolling::never(dir, name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();
    Some(guard)
}

/// Periodically removes invitations past their expiry horizon.
async fn sweep_invitations(board: Arc<Board>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        board.purge_expired_invitations().await;
    }
}
