use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use inbox_poller::config::PollerConfig;
use inbox_poller::poll::PollScheduler;
use inbox_poller::{app, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    dotenvy::dotenv().ok();

    let config = PollerConfig::from_env().context("Invalid configuration")?;

    let _log_guard = logging::init_logging(&config.log_level, config.log_dir.as_deref())
        .context("Failed to initialize logging")?;

    app::log_banner(&config);

    let mut poller = match app::build(&config).await {
        Ok(poller) => poller,
        Err(e) => {
            error!(error = %e, "Startup failed");
            return Err(e.into());
        }
    };

    let cancel_token = CancellationToken::new();
    spawn_shutdown_listener(cancel_token.clone());

    let scheduler = PollScheduler::new(config.interval, config.max_cycles, cancel_token);
    let completed = scheduler.run(&mut poller).await;

    info!(
        cycles = completed,
        failures = poller.recovery().streak(),
        "Inbox poller stopped"
    );
    Ok(())
}

fn spawn_shutdown_listener(cancel_token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        cancel_token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = ctrl_c() => {}
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to register SIGTERM handler, listening for Ctrl-C only");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    ctrl_c().await;
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
