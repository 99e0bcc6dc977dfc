//! command-listener: Background daemon for spoken command recognition
//!
//! This daemon wraps an opaque speech-command classifier and provides:
//! - Model loading from a base location (`model.json` + `metadata.json`)
//! - A session controller that confirms commands above a threshold
//! - Live per-label probabilities on the console
//! - IPC server for start/stop control and event subscriptions
//!
//! Classifier results are read as JSON lines from stdin, one per inference
//! tick, written by an external inference engine.

mod capture;
mod classifier;
mod config;
mod events;
mod ipc;
mod lifecycle;
mod model;
mod presentation;
mod session;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::capture::DeviceProbe;
use crate::classifier::FeedClassifierFactory;
use crate::config::Config;
use crate::events::SessionEvent;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::model::{HttpModelSource, ModelLocation};
use crate::presentation::ConsolePresenter;
use crate::session::{CommandSession, ControlCommand};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout belongs to the presenter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "command-listener starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        model = %config.model_url,
        display = %config.display_mode,
        "configuration loaded"
    );

    let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;

    // IPC server -> session controller
    let (control_tx, control_rx) = mpsc::channel(8);
    // Session controller -> IPC server and subscribers
    let (event_tx, _event_rx) = broadcast::channel::<SessionEvent>(256);

    let presenter = ConsolePresenter::new(std::io::stdout(), config.display_mode);
    let mut session = CommandSession::new(
        ModelLocation::parse(&config.model_url),
        Arc::new(HttpModelSource::default()),
        Arc::new(FeedClassifierFactory::stdin()),
        Box::new(presenter),
        event_tx.clone(),
    )
    .with_listen_options(config.listen)
    .with_confirm_threshold(config.confirm_threshold);

    if let Some(device) = &config.capture_device {
        let probe = DeviceProbe::new(device);
        info!(device = %probe.device().display(), "capture permission probe enabled");
        session = session.with_probe(Arc::new(probe));
    }

    let server = Server::new(
        &config.socket_path,
        &config.model_url,
        control_tx.clone(),
        event_tx.clone(),
    )?;

    // Subscribe before the first start so the server sees every event
    let mut ipc_event_rx = event_tx.subscribe();

    // Queued rather than awaited so signals and IPC are served while the
    // model loads; a failed start leaves the session Idle
    if config.autostart {
        if let Err(e) = control_tx.try_send(ControlCommand::detached_start()) {
            warn!(%e, "failed to queue autostart, waiting for a start request");
        }
    }
    drop(control_tx);

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the session controller (processes control commands and results)
        _ = session.run(control_rx) => {
            info!("session controller exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the IPC status snapshot in sync with the session
        _ = async {
            loop {
                match ipc_event_rx.recv().await {
                    Ok(event) => server.apply_event(&event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "session event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("session event handler exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    session.stop().await;
    server.shutdown().await;

    info!(
        state = %session.state(),
        command = session.current_command().unwrap_or("none"),
        labels = session.labels().len(),
        "command-listener stopped"
    );

    Ok(())
}
