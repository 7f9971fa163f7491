//! mutemic-daemon: toggle the microphone from a global keyboard shortcut
//!
//! This daemon runs as a LaunchAgent and provides:
//! - Global key event capture via CGEventTap
//! - Edge-triggered matching of the configured shortcut
//! - Interactive rebinding of the shortcut from raw key events
//! - IPC server for the tray app (status, rebind, save, notifications)
//!
//! The tray icon and the confirm/cancel dialogs live in the tray app; the
//! daemon only produces shortcuts and typed failures for it to present.

mod config;
mod engine;
mod events;
mod hotkey;
mod ipc;
mod lifecycle;
mod mic;
mod shortcut;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::engine::{EngineHandle, Reactor};
use crate::events::EngineEvent;
use crate::hotkey::{HotkeyListener, KeyEventSource};
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::shortcut::ShortcutStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "mutemic-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        ?config.shortcut_path,
        "configuration loaded"
    );

    let mut shutdown = ShutdownSignal::new()?;

    let store = ShortcutStore::load(&config.shortcut_path);
    info!(shortcut = %store.current(), path = ?store.path(), "active shortcut");

    let microphone = mic::system_microphone();
    let startup_mic = std::sync::Arc::clone(&microphone);
    match tokio::task::spawn_blocking(move || startup_mic.is_muted()).await? {
        Ok(muted) => info!(muted, "microphone state"),
        Err(e) => warn!(error = %e, "microphone control unavailable"),
    }

    // Keyboard hook -> key event source -> whichever matcher is attached
    let source = KeyEventSource::new();
    let hotkey_listener = HotkeyListener::new(source.clone());

    // Engine + mute worker -> IPC subscribers
    let (event_tx, _event_rx) = broadcast::channel::<EngineEvent>(64);
    // Trigger matcher -> mute worker
    let (toggle_tx, toggle_rx) = mpsc::unbounded_channel::<()>();
    // IPC server -> engine
    let (command_tx, command_rx) = mpsc::channel(32);

    let reactor = Reactor::new(
        source.clone(),
        store,
        Box::new(move || {
            let _ = toggle_tx.send(());
        }),
        event_tx.clone(),
    );

    let hotkey_registered = match hotkey_listener.start() {
        Ok(()) => {
            info!("hotkey listener started");
            true
        }
        Err(e) => {
            error!(?e, "failed to start hotkey listener");
            warn!("continuing without hotkey support - check Accessibility permissions");
            false
        }
    };

    let server = Server::new(
        &config.socket_path,
        EngineHandle::new(command_tx),
        event_tx.clone(),
        std::sync::Arc::clone(&microphone),
        config.capture,
    )?;
    server.set_hotkey_registered(hotkey_registered).await;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Run the engine (trigger matching and capture sessions)
        _ = reactor.run(command_rx) => {
            info!("engine exited");
        }

        // Toggle the microphone whenever the shortcut fires
        _ = mic::run_toggle_worker(microphone, toggle_rx, event_tx.clone()) => {
            info!("mute worker exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    hotkey_listener.stop();
    server.shutdown().await;

    info!("mutemic-daemon stopped");

    Ok(())
}
