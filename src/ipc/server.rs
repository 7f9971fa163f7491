//! Unix domain socket server for IPC
//!
//! Provides request-response access to the engine for the tray app, and
//! push notifications of engine events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::engine::{CaptureConfig, EngineHandle, HandleError};
use crate::events::EngineEvent;
use crate::mic::Microphone;
use crate::shortcut::Shortcut;

use super::protocol::{DaemonStatus, Request, Response};

/// Largest accepted message body
const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

/// State shared by all client handlers
struct Shared {
    engine: EngineHandle,
    events: broadcast::Sender<EngineEvent>,
    microphone: Arc<dyn Microphone>,
    capture_defaults: CaptureConfig,
    start_time: Instant,
    hotkey_registered: RwLock<bool>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        engine: EngineHandle,
        events: broadcast::Sender<EngineEvent>,
        microphone: Arc<dyn Microphone>,
        capture_defaults: CaptureConfig,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            shared: Arc::new(Shared::new(engine, events, microphone, capture_defaults)),
            shutdown_tx,
        })
    }

    /// Record whether the platform keyboard hook is running
    pub async fn set_hotkey_registered(&self, registered: bool) {
        *self.shared.hotkey_registered.write().await = registered;
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let shared = Arc::clone(&self.shared);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, shared) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

impl Shared {
    fn new(
        engine: EngineHandle,
        events: broadcast::Sender<EngineEvent>,
        microphone: Arc<dyn Microphone>,
        capture_defaults: CaptureConfig,
    ) -> Self {
        Self {
            engine,
            events,
            microphone,
            capture_defaults,
            start_time: Instant::now(),
            hotkey_registered: RwLock::new(false),
        }
    }
}

/// Handle a single client connection
async fn handle_client<S>(mut stream: S, shared: Arc<Shared>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let Some(request) = read_request(&mut stream).await? else {
            debug!("client disconnected");
            return Ok(());
        };

        debug!(?request, "received request");

        if request == Request::Subscribe {
            // Subscribe before confirming so no event after the reply is lost
            let events = shared.events.subscribe();
            send_message(&mut stream, &Response::Subscribed).await?;
            debug!("client subscribed to notifications");
            return forward_events(stream, events).await;
        }

        let response = process_request(request, &shared).await;
        send_message(&mut stream, &response).await?;
    }
}

/// Read one length-prefixed request; `None` on clean disconnect
async fn read_request<S>(stream: &mut S) -> Result<Option<Request>>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        warn!(len, "message too large, disconnecting");
        return Ok(None);
    }

    let mut msg_buf = vec![0u8; len];
    stream.read_exact(&mut msg_buf).await?;

    let request = serde_json::from_slice(&msg_buf).context("failed to parse request")?;
    Ok(Some(request))
}

/// Send a length-prefixed JSON message
async fn send_message<S, T>(stream: &mut S, msg: &T) -> Result<()>
where
    S: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    stream.write_all(&msg_len).await?;
    stream.write_all(&msg_bytes).await?;
    stream.flush().await?;

    Ok(())
}

/// Push engine events until the client goes away
async fn forward_events<S>(mut stream: S, mut events: broadcast::Receiver<EngineEvent>) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    loop {
        match events.recv().await {
            Ok(event) => {
                debug!(%event, "forwarding event");
                send_message(&mut stream, &event).await?;
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "event subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

/// Process a request and return a response
async fn process_request(request: Request, shared: &Shared) -> Response {
    let result = match request {
        Request::Ping => Ok(Response::Pong),

        Request::GetStatus => match shared.engine.status().await {
            Ok(status) => {
                let registered = *shared.hotkey_registered.read().await;
                let muted = mute_state(&shared.microphone).await;
                let uptime = shared.start_time.elapsed().as_secs();
                Ok(Response::Status(DaemonStatus::from_engine(
                    &status, registered, muted, uptime,
                )))
            }
            Err(e) => Err(e),
        },

        Request::CaptureShortcut {
            finish_after_key_down_ms,
            fail_delay_ms,
        } => {
            let config = Request::capture_config(
                finish_after_key_down_ms,
                fail_delay_ms,
                shared.capture_defaults,
            );
            shared.engine.capture(config).await.map(Response::from_capture)
        }

        Request::SaveShortcut { keys } => match Shortcut::try_from(keys) {
            Ok(shortcut) => match shared.engine.save_shortcut(shortcut.clone()).await {
                Ok(Ok(())) => Ok(Response::saved(&shortcut)),
                Ok(Err(e)) => Ok(Response::error("save_failed", e.to_string())),
                Err(e) => Err(e),
            },
            Err(e) => Ok(Response::error("invalid_shortcut", e.to_string())),
        },

        // Handled by the connection loop
        Request::Subscribe => Ok(Response::Subscribed),
    };

    result.unwrap_or_else(|e: HandleError| Response::error("engine_stopped", e.to_string()))
}

/// Ask the microphone for its mute state off the async threads
async fn mute_state(microphone: &Arc<dyn Microphone>) -> Option<bool> {
    let microphone = Arc::clone(microphone);
    match tokio::task::spawn_blocking(move || microphone.is_muted()).await {
        Ok(Ok(muted)) => Some(muted),
        Ok(Err(e)) => {
            debug!(error = %e, "mute state unavailable");
            None
        }
        Err(e) => {
            warn!(?e, "mute state query panicked");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Reactor;
    use crate::hotkey::{KeyEvent, KeyEventSource};
    use crate::mic::fake::FakeMicrophone;
    use crate::mic::UnsupportedMicrophone;
    use crate::shortcut::ShortcutStore;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::DuplexStream;
    use tokio::sync::mpsc;

    struct Fixture {
        _dir: TempDir,
        source: KeyEventSource,
        shared: Arc<Shared>,
        client: DuplexStream,
        path: PathBuf,
    }

    fn connect(shared: &Arc<Shared>) -> DuplexStream {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(handle_client(server, Arc::clone(shared)));
        client
    }

    fn start() -> Fixture {
        start_with(Arc::new(FakeMicrophone::new(false)))
    }

    fn start_with(microphone: Arc<dyn Microphone>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shortcut.json");
        let source = KeyEventSource::new();
        let (event_tx, _) = broadcast::channel(16);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let reactor = Reactor::new(
            source.clone(),
            ShortcutStore::load(&path),
            Box::new(|| {}),
            event_tx.clone(),
        );
        tokio::spawn(reactor.run(cmd_rx));

        let shared = Arc::new(Shared::new(
            EngineHandle::new(cmd_tx),
            event_tx,
            microphone,
            CaptureConfig::default(),
        ));
        let client = connect(&shared);

        Fixture {
            _dir: dir,
            source,
            shared,
            client,
            path,
        }
    }

    async fn call(client: &mut DuplexStream, request: &Request) -> Response {
        send_message(client, request).await.unwrap();
        read_response(client).await
    }

    async fn read_response<T: serde::de::DeserializeOwned>(client: &mut DuplexStream) -> T {
        let mut len_buf = [0u8; 4];
        client.read_exact(&mut len_buf).await.unwrap();
        let mut body = vec![0u8; u32::from_le_bytes(len_buf) as usize];
        client.read_exact(&mut body).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_ping_and_status() {
        let mut f = start();
        assert_eq!(call(&mut f.client, &Request::Ping).await, Response::Pong);

        match call(&mut f.client, &Request::GetStatus).await {
            Response::Status(status) => {
                assert_eq!(status.display, "LEFT CTRL + LEFT ALT");
                assert!(!status.capturing);
                assert!(!status.hotkey_registered);
                assert_eq!(status.muted, Some(false));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_reports_mute_state() {
        let mut f = start_with(Arc::new(FakeMicrophone::new(true)));
        match call(&mut f.client, &Request::GetStatus).await {
            Response::Status(status) => assert_eq!(status.muted, Some(true)),
            other => panic!("unexpected response: {other:?}"),
        }

        let mut f = start_with(Arc::new(UnsupportedMicrophone));
        match call(&mut f.client, &Request::GetStatus).await {
            Response::Status(status) => assert_eq!(status.muted, None),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_and_save_over_socket() {
        let mut f = start();

        let request = Request::CaptureShortcut {
            finish_after_key_down_ms: Some(50),
            fail_delay_ms: Some(500),
        };
        send_message(&mut f.client, &request).await.unwrap();

        // Give the reactor time to attach the capture session
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.source.publish(KeyEvent::down("F13"));

        let response: Response = read_response(&mut f.client).await;
        assert_eq!(
            response,
            Response::Captured {
                keys: vec!["F13".into()],
                display: "F13".into(),
            }
        );

        let saved = call(
            &mut f.client,
            &Request::SaveShortcut {
                keys: vec!["F13".into()],
            },
        )
        .await;
        assert_eq!(saved, Response::saved(&Shortcut::new(["F13"])));
        assert_eq!(ShortcutStore::load(&f.path).current(), &Shortcut::new(["F13"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_timeout_over_socket() {
        let mut f = start();
        let response = call(
            &mut f.client,
            &Request::CaptureShortcut {
                finish_after_key_down_ms: None,
                fail_delay_ms: Some(100),
            },
        )
        .await;
        assert_eq!(response, Response::CaptureTimedOut { fail_delay_ms: 100 });
    }

    #[tokio::test]
    async fn test_invalid_shortcut_rejected() {
        let mut f = start();
        let response = call(&mut f.client, &Request::SaveShortcut { keys: vec![] }).await;
        assert!(matches!(response, Response::Error { code, .. } if code == "invalid_shortcut"));
    }

    #[tokio::test]
    async fn test_subscribe_forwards_events() {
        let mut f = start();
        assert_eq!(call(&mut f.client, &Request::Subscribe).await, Response::Subscribed);

        let mut other = connect(&f.shared);
        let saved = call(
            &mut other,
            &Request::SaveShortcut {
                keys: vec!["RIGHT ALT".into(), "M".into()],
            },
        )
        .await;
        assert!(matches!(saved, Response::ShortcutSaved { .. }));

        let event: EngineEvent = read_response(&mut f.client).await;
        assert_eq!(
            event,
            EngineEvent::ShortcutSaved {
                keys: vec!["RIGHT ALT".into(), "M".into()],
            }
        );
    }
}
