//! Unix domain socket server for IPC
//!
//! Provides request-response control of the session and push notifications
//! of session events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};

use crate::events::SessionEvent;
use crate::session::ControlCommand;

use super::protocol::{read_frame, write_frame, Request, Response, SessionStatus};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

/// State shared with every client handler
struct Shared {
    status: RwLock<ServerState>,
    control_tx: mpsc::Sender<ControlCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
}

struct ServerState {
    status: SessionStatus,
    start_time: std::time::Instant,
}

enum ClientInput {
    Request(Option<Request>),
    Event(Result<SessionEvent, RecvError>),
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        model: &str,
        control_tx: mpsc::Sender<ControlCommand>,
        event_tx: broadcast::Sender<SessionEvent>,
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

        let shared = Arc::new(Shared {
            status: RwLock::new(ServerState {
                status: SessionStatus::new(model),
                start_time: std::time::Instant::now(),
            }),
            control_tx,
            event_tx,
        });

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            shared,
            shutdown_tx,
        })
    }

    /// Update the status snapshot from a session event
    pub async fn apply_event(&self, event: &SessionEvent) {
        let mut state = self.shared.status.write().await;
        let old_state = state.status.state;
        state.status.apply(event);

        if old_state != state.status.state {
            info!(
                from = %old_state,
                to = %state.status.state,
                "IPC server: session state updated"
            );
        }
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
                            result = Self::handle_client(stream, shared) => {
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

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, shared: Arc<Shared>) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        // Frames are read on their own task so a partial read is never
        // cancelled by an outgoing notification
        let (request_tx, request_rx) = mpsc::channel::<Request>(8);
        let reader_task = tokio::spawn(async move {
            loop {
                match read_frame::<_, Request>(&mut reader).await {
                    Ok(Some(request)) => {
                        if request_tx.send(request).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("client disconnected");
                        break;
                    }
                    Err(e) => {
                        warn!(?e, "failed to read request, disconnecting");
                        break;
                    }
                }
            }
        });

        let result = Self::serve_client(&mut writer, request_rx, &shared).await;
        reader_task.abort();
        result
    }

    /// Answer requests and push notifications until the client goes away
    async fn serve_client(
        writer: &mut OwnedWriteHalf,
        mut request_rx: mpsc::Receiver<Request>,
        shared: &Shared,
    ) -> Result<()> {
        let mut events: Option<broadcast::Receiver<SessionEvent>> = None;

        loop {
            let input = tokio::select! {
                request = request_rx.recv() => ClientInput::Request(request),
                event = next_event(&mut events) => ClientInput::Event(event),
            };

            match input {
                ClientInput::Request(None) => return Ok(()),
                ClientInput::Request(Some(request)) => {
                    debug!(?request, "received request");
                    let (response, subscribe) = Self::process_request(request, shared).await;
                    if subscribe && events.is_none() {
                        events = Some(shared.event_tx.subscribe());
                        debug!("client subscribed to notifications");
                    }
                    write_frame(writer, &response).await?;
                }
                ClientInput::Event(Ok(event)) => {
                    write_frame(writer, &Response::Notification { event }).await?;
                }
                ClientInput::Event(Err(RecvError::Lagged(skipped))) => {
                    warn!(skipped, "subscriber lagged");
                }
                ClientInput::Event(Err(RecvError::Closed)) => {
                    events = None;
                }
            }
        }
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(request: Request, shared: &Shared) -> (Response, bool) {
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => {
                let mut state = shared.status.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                (Response::Status(state.status.clone()), false)
            }

            Request::Start => {
                let (reply, reply_rx) = oneshot::channel();
                let outcome = Self::forward(shared, ControlCommand::Start { reply }, reply_rx).await;
                let response = match outcome {
                    Ok(Ok(state)) => Response::SessionChanged { state },
                    Ok(Err(message)) => Response::Error {
                        code: "start_failed".to_string(),
                        message,
                    },
                    Err(response) => response,
                };
                (response, false)
            }

            Request::Stop => {
                let (reply, reply_rx) = oneshot::channel();
                let outcome = Self::forward(shared, ControlCommand::Stop { reply }, reply_rx).await;
                let response = match outcome {
                    Ok(state) => Response::SessionChanged { state },
                    Err(response) => response,
                };
                (response, false)
            }

            Request::Subscribe => (Response::Subscribed, true),
        }
    }

    /// Hand a command to the session task and wait for its reply
    async fn forward<T>(
        shared: &Shared,
        command: ControlCommand,
        reply_rx: oneshot::Receiver<T>,
    ) -> Result<T, Response> {
        let unavailable = || Response::Error {
            code: "unavailable".to_string(),
            message: "session controller is not running".to_string(),
        };

        shared
            .control_tx
            .send(command)
            .await
            .map_err(|_| unavailable())?;
        reply_rx.await.map_err(|_| unavailable())
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

/// Next event for a subscribed client; pending forever otherwise
async fn next_event(
    events: &mut Option<broadcast::Receiver<SessionEvent>>,
) -> Result<SessionEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    fn socket_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "command-listener-{name}-{}.sock",
            std::process::id()
        ))
    }

    /// Session stand-in answering control commands
    fn fake_session(mut control_rx: mpsc::Receiver<ControlCommand>) {
        tokio::spawn(async move {
            while let Some(command) = control_rx.recv().await {
                match command {
                    ControlCommand::Start { reply } => {
                        let _ = reply.send(Err("microphone access denied".to_string()));
                    }
                    ControlCommand::Stop { reply } => {
                        let _ = reply.send(SessionState::Idle);
                    }
                }
            }
        });
    }

    async fn request(stream: &mut UnixStream, request: Request) -> Response {
        write_frame(stream, &request).await.unwrap();
        read_frame(stream).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_ping_status_and_control() {
        let path = socket_path("control");
        let (control_tx, control_rx) = mpsc::channel(4);
        let (event_tx, _) = broadcast::channel(16);
        fake_session(control_rx);

        let server = Arc::new(Server::new(&path, "/srv/models", control_tx, event_tx).unwrap());
        let runner = Arc::clone(&server);
        tokio::spawn(async move { runner.run().await });

        let mut stream = UnixStream::connect(&path).await.unwrap();

        assert!(matches!(request(&mut stream, Request::Ping).await, Response::Pong));

        match request(&mut stream, Request::GetStatus).await {
            Response::Status(status) => {
                assert_eq!(status.state, SessionState::Idle);
                assert_eq!(status.model, "/srv/models");
            }
            other => panic!("unexpected response: {other:?}"),
        }

        match request(&mut stream, Request::Start).await {
            Response::Error { code, message } => {
                assert_eq!(code, "start_failed");
                assert!(message.contains("microphone"));
            }
            other => panic!("unexpected response: {other:?}"),
        }

        assert!(matches!(
            request(&mut stream, Request::Stop).await,
            Response::SessionChanged {
                state: SessionState::Idle
            }
        ));

        server.shutdown().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let path = socket_path("subscribe");
        let (control_tx, _control_rx) = mpsc::channel(4);
        let (event_tx, _) = broadcast::channel(16);

        let server =
            Arc::new(Server::new(&path, "/srv/models", control_tx, event_tx.clone()).unwrap());
        let runner = Arc::clone(&server);
        tokio::spawn(async move { runner.run().await });

        let mut stream = UnixStream::connect(&path).await.unwrap();
        assert!(matches!(
            request(&mut stream, Request::Subscribe).await,
            Response::Subscribed
        ));

        event_tx
            .send(SessionEvent::CommandChanged {
                label: "Yes".to_string(),
                score: 0.9,
            })
            .unwrap();

        let pushed: Response = read_frame(&mut stream).await.unwrap().unwrap();
        match pushed {
            Response::Notification {
                event: SessionEvent::CommandChanged { label, .. },
            } => assert_eq!(label, "Yes"),
            other => panic!("unexpected notification: {other:?}"),
        }

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_unavailable_session() {
        let path = socket_path("unavailable");
        let (control_tx, control_rx) = mpsc::channel(4);
        drop(control_rx);
        let (event_tx, _) = broadcast::channel(16);

        let server = Server::new(&path, "/srv/models", control_tx, event_tx).unwrap();
        let (response, subscribe) = Server::process_request(Request::Start, &server.shared).await;
        assert!(!subscribe);
        assert!(matches!(response, Response::Error { ref code, .. } if code == "unavailable"));

        server.shutdown().await;
    }
}
