//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use anyhow::{bail, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::events::SessionEvent;
use crate::session::SessionState;

/// Largest accepted message body
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests from clients to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current session status
    GetStatus,

    /// Start listening
    Start,

    /// Stop listening
    Stop,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to session event notifications
    Subscribe,
}

/// Messages from the daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current session status
    Status(SessionStatus),

    /// Session state after a start or stop request
    SessionChanged { state: SessionState },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Pushed to subscribed clients
    Notification { event: SessionEvent },

    /// Error response
    Error { code: String, message: String },
}

/// Full session status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Daemon version
    pub version: String,

    /// Model base location
    pub model: String,

    pub state: SessionState,

    /// Last confirmed command
    pub current_command: Option<String>,

    /// Labels of the active or last session
    pub labels: Vec<String>,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl SessionStatus {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            model: model.into(),
            state: SessionState::Idle,
            current_command: None,
            labels: Vec::new(),
            uptime_secs: 0,
        }
    }

    /// Fold a session event into the snapshot
    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Loading => self.state = SessionState::Loading,
            SessionEvent::Listening { labels } => {
                self.state = SessionState::Listening;
                self.labels = labels.clone();
                self.current_command = None;
            }
            SessionEvent::CommandChanged { label, .. } => {
                self.current_command = Some(label.clone());
            }
            SessionEvent::Stopped { current_command } => {
                self.state = SessionState::Idle;
                self.current_command = current_command.clone();
            }
            SessionEvent::StartFailed { .. } => self.state = SessionState::Idle,
            SessionEvent::Readings { .. } => {}
        }
    }
}

/// Read one length-prefixed JSON message; `None` on clean end of stream
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        bail!("message too large: {len} bytes");
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;

    Ok(Some(serde_json::from_slice(&msg_buf)?))
}

/// Send a length-prefixed JSON message
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;
    writer.flush().await?;

    Ok(())
}
