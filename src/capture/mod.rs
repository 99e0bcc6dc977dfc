//! Capture permission probing
//!
//! Before a session starts, the capture device is opened once and released
//! straight away. Nothing holds the device for the length of a session.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

/// Errors raised while probing capture access
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("microphone access denied for {device}: grant microphone permission and try again")]
    PermissionDenied { device: String },

    #[error("no capture device at {device}")]
    NotFound { device: String },

    #[error("failed to open capture device {device}: {reason}")]
    Io { device: String, reason: String },
}

/// Checks that audio capture is permitted
#[async_trait]
pub trait CaptureProbe: Send + Sync {
    async fn probe(&self) -> Result<(), CaptureError>;
}

/// Probes a capture device node by opening and immediately closing it
#[derive(Debug, Clone)]
pub struct DeviceProbe {
    device: PathBuf,
}

impl DeviceProbe {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
        }
    }

    pub fn device(&self) -> &Path {
        &self.device
    }
}

#[async_trait]
impl CaptureProbe for DeviceProbe {
    async fn probe(&self) -> Result<(), CaptureError> {
        let device = self.device.display().to_string();

        match tokio::fs::File::open(&self.device).await {
            Ok(handle) => {
                drop(handle);
                debug!(%device, "capture device acquired and released");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                Err(CaptureError::PermissionDenied { device })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CaptureError::NotFound { device }),
            Err(e) => Err(CaptureError::Io {
                device,
                reason: e.to_string(),
            }),
        }
    }
}
