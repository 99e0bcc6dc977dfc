//! Events module for session transitions
//!
//! Provides structured event types for session start, stop, per-tick
//! readings and confirmed command changes.

use serde::{Deserialize, Serialize};

use crate::presentation::Reading;

/// Events emitted by the session controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Model is loading (first start only)
    Loading,

    /// Session is listening
    Listening {
        /// Labels the classifier will score, in declaration order
        labels: Vec<String>,
    },

    /// Probabilities for one inference tick
    Readings { readings: Vec<Reading> },

    /// A new command cleared the confirmation threshold
    CommandChanged { label: String, score: f32 },

    /// Session stopped
    Stopped {
        /// Last confirmed command, kept across stop
        current_command: Option<String>,
    },

    /// Start failed and the session is back to Idle
    StartFailed { kind: String, message: String },
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Loading => write!(f, "LOADING"),
            SessionEvent::Listening { labels } => write!(f, "LISTENING ({} labels)", labels.len()),
            SessionEvent::Readings { readings } => write!(f, "READINGS ({})", readings.len()),
            SessionEvent::CommandChanged { label, score } => {
                write!(f, "COMMAND_CHANGED ({label} @ {score:.2})")
            }
            SessionEvent::Stopped { current_command } => write!(
                f,
                "STOPPED ({})",
                current_command.as_deref().unwrap_or("none")
            ),
            SessionEvent::StartFailed { kind, .. } => write!(f, "START_FAILED ({kind})"),
        }
    }
}
