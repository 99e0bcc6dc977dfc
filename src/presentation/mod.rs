//! Presentation module for session feedback
//!
//! The session drives a [`Presenter`] on every transition and every result.
//! One implementation exists, [`ConsolePresenter`], parameterized by
//! [`DisplayMode`].

mod console;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use console::ConsolePresenter;

/// How per-label probabilities are rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// One `label: percent` line per label
    Text,
    /// Label, fill bar and percent text per label
    #[default]
    Bars,
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "bars" | "bar" => Ok(Self::Bars),
            other => Err(format!("unknown display mode {other:?}, expected text or bars")),
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayMode::Text => write!(f, "text"),
            DisplayMode::Bars => write!(f, "bars"),
        }
    }
}

/// One label's probability on one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub label: String,
    pub score: f32,
    /// Score as a percentage rounded to one decimal place
    pub percent: f32,
}

impl Reading {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
            percent: round_percent(score),
        }
    }
}

/// `score * 100`, rounded to one decimal place
pub fn round_percent(score: f32) -> f32 {
    ((f64::from(score) * 1000.0).round() / 10.0) as f32
}

/// Enabled state of the start and stop controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controls {
    pub start_enabled: bool,
    pub stop_enabled: bool,
}

impl Controls {
    /// Ready to start (initial state, after stop, after a failed start)
    pub const IDLE: Controls = Controls {
        start_enabled: true,
        stop_enabled: false,
    };

    /// Model loading, nothing can be pressed
    pub const LOADING: Controls = Controls {
        start_enabled: false,
        stop_enabled: false,
    };

    pub const LISTENING: Controls = Controls {
        start_enabled: false,
        stop_enabled: true,
    };
}

/// Display surface driven by the session
pub trait Presenter: Send {
    /// Drop existing label slots and create one per label
    fn reset_labels(&mut self, labels: &[String]);

    /// Update every label's probability
    fn show_readings(&mut self, readings: &[Reading]);

    /// Announce a newly confirmed command
    fn show_command(&mut self, label: &str);

    /// Replace the command banner with status text
    fn show_banner(&mut self, text: &str);

    /// Show a user-facing error
    fn show_error(&mut self, message: &str);

    fn set_controls(&mut self, controls: Controls);
}
