//! Session module for the command-recognition lifecycle
//!
//! Provides the session controller with three states:
//! - Idle: Not listening, start is available
//! - Loading: Classifier initializing
//! - Listening: Streaming results, confirmed commands are announced

mod controller;
mod tracker;

pub use controller::{CommandSession, ControlCommand, SessionState};
