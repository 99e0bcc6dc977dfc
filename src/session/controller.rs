//! Command session controller
//!
//! Owns the classifier handle and drives Idle -> Loading -> Listening -> Idle.
//! Results are consumed on the same task as control commands, so result
//! handling never overlaps itself.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use super::tracker::CommandTracker;
use crate::capture::{CaptureError, CaptureProbe};
use crate::classifier::{Classifier, ClassifierError, ClassifierFactory, ClassifierResult, ListenOptions};
use crate::config::DEFAULT_CONFIRM_THRESHOLD;
use crate::events::SessionEvent;
use crate::model::{ModelLoadError, ModelLocation, ModelSource};
use crate::presentation::{Controls, Presenter, Reading};

const LISTENING_BANNER: &str = "Listening...";
const LOADING_BANNER: &str = "Loading model...";
const NO_COMMAND_BANNER: &str = "None";

/// Lifecycle state of the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Not listening; start is available
    #[default]
    Idle,
    /// Classifier initializing
    Loading,
    /// Streaming results until stopped
    Listening,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Loading => write!(f, "Loading"),
            SessionState::Listening => write!(f, "Listening"),
        }
    }
}

/// Errors surfaced by `start`
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to load model: {0}")]
    ModelLoad(#[from] ModelLoadError),

    #[error("{0}")]
    PermissionDenied(CaptureError),

    #[error("failed to start listening: {0}")]
    RuntimeListen(String),
}

impl SessionError {
    /// Stable identifier for events and IPC error codes
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::ModelLoad(_) => "model_load",
            SessionError::PermissionDenied(_) => "permission_denied",
            SessionError::RuntimeListen(_) => "runtime_listen",
        }
    }
}

impl From<CaptureError> for SessionError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::PermissionDenied { .. } => SessionError::PermissionDenied(e),
            other => SessionError::RuntimeListen(other.to_string()),
        }
    }
}

impl From<ClassifierError> for SessionError {
    fn from(e: ClassifierError) -> Self {
        SessionError::RuntimeListen(e.to_string())
    }
}

/// Requests sent to a running session from other tasks
#[derive(Debug)]
pub enum ControlCommand {
    Start {
        reply: oneshot::Sender<Result<SessionState, String>>,
    },
    Stop {
        reply: oneshot::Sender<SessionState>,
    },
}

impl ControlCommand {
    /// A start request nobody waits on; the outcome is only logged
    pub fn detached_start() -> Self {
        let (reply, _) = oneshot::channel();
        ControlCommand::Start { reply }
    }
}

struct LoadedClassifier {
    location: ModelLocation,
    classifier: Arc<dyn Classifier>,
}

enum Input {
    Control(ControlCommand),
    Result(Option<ClassifierResult>),
}

/// The command session controller
pub struct CommandSession {
    location: ModelLocation,
    source: Arc<dyn ModelSource>,
    factory: Arc<dyn ClassifierFactory>,
    probe: Option<Arc<dyn CaptureProbe>>,
    presenter: Box<dyn Presenter>,
    options: ListenOptions,
    loaded: Option<LoadedClassifier>,
    state: SessionState,
    tracker: CommandTracker,
    /// Labels of the active session
    labels: Vec<String>,
    results: Option<mpsc::Receiver<ClassifierResult>>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl CommandSession {
    /// Create an idle session for the model at `location`
    pub fn new(
        location: ModelLocation,
        source: Arc<dyn ModelSource>,
        factory: Arc<dyn ClassifierFactory>,
        mut presenter: Box<dyn Presenter>,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        presenter.set_controls(Controls::IDLE);

        Self {
            location,
            source,
            factory,
            probe: None,
            presenter,
            options: ListenOptions::default(),
            loaded: None,
            state: SessionState::Idle,
            tracker: CommandTracker::new(DEFAULT_CONFIRM_THRESHOLD),
            labels: Vec::new(),
            results: None,
            event_tx,
        }
    }

    /// Require capture permission before each session
    pub fn with_probe(mut self, probe: Arc<dyn CaptureProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_listen_options(mut self, options: ListenOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_confirm_threshold(mut self, threshold: f32) -> Self {
        self.tracker = CommandTracker::new(threshold);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_command(&self) -> Option<&str> {
        self.tracker.current()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Load the classifier for `location`, reusing it if already loaded
    pub async fn initialize(
        &mut self,
        location: &ModelLocation,
    ) -> Result<Arc<dyn Classifier>, ModelLoadError> {
        if let Some(loaded) = &self.loaded {
            if loaded.location == *location {
                debug!(%location, "classifier already initialized");
                return Ok(Arc::clone(&loaded.classifier));
            }
        }

        if self.state == SessionState::Listening {
            info!(%location, "model location changed, stopping current session");
            self.stop().await;
        }

        info!(%location, "loading model");
        let artifacts = self.source.fetch(location).await?;
        let classifier = self.factory.create(artifacts)?;

        self.location = location.clone();
        self.loaded = Some(LoadedClassifier {
            location: location.clone(),
            classifier: Arc::clone(&classifier),
        });

        Ok(classifier)
    }

    /// Start a listening session
    ///
    /// A no-op returning the current state unless Idle. On failure the
    /// error is shown, controls are re-enabled and the session is Idle.
    pub async fn start(&mut self) -> Result<SessionState, SessionError> {
        if self.state != SessionState::Idle {
            debug!(state = %self.state, "start ignored");
            return Ok(self.state);
        }

        match self.begin().await {
            Ok(()) => Ok(self.state),
            Err(e) => {
                self.abort_start(&e);
                Err(e)
            }
        }
    }

    async fn begin(&mut self) -> Result<(), SessionError> {
        self.transition_to(SessionState::Loading);
        self.presenter.set_controls(Controls::LOADING);
        if self.loaded.is_none() {
            self.presenter.show_banner(LOADING_BANNER);
        }
        self.emit(SessionEvent::Loading);

        let location = self.location.clone();
        let classifier = self.initialize(&location).await?;

        if let Some(probe) = self.probe.clone() {
            probe.probe().await?;
        }

        self.labels = classifier.word_labels().to_vec();
        self.tracker.reset();
        self.presenter.reset_labels(&self.labels);

        let results = classifier.listen(self.options).await?;
        self.results = Some(results);

        self.transition_to(SessionState::Listening);
        self.presenter.set_controls(Controls::LISTENING);
        self.presenter.show_banner(LISTENING_BANNER);
        self.emit(SessionEvent::Listening {
            labels: self.labels.clone(),
        });

        Ok(())
    }

    fn abort_start(&mut self, error: &SessionError) {
        warn!(kind = error.kind(), %error, "failed to start listening");

        self.results = None;
        self.transition_to(SessionState::Idle);
        self.presenter.show_error(&error.to_string());
        self.presenter.set_controls(Controls::IDLE);
        self.emit(SessionEvent::StartFailed {
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
    }

    /// Stop the session; a no-op unless Listening
    pub async fn stop(&mut self) -> SessionState {
        if self.state != SessionState::Listening {
            debug!(state = %self.state, "stop ignored");
            return self.state;
        }

        if let Some(loaded) = &self.loaded {
            if let Err(e) = loaded.classifier.stop_listening().await {
                warn!(%e, "classifier refused to stop");
            }
        }

        self.finish();
        self.state
    }

    /// Handle one classifier result
    pub fn on_result(&mut self, result: ClassifierResult) {
        if self.state != SessionState::Listening {
            trace!("dropping result outside a session");
            return;
        }

        if result.scores.len() != self.labels.len() {
            warn!(
                expected = self.labels.len(),
                got = result.scores.len(),
                "ignoring result with wrong label count"
            );
            return;
        }

        let readings: Vec<Reading> = self
            .labels
            .iter()
            .zip(&result.scores)
            .map(|(label, &score)| Reading::new(label.as_str(), score))
            .collect();
        self.presenter.show_readings(&readings);
        self.emit(SessionEvent::Readings { readings });

        if let Some(change) = self.tracker.observe(&self.labels, &result) {
            info!(command = %change.label, score = change.score, "command confirmed");
            self.presenter.show_command(&change.label);
            self.emit(SessionEvent::CommandChanged {
                label: change.label,
                score: change.score,
            });
        }
    }

    /// Run the session, processing control commands and results
    pub async fn run(&mut self, mut control_rx: mpsc::Receiver<ControlCommand>) {
        info!(state = %self.state, "session controller started");

        loop {
            let input = tokio::select! {
                command = control_rx.recv() => match command {
                    Some(command) => Input::Control(command),
                    None => break,
                },
                result = next_result(&mut self.results) => Input::Result(result),
            };

            match input {
                Input::Control(ControlCommand::Start { reply }) => {
                    let outcome = self.start().await.map_err(|e| e.to_string());
                    let _ = reply.send(outcome);
                }
                Input::Control(ControlCommand::Stop { reply }) => {
                    let state = self.stop().await;
                    let _ = reply.send(state);
                }
                Input::Result(Some(result)) => self.on_result(result),
                Input::Result(None) => self.end_of_stream().await,
            }
        }

        info!("session controller stopped");
    }

    async fn end_of_stream(&mut self) {
        warn!("classifier stream ended, stopping session");

        if let Some(loaded) = &self.loaded {
            if loaded.classifier.is_listening() {
                if let Err(e) = loaded.classifier.stop_listening().await {
                    debug!(%e, "classifier already stopped");
                }
            }
        }

        self.finish();
    }

    fn finish(&mut self) {
        self.results = None;
        self.transition_to(SessionState::Idle);
        self.presenter.set_controls(Controls::IDLE);

        // The current command survives stop; only the banner falls back
        if self.tracker.current().is_none() {
            self.presenter.show_banner(NO_COMMAND_BANNER);
        }

        self.emit(SessionEvent::Stopped {
            current_command: self.tracker.current().map(str::to_string),
        });
    }

    fn transition_to(&mut self, new_state: SessionState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }

        info!(from = %old_state, to = %new_state, "session transition");
        self.state = new_state;
    }

    fn emit(&self, event: SessionEvent) {
        match &event {
            SessionEvent::Readings { .. } => trace!(%event, "emitting event"),
            _ => debug!(%event, "emitting event"),
        }
        let _ = self.event_tx.send(event);
    }
}

/// Next result of the active stream; pending forever without one
async fn next_result(
    results: &mut Option<mpsc::Receiver<ClassifierResult>>,
) -> Option<ClassifierResult> {
    match results {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
