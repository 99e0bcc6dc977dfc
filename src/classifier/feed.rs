//! Classifier fed by an external inference engine
//!
//! The engine writes one result per line, either as an object
//! (`{"scores":[...],"spectrogram":[...]}`) or as a bare array of scores.
//! Lines are only consumed while a session is listening.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::{mpsc, oneshot, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::{
    validate_labels, Classifier, ClassifierError, ClassifierFactory, ClassifierResult,
    ListenOptions, StreamGate,
};
use crate::model::{ModelArtifacts, ModelLoadError};

/// Results buffered between the feed pump and the session
const RESULT_CHANNEL_CAPACITY: usize = 32;

type FeedReader = Box<dyn AsyncBufRead + Send + Unpin>;
type SharedFeed = Arc<tokio::sync::Mutex<Lines<FeedReader>>>;

#[derive(Deserialize)]
#[serde(untagged)]
enum FeedLine {
    Result(ClassifierResult),
    Scores(Vec<f32>),
}

fn parse_line(line: &str) -> Result<ClassifierResult, serde_json::Error> {
    Ok(match serde_json::from_str(line)? {
        FeedLine::Result(result) => result,
        FeedLine::Scores(scores) => ClassifierResult::new(scores),
    })
}

/// Creates feed classifiers that all read from one input
pub struct FeedClassifierFactory {
    feed: SharedFeed,
}

impl FeedClassifierFactory {
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        let reader: FeedReader = Box::new(reader);
        Self {
            feed: Arc::new(tokio::sync::Mutex::new(reader.lines())),
        }
    }

    /// Factory reading results from the process's standard input
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl ClassifierFactory for FeedClassifierFactory {
    fn create(&self, artifacts: ModelArtifacts) -> Result<Arc<dyn Classifier>, ModelLoadError> {
        let labels = artifacts.metadata.word_labels;
        validate_labels(&labels)?;

        info!(?labels, "feed classifier constructed");
        Ok(Arc::new(FeedClassifier {
            labels,
            feed: Arc::clone(&self.feed),
            active: Mutex::new(None),
        }))
    }
}

/// Classifier whose results arrive as JSON lines
pub struct FeedClassifier {
    labels: Vec<String>,
    feed: SharedFeed,
    /// Stop handle of the running pump, if any
    active: Mutex<Option<oneshot::Sender<()>>>,
}

impl FeedClassifier {
    fn active(&self) -> MutexGuard<'_, Option<oneshot::Sender<()>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Classifier for FeedClassifier {
    fn word_labels(&self) -> &[String] {
        &self.labels
    }

    async fn listen(
        &self,
        options: ListenOptions,
    ) -> Result<mpsc::Receiver<ClassifierResult>, ClassifierError> {
        options.validate()?;

        let (result_tx, result_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();
        {
            let mut active = self.active();
            if active.as_ref().is_some_and(|stop| !stop.is_closed()) {
                return Err(ClassifierError::AlreadyListening);
            }
            *active = Some(stop_tx);
        }

        let feed = Arc::clone(&self.feed);
        let labels = self.labels.clone();
        let gate = StreamGate::new(options);

        tokio::spawn(async move {
            let lines = feed.lock_owned().await;
            pump(lines, labels, gate, result_tx, stop_rx).await;
        });

        debug!(?options, "feed classifier listening");
        Ok(result_rx)
    }

    async fn stop_listening(&self) -> Result<(), ClassifierError> {
        match self.active().take() {
            Some(stop) => {
                // The pump may already have exited at end of input
                let _ = stop.send(());
                debug!("feed classifier stopped");
                Ok(())
            }
            None => Err(ClassifierError::NotListening),
        }
    }

    fn is_listening(&self) -> bool {
        self.active()
            .as_ref()
            .is_some_and(|stop| !stop.is_closed())
    }
}

/// Move admitted results from the feed to the session until stopped
async fn pump(
    mut lines: OwnedMutexGuard<Lines<FeedReader>>,
    labels: Vec<String>,
    gate: StreamGate,
    result_tx: mpsc::Sender<ClassifierResult>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    loop {
        let line = tokio::select! {
            _ = &mut stop_rx => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("classifier feed reached end of input");
                break;
            }
            Err(e) => {
                warn!(?e, "classifier feed read error");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let result = match parse_line(line) {
            Ok(result) => result,
            Err(e) => {
                warn!(%e, "skipping malformed classifier line");
                continue;
            }
        };

        if result.scores.len() != labels.len() {
            warn!(
                expected = labels.len(),
                got = result.scores.len(),
                "skipping result with wrong label count"
            );
            continue;
        }

        if !gate.admits(&labels, &result) {
            continue;
        }

        if result_tx.send(gate.shape(result)).await.is_err() {
            debug!("result receiver dropped");
            break;
        }
    }
}
