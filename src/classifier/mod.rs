//! Classifier module for the opaque speech-command model
//!
//! The classifier maps audio windows to a score per label. Results are
//! pushed through a channel while listening; nothing here inspects audio.

mod feed;
mod gate;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::model::{ModelArtifacts, ModelLoadError};

pub use feed::FeedClassifierFactory;
pub use gate::StreamGate;

/// Scores for one inference tick, in label declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierResult {
    pub scores: Vec<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spectrogram: Option<Vec<f32>>,
}

impl ClassifierResult {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores,
            spectrogram: None,
        }
    }

    /// Index and score of the highest-scoring label
    ///
    /// Ties resolve to the first index holding the maximum. NaN never wins.
    pub fn arg_max(&self) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (index, &score) in self.scores.iter().enumerate() {
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((index, score)),
            }
        }
        best
    }
}

/// Streaming configuration handed to the classifier on `listen`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ListenOptions {
    /// Attach the input spectrogram to each result
    pub include_spectrogram: bool,
    /// Results whose top score is below this are never delivered
    pub probability_threshold: f32,
    /// Deliver results whose top label is background noise or unknown
    pub invoke_callback_on_noise_and_unknown: bool,
    /// Overlap between successive analysis windows, in `[0, 1)`
    pub overlap_factor: f32,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            include_spectrogram: false,
            probability_threshold: 0.7,
            invoke_callback_on_noise_and_unknown: true,
            overlap_factor: 0.5,
        }
    }
}

impl ListenOptions {
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if !(0.0..1.0).contains(&self.overlap_factor) {
            return Err(ClassifierError::InvalidOptions(format!(
                "overlap factor must be within [0, 1), got {}",
                self.overlap_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.probability_threshold) {
            return Err(ClassifierError::InvalidOptions(format!(
                "probability threshold must be within [0, 1], got {}",
                self.probability_threshold
            )));
        }
        Ok(())
    }
}

/// Errors raised by a classifier's streaming interface
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier is already listening")]
    AlreadyListening,

    #[error("classifier is not listening")]
    NotListening,

    #[error("invalid streaming options: {0}")]
    InvalidOptions(String),
}

/// A loaded, ready-to-stream classifier
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Labels in declaration order; fixed for the classifier's lifetime
    fn word_labels(&self) -> &[String];

    /// Begin streaming results through the returned receiver
    async fn listen(
        &self,
        options: ListenOptions,
    ) -> Result<mpsc::Receiver<ClassifierResult>, ClassifierError>;

    /// Stop streaming; the receiver handed out by `listen` closes
    async fn stop_listening(&self) -> Result<(), ClassifierError>;

    fn is_listening(&self) -> bool;
}

/// Builds classifiers from fetched model artifacts
pub trait ClassifierFactory: Send + Sync {
    fn create(&self, artifacts: ModelArtifacts) -> Result<Arc<dyn Classifier>, ModelLoadError>;
}

/// Reject label sets no classifier can stream against
pub fn validate_labels(labels: &[String]) -> Result<(), ModelLoadError> {
    if labels.is_empty() {
        return Err(ModelLoadError::Construction(
            "model declares no word labels".to_string(),
        ));
    }
    for (index, label) in labels.iter().enumerate() {
        if labels[..index].contains(label) {
            return Err(ModelLoadError::Construction(format!(
                "duplicate word label {label:?}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_max_first_index_wins_ties() {
        let result = ClassifierResult::new(vec![0.4, 0.4, 0.2]);
        assert_eq!(result.arg_max(), Some((0, 0.4)));

        let result = ClassifierResult::new(vec![0.1, 0.45, 0.45]);
        assert_eq!(result.arg_max(), Some((1, 0.45)));
    }

    #[test]
    fn test_arg_max_skips_nan() {
        let result = ClassifierResult::new(vec![f32::NAN, 0.3, 0.2]);
        assert_eq!(result.arg_max(), Some((1, 0.3)));

        assert_eq!(ClassifierResult::new(vec![]).arg_max(), None);
    }

    #[test]
    fn test_listen_options_validation() {
        assert!(ListenOptions::default().validate().is_ok());

        let options = ListenOptions {
            overlap_factor: 1.0,
            ..ListenOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ClassifierError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_result_deserialization() {
        let result: ClassifierResult = serde_json::from_str(r#"{"scores":[0.1,0.9]}"#).unwrap();
        assert_eq!(result.scores, vec![0.1, 0.9]);
        assert!(result.spectrogram.is_none());
    }

    #[test]
    fn test_validate_labels() {
        let labels = vec!["Yes".to_string(), "No".to_string()];
        assert!(validate_labels(&labels).is_ok());
        assert!(validate_labels(&[]).is_err());

        let labels = vec!["Yes".to_string(), "Yes".to_string()];
        let err = validate_labels(&labels).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
