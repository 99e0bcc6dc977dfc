//! Library-level filtering of raw classifier output

use super::{ClassifierResult, ListenOptions};

/// Labels conventionally used for the background-noise and unknown classes
const NOISE_LABELS: &[&str] = &["_background_noise_", "_unknown_", "background noise"];

/// Whether a label names the background-noise or unknown class
pub fn is_noise_label(label: &str) -> bool {
    let label = label.trim();
    NOISE_LABELS
        .iter()
        .any(|noise| label.eq_ignore_ascii_case(noise))
}

/// Decides which raw results reach listeners
#[derive(Debug, Clone, Copy)]
pub struct StreamGate {
    options: ListenOptions,
}

impl StreamGate {
    pub fn new(options: ListenOptions) -> Self {
        Self { options }
    }

    /// Whether `result` should be delivered for a model with `labels`
    pub fn admits(&self, labels: &[String], result: &ClassifierResult) -> bool {
        let Some((index, score)) = result.arg_max() else {
            return false;
        };

        if score < self.options.probability_threshold {
            return false;
        }

        if !self.options.invoke_callback_on_noise_and_unknown {
            if let Some(label) = labels.get(index) {
                if is_noise_label(label) {
                    return false;
                }
            }
        }

        true
    }

    /// Prepare an admitted result for delivery
    pub fn shape(&self, mut result: ClassifierResult) -> ClassifierResult {
        if !self.options.include_spectrogram {
            result.spectrogram = None;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        ["Background Noise", "No", "Yes"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_noise_labels() {
        assert!(is_noise_label("_background_noise_"));
        assert!(is_noise_label("_unknown_"));
        assert!(is_noise_label("Background Noise"));
        assert!(!is_noise_label("Yes"));
    }

    #[test]
    fn test_gate_applies_probability_threshold() {
        let gate = StreamGate::new(ListenOptions::default());
        assert!(!gate.admits(&labels(), &ClassifierResult::new(vec![0.2, 0.3, 0.5])));
        assert!(gate.admits(&labels(), &ClassifierResult::new(vec![0.0, 0.3, 0.7])));
    }

    #[test]
    fn test_gate_noise_suppression() {
        let noisy = ClassifierResult::new(vec![0.9, 0.05, 0.05]);

        let gate = StreamGate::new(ListenOptions::default());
        assert!(gate.admits(&labels(), &noisy));

        let gate = StreamGate::new(ListenOptions {
            invoke_callback_on_noise_and_unknown: false,
            ..ListenOptions::default()
        });
        assert!(!gate.admits(&labels(), &noisy));
        assert!(gate.admits(&labels(), &ClassifierResult::new(vec![0.05, 0.05, 0.9])));
    }

    #[test]
    fn test_gate_strips_spectrogram() {
        let gate = StreamGate::new(ListenOptions::default());
        let result = ClassifierResult {
            scores: vec![1.0],
            spectrogram: Some(vec![0.1, 0.2]),
        };
        assert!(gate.shape(result).spectrogram.is_none());
    }
}
