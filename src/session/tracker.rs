//! Confirmation and change detection for the top-scoring label

use crate::classifier::ClassifierResult;

/// A newly confirmed command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandChange {
    pub label: String,
    pub score: f32,
}

/// Tracks the current command across results
///
/// The arg-max label replaces the current command only when its score
/// strictly exceeds the threshold and it differs from the current command.
#[derive(Debug, Clone)]
pub struct CommandTracker {
    threshold: f32,
    current: Option<String>,
}

impl CommandTracker {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Forget the current command
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Feed one result, returning the change if the current command moved
    pub fn observe(&mut self, labels: &[String], result: &ClassifierResult) -> Option<CommandChange> {
        let (index, score) = result.arg_max()?;
        if score <= self.threshold {
            return None;
        }

        let label = labels.get(index)?;
        if self.current.as_deref() == Some(label.as_str()) {
            return None;
        }

        self.current = Some(label.clone());
        Some(CommandChange {
            label: label.clone(),
            score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["Yes".to_string(), "No".to_string(), "Noise".to_string()]
    }

    fn observe(tracker: &mut CommandTracker, scores: &[f32]) -> Option<CommandChange> {
        tracker.observe(&labels(), &ClassifierResult::new(scores.to_vec()))
    }

    #[test]
    fn test_initial_command_is_absent() {
        let tracker = CommandTracker::new(0.75);
        assert_eq!(tracker.current(), None);
    }

    #[test]
    fn test_yes_then_same_then_no() {
        let mut tracker = CommandTracker::new(0.75);

        let change = observe(&mut tracker, &[0.9, 0.05, 0.05]).unwrap();
        assert_eq!(change.label, "Yes");
        assert_eq!(tracker.current(), Some("Yes"));

        assert!(observe(&mut tracker, &[0.92, 0.04, 0.04]).is_none());
        assert_eq!(tracker.current(), Some("Yes"));

        let change = observe(&mut tracker, &[0.2, 0.85, 0.0]).unwrap();
        assert_eq!(change.label, "No");
        assert_eq!(tracker.current(), Some("No"));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut tracker = CommandTracker::new(0.75);
        assert!(observe(&mut tracker, &[0.75, 0.2, 0.05]).is_none());
        assert!(observe(&mut tracker, &[0.1, 0.6, 0.3]).is_none());
        assert!(observe(&mut tracker, &[0.34, 0.33, 0.33]).is_none());
        assert_eq!(tracker.current(), None);
    }

    #[test]
    fn test_below_threshold_keeps_current() {
        let mut tracker = CommandTracker::new(0.75);
        observe(&mut tracker, &[0.95, 0.03, 0.02]);

        for scores in [[0.1, 0.7, 0.2], [0.2, 0.2, 0.6], [0.0, 0.75, 0.25]] {
            assert!(observe(&mut tracker, &scores).is_none());
            assert_eq!(tracker.current(), Some("Yes"));
        }
    }

    #[test]
    fn test_tie_goes_to_first_label() {
        let mut tracker = CommandTracker::new(0.3);
        let change = observe(&mut tracker, &[0.1, 0.45, 0.45]).unwrap();
        assert_eq!(change.label, "No");
    }

    #[test]
    fn test_reset_allows_reannounce() {
        let mut tracker = CommandTracker::new(0.75);
        assert!(observe(&mut tracker, &[0.9, 0.05, 0.05]).is_some());
        tracker.reset();
        assert!(observe(&mut tracker, &[0.9, 0.05, 0.05]).is_some());
    }
}
