//! Model module for locating and fetching classifier artifacts
//!
//! A model lives under a base location holding two resources:
//! - `model.json`: topology and weights manifest
//! - `metadata.json`: word labels and model metadata

mod artifacts;
mod location;
mod source;

pub use artifacts::{ModelArtifacts, ModelMetadata, ModelTopology};
pub use location::ModelLocation;
pub use source::{HttpModelSource, ModelSource};

/// Errors raised while fetching or validating a model
#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("failed to fetch {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("failed to fetch {url}: server returned {status}")]
    Status { url: String, status: u16 },

    #[error("malformed model resource {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("failed to construct classifier: {0}")]
    Construction(String),
}
