//! Parsed model resources

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ModelLoadError;

/// Contents of `model.json`
#[derive(Debug, Clone)]
pub struct ModelTopology {
    /// Layer topology, kept opaque
    pub topology: Value,
    /// Weight shard manifest, kept opaque
    pub weights_manifest: Value,
}

impl ModelTopology {
    /// Parse and validate a topology descriptor
    pub fn parse(url: &str, bytes: &[u8]) -> Result<Self, ModelLoadError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| malformed(url, e))?;
        let object = value
            .as_object()
            .ok_or_else(|| malformed(url, "expected a JSON object"))?;

        let topology = object
            .get("modelTopology")
            .cloned()
            .ok_or_else(|| malformed(url, "missing modelTopology"))?;
        let weights_manifest = object
            .get("weightsManifest")
            .cloned()
            .ok_or_else(|| malformed(url, "missing weightsManifest"))?;

        if !weights_manifest.is_array() {
            return Err(malformed(url, "weightsManifest must be an array"));
        }

        Ok(Self {
            topology,
            weights_manifest,
        })
    }
}

/// Contents of `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    /// Class labels in declaration order
    pub word_labels: Vec<String>,

    #[serde(default)]
    pub model_name: Option<String>,

    #[serde(default)]
    pub tfjs_speech_commands_version: Option<String>,

    #[serde(default)]
    pub time_stamp: Option<String>,
}

impl ModelMetadata {
    /// Parse and validate a metadata descriptor
    pub fn parse(url: &str, bytes: &[u8]) -> Result<Self, ModelLoadError> {
        serde_json::from_slice(bytes).map_err(|e| malformed(url, e))
    }
}

/// Everything fetched from a model location
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub topology: ModelTopology,
    pub metadata: ModelMetadata,
}

fn malformed(url: &str, reason: impl std::fmt::Display) -> ModelLoadError {
    ModelLoadError::Malformed {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}
