//! Fetching model resources

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use super::{ModelArtifacts, ModelLoadError, ModelLocation, ModelMetadata, ModelTopology};

/// Anything able to fetch the two model resources for a location
#[async_trait]
pub trait ModelSource: Send + Sync {
    async fn fetch(&self, location: &ModelLocation) -> Result<ModelArtifacts, ModelLoadError>;
}

/// Fetches remote models over HTTP(S) and local models from disk
#[derive(Debug, Clone, Default)]
pub struct HttpModelSource {
    client: Client,
}

impl HttpModelSource {
    async fn read(&self, location: &ModelLocation, url: &str) -> Result<Vec<u8>, ModelLoadError> {
        match location {
            ModelLocation::Remote(_) => self.get(url).await,
            ModelLocation::Local(_) => {
                tokio::fs::read(url)
                    .await
                    .map_err(|e| ModelLoadError::Unreachable {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })
            }
        }
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, ModelLoadError> {
        let unreachable = |e: reqwest::Error| ModelLoadError::Unreachable {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(unreachable)?;
        let status = response.status();
        debug!(url, %status, "model resource response");

        if !status.is_success() {
            return Err(ModelLoadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(unreachable)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ModelSource for HttpModelSource {
    async fn fetch(&self, location: &ModelLocation) -> Result<ModelArtifacts, ModelLoadError> {
        let checkpoint_url = location.checkpoint_url();
        let metadata_url = location.metadata_url();

        // Both resources must be reachable before either is parsed
        let (checkpoint, metadata) = tokio::try_join!(
            self.read(location, &checkpoint_url),
            self.read(location, &metadata_url),
        )?;

        let topology = ModelTopology::parse(&checkpoint_url, &checkpoint)?;
        let metadata = ModelMetadata::parse(&metadata_url, &metadata)?;

        info!(
            %location,
            labels = metadata.word_labels.len(),
            model_name = metadata.model_name.as_deref().unwrap_or("unnamed"),
            "model resources fetched"
        );

        Ok(ModelArtifacts { topology, metadata })
    }
}
