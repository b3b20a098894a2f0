//! Artifact lookup collaborator.
//!
//! Given a data product's external id, returns the artifacts the discovery
//! service knows for it via
//! `GET /api/dataproduct/discovery/uuid/{uuid}/artifacts`.

use anyhow::Result;
use async_trait::async_trait;

use crate::config::ArtifactsConfig;
use crate::http_client::HttpClient;
use crate::middleware::{HEADER_CORRELATION_ID, HEADER_USERNAME};
use crate::models::Artifact;

/// Username this service presents on outbound calls.
pub const SERVICE_USERNAME: &str = "dm-search";

#[async_trait]
pub trait ArtifactLookup: Send + Sync {
    async fn artifacts(&self, external_id: &str, correlation_id: &str) -> Result<Vec<Artifact>>;
}

pub struct HttpArtifactLookup {
    client: HttpClient,
    config: ArtifactsConfig,
}

impl HttpArtifactLookup {
    pub fn new(client: HttpClient, config: ArtifactsConfig) -> Self {
        Self { client, config }
    }
}

pub fn artifacts_path(external_id: &str) -> String {
    format!("/api/dataproduct/discovery/uuid/{}/artifacts", external_id)
}

#[async_trait]
impl ArtifactLookup for HttpArtifactLookup {
    async fn artifacts(&self, external_id: &str, correlation_id: &str) -> Result<Vec<Artifact>> {
        let service = artifacts_path(external_id);
        tracing::info!(%service, %correlation_id, "looking up artifacts");
        self.client
            .request(
                &self.config.host,
                self.config.port,
                &service,
                "GET",
                &[
                    (HEADER_USERNAME, SERVICE_USERNAME),
                    (HEADER_CORRELATION_ID, correlation_id),
                ],
            )
            .await
    }
}
