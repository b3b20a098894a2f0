//! Search index over data-product descriptions.
//!
//! [`SearchIndex`] ties an [`Embedder`] to a [`VectorStore`]: descriptions
//! are embedded on [`add`](SearchIndex::add), queries are embedded on
//! [`search`](SearchIndex::search) and matched by cosine similarity. The
//! artifact variant enriches each hit through an [`ArtifactLookup`].
//!
//! Artifact enrichment is best-effort: a failed lookup is logged as a
//! warning and the hit is returned with an empty artifact list.

use anyhow::Result;
use std::sync::Arc;

use crate::artifacts::ArtifactLookup;
use crate::embedding::{embed_one, Embedder};
use crate::models::{HitMetadata, SearchHit};
use crate::store::{VectorRecord, VectorStore};

#[derive(Clone)]
pub struct SearchIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    artifacts: Arc<dyn ArtifactLookup>,
}

impl SearchIndex {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        artifacts: Arc<dyn ArtifactLookup>,
    ) -> Self {
        Self {
            store,
            embedder,
            artifacts,
        }
    }

    /// Indexes `description` under a fresh record id with metadata
    /// `{name, id: external_id}`. Returns the generated record id.
    pub async fn add(&self, external_id: &str, name: &str, description: &str) -> Result<String> {
        let vector = embed_one(self.embedder.as_ref(), description).await?;
        let record = VectorRecord {
            id: uuid::Uuid::new_v4().to_string(),
            external_id: external_id.to_string(),
            name: name.to_string(),
            document: description.to_string(),
            vector,
            created_at: chrono::Utc::now().timestamp(),
        };
        self.store.add(&record).await?;
        tracing::debug!(
            collection = self.store.collection(),
            record_id = %record.id,
            external_id,
            "indexed description"
        );
        Ok(record.id)
    }

    /// Up to `top_k` hits, nearest first. An empty index yields no hits.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        tracing::info!(query, top_k, "search");
        if top_k == 0 || self.store.count().await? == 0 {
            return Ok(Vec::new());
        }

        let vector = embed_one(self.embedder.as_ref(), query).await?;
        let hits: Vec<SearchHit> = self
            .store
            .query(&vector, top_k)
            .await?
            .into_iter()
            .map(|m| SearchHit {
                data: m.document,
                metadata: HitMetadata {
                    name: m.name,
                    id: m.external_id,
                },
                artifact: None,
            })
            .collect();

        tracing::info!(results = hits.len(), "search complete");
        Ok(hits)
    }

    /// [`search`](Self::search), then attach each hit's artifacts.
    pub async fn search_with_artifacts(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        self.search_with_artifacts_correlated(query, top_k, &correlation_id)
            .await
    }

    /// Like [`search_with_artifacts`](Self::search_with_artifacts), passing
    /// `correlation_id` on to the artifact service.
    pub async fn search_with_artifacts_correlated(
        &self,
        query: &str,
        top_k: usize,
        correlation_id: &str,
    ) -> Result<Vec<SearchHit>> {
        let mut hits = self.search(query, top_k).await?;

        for hit in hits.iter_mut() {
            let artifacts = match self
                .artifacts
                .artifacts(&hit.metadata.id, correlation_id)
                .await
            {
                Ok(artifacts) => artifacts,
                Err(e) => {
                    tracing::warn!(
                        external_id = %hit.metadata.id,
                        correlation_id,
                        error = %e,
                        "artifact lookup failed, returning hit without artifacts"
                    );
                    Vec::new()
                }
            };
            hit.artifact = Some(artifacts);
        }

        Ok(hits)
    }

    /// Whether a record with this registrar id is already indexed.
    pub async fn contains(&self, external_id: &str) -> Result<bool> {
        self.store.contains_external_id(external_id).await
    }

    pub async fn len(&self) -> Result<usize> {
        self.store.count().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
