//! In-memory [`VectorStore`] used when persistence is off.
//!
//! A `Vec` behind `std::sync::RwLock`; search is brute-force cosine
//! similarity over all stored vectors. Contents are lost on restart.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::{rank, VectorMatch, VectorRecord, VectorStore};
use crate::embedding::cosine_similarity;

pub struct InMemoryStore {
    collection: String,
    records: RwLock<Vec<VectorRecord>>,
}

impl InMemoryStore {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            records: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn add(&self, record: &VectorRecord) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.push(record.clone());
        Ok(())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorMatch>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let matches = records
            .iter()
            .map(|r| VectorMatch {
                id: r.id.clone(),
                external_id: r.external_id.clone(),
                name: r.name.clone(),
                document: r.document.clone(),
                score: cosine_similarity(vector, &r.vector) as f64,
            })
            .collect();
        Ok(rank(matches, limit))
    }

    async fn contains_external_id(&self, external_id: &str) -> Result<bool> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.iter().any(|r| r.external_id == external_id))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().unwrap_or_else(|e| e.into_inner()).len())
    }
}
