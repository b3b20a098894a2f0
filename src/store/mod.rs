//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the boundary to the similarity index: it
//! ingests a record (text, metadata, vector) and returns nearest neighbours
//! for a query vector. Two backends ship with the crate:
//!
//! | Backend | Selected when |
//! |---------|---------------|
//! | [`memory::InMemoryStore`] | `database.persist = false` |
//! | [`sqlite::SqliteStore`] | `database.persist = true` |
//!
//! Each store instance is bound to one collection. Duplicate inserts are
//! harmless: every record carries its own generated id.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::db;

/// A record as stored in the index.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Generated record key (UUID v4).
    pub id: String,
    /// Registrar id of the data product.
    pub external_id: String,
    pub name: String,
    /// The indexed text.
    pub document: String,
    pub vector: Vec<f32>,
    /// Unix timestamp (seconds) of insertion.
    pub created_at: i64,
}

/// A record returned by [`VectorStore::query`] with its similarity score.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub document: String,
    /// Cosine similarity against the query vector.
    pub score: f64,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Collection this store reads and writes.
    fn collection(&self) -> &str;

    /// Stores a record.
    async fn add(&self, record: &VectorRecord) -> Result<()>;

    /// Up to `limit` records, nearest first. Empty store yields an empty vector.
    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorMatch>>;

    /// Whether any record with this registrar id exists.
    async fn contains_external_id(&self, external_id: &str) -> Result<bool>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize>;
}

/// Opens the backend selected by `config.persist`.
pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn VectorStore>> {
    if config.persist {
        let pool = db::connect(&config.db_location).await?;
        db::run_migrations(&pool).await?;
        Ok(Arc::new(sqlite::SqliteStore::new(
            pool,
            &config.collection_name,
        )))
    } else {
        Ok(Arc::new(memory::InMemoryStore::new(&config.collection_name)))
    }
}

/// Sorts matches by descending score and keeps the first `limit`.
pub(crate) fn rank(mut matches: Vec<VectorMatch>, limit: usize) -> Vec<VectorMatch> {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(limit);
    matches
}
