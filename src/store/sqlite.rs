//! SQLite-backed [`VectorStore`] used when `database.persist = true`.
//!
//! Vectors are stored as little-endian `f32` BLOBs in the `records` table;
//! queries load the collection's vectors and rank them by cosine similarity.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::{rank, VectorMatch, VectorRecord, VectorStore};
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};

pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, collection: &str) -> Self {
        Self {
            pool,
            collection: collection.to_string(),
        }
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn add(&self, record: &VectorRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO records (id, collection, external_id, name, document, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&self.collection)
        .bind(&record.external_id)
        .bind(&record.name)
        .bind(&record.document)
        .bind(vec_to_blob(&record.vector))
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorMatch>> {
        let rows = sqlx::query(
            r#"
            SELECT id, external_id, name, document, embedding
            FROM records
            WHERE collection = ?
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let matches = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                VectorMatch {
                    id: row.get("id"),
                    external_id: row.get("external_id"),
                    name: row.get("name"),
                    document: row.get("document"),
                    score: cosine_similarity(vector, &blob_to_vec(&blob)) as f64,
                }
            })
            .collect();

        Ok(rank(matches, limit))
    }

    async fn contains_external_id(&self, external_id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM records WHERE collection = ? AND external_id = ?",
        )
        .bind(&self.collection)
        .bind(external_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
