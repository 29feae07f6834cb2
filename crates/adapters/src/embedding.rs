//! Null implementations for deployments without an embedding model or
//! vector database. Pattern matching stays literal.

use async_trait::async_trait;

use siphon_core::ExtractError;

use crate::{EmbeddingProvider, VectorHit, VectorStore};

pub struct NullEmbedding;

#[async_trait]
impl EmbeddingProvider for NullEmbedding {
    fn available(&self) -> bool {
        false
    }

    fn dimensions(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ExtractError> {
        Err(ExtractError::Config("no embedding provider configured".into()))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ExtractError> {
        Err(ExtractError::Config("no embedding provider configured".into()))
    }
}

pub struct NullVectorStore;

#[async_trait]
impl VectorStore for NullVectorStore {
    async fn search(
        &self,
        _vector: &[f32],
        _filter: Option<&str>,
        _limit: usize,
        _min_score: f32,
    ) -> Result<Vec<VectorHit>, ExtractError> {
        Ok(Vec::new())
    }

    async fn upsert(
        &self,
        _id: &str,
        _vector: &[f32],
        _meta: serde_json::Value,
    ) -> Result<(), ExtractError> {
        Ok(())
    }
}
