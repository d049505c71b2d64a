use async_trait::async_trait;
use std::sync::RwLock;

use crate::domain::{ports::VectorStore, DomainError, Embedding, Passage, SearchResult};

/// Brute-force cosine index for tests and local runs without Qdrant.
pub struct InMemoryVectorStore {
    passages: RwLock<Vec<(Passage, Embedding)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            passages: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, passage: &Passage, embedding: &Embedding) -> Result<(), DomainError> {
        let mut store = self
            .passages
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        store.retain(|(p, _)| p.id != passage.id);
        store.push((passage.clone(), embedding.clone()));
        Ok(())
    }

    async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let store = self
            .passages
            .read()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        let mut results: Vec<SearchResult> = store
            .iter()
            .map(|(passage, embedding)| {
                SearchResult::new(passage.clone(), query.cosine_similarity(embedding))
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);

        Ok(results)
    }

    async fn delete_by_source(&self, source: &str) -> Result<(), DomainError> {
        let mut store = self
            .passages
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        store.retain(|(passage, _)| passage.source.as_deref() != Some(source));
        Ok(())
    }

    async fn count(&self) -> Result<usize, DomainError> {
        self.passages
            .read()
            .map(|store| store.len())
            .map_err(|e| DomainError::internal(e.to_string()))
    }
}
