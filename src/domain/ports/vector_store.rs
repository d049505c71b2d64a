use crate::domain::{errors::DomainError, Embedding, Passage, SearchResult};
use async_trait::async_trait;

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, passage: &Passage, embedding: &Embedding) -> Result<(), DomainError>;
    /// Top `top_k` passages by similarity, best first.
    async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError>;
    async fn delete_by_source(&self, source: &str) -> Result<(), DomainError>;
    async fn count(&self) -> Result<usize, DomainError>;
}
