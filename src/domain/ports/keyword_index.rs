use crate::domain::{errors::DomainError, Passage, SearchResult};
use async_trait::async_trait;

#[async_trait]
pub trait KeywordIndex: Send + Sync {
    async fn index(&self, passages: &[Passage]) -> Result<(), DomainError>;
    /// Top `top_k` passages by lexical relevance, best first. Passages with no
    /// matching term are not returned.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>, DomainError>;
    async fn delete_by_source(&self, source: &str) -> Result<(), DomainError>;
    async fn count(&self) -> Result<usize, DomainError>;
}
