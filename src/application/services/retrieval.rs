use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::domain::{
    ports::{EmbeddingService, KeywordIndex, VectorStore},
    DomainError, IndexKind, Passage, RetrievalResult, SearchResult,
};
use crate::infrastructure::config::RetrievalConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleWeights {
    pub vector: f32,
    pub keyword: f32,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            vector: 0.5,
            keyword: 0.5,
        }
    }
}

/// Vector + keyword ensemble over the knowledge base.
pub struct HybridRetriever {
    embedding: Arc<dyn EmbeddingService>,
    vector_store: Arc<dyn VectorStore>,
    keyword_index: Arc<dyn KeywordIndex>,
    weights: EnsembleWeights,
    candidate_multiplier: usize,
    timeout: Duration,
}

impl HybridRetriever {
    pub fn new(
        embedding: Arc<dyn EmbeddingService>,
        vector_store: Arc<dyn VectorStore>,
        keyword_index: Arc<dyn KeywordIndex>,
    ) -> Self {
        Self {
            embedding,
            vector_store,
            keyword_index,
            weights: EnsembleWeights::default(),
            candidate_multiplier: 2,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(
        embedding: Arc<dyn EmbeddingService>,
        vector_store: Arc<dyn VectorStore>,
        keyword_index: Arc<dyn KeywordIndex>,
        config: &RetrievalConfig,
    ) -> Self {
        Self::new(embedding, vector_store, keyword_index)
            .with_weights(EnsembleWeights {
                vector: config.vector_weight,
                keyword: config.keyword_weight,
            })
            .with_candidate_multiplier(config.candidate_multiplier)
            .with_timeout(Duration::from_secs(config.timeout_seconds))
    }

    pub fn with_weights(mut self, weights: EnsembleWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_candidate_multiplier(mut self, multiplier: usize) -> Self {
        self.candidate_multiplier = multiplier.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Top `max_docs` passages for `query`, merged from both indices.
    ///
    /// One failing index degrades to the other; both failing is
    /// `RetrievalUnavailable`.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn retrieve(
        &self,
        query: &str,
        max_docs: usize,
    ) -> Result<RetrievalResult, DomainError> {
        let max_docs = max_docs.max(1);
        let candidates = max_docs * self.candidate_multiplier;

        let (vector, keyword) = tokio::join!(
            self.vector_candidates(query, candidates),
            self.keyword_candidates(query, candidates),
        );

        let (results, degraded) = match (vector, keyword) {
            (Ok(v), Ok(k)) => (merge_rankings(&v, &k, self.weights, max_docs), None),
            (Ok(v), Err(e)) => {
                tracing::warn!(error = %e, "RetrievalDegraded: keyword index unavailable, using vector results only");
                (merge_rankings(&v, &[], self.weights, max_docs), Some(IndexKind::Keyword))
            }
            (Err(e), Ok(k)) => {
                tracing::warn!(error = %e, "RetrievalDegraded: vector index unavailable, using keyword results only");
                (merge_rankings(&[], &k, self.weights, max_docs), Some(IndexKind::Vector))
            }
            (Err(ve), Err(ke)) => {
                tracing::error!(vector_error = %ve, keyword_error = %ke, "both indices unavailable");
                return Err(DomainError::retrieval_unavailable(format!(
                    "vector index: {ve}; keyword index: {ke}"
                )));
            }
        };

        tracing::debug!(returned = results.len(), degraded = ?degraded, "hybrid retrieval done");
        Ok(RetrievalResult { results, degraded })
    }

    async fn vector_candidates(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let search = async {
            let embedding = self.embedding.embed(query).await?;
            self.vector_store.search(&embedding, top_k).await
        };
        tokio::time::timeout(self.timeout, search)
            .await
            .map_err(|_| DomainError::timeout("vector search timed out"))?
    }

    async fn keyword_candidates(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        tokio::time::timeout(self.timeout, self.keyword_index.search(query, top_k))
            .await
            .map_err(|_| DomainError::timeout("keyword search timed out"))?
    }

    #[instrument(skip(self, passages), fields(count = passages.len()))]
    pub async fn index_passages(&self, passages: &[Passage]) -> Result<(), DomainError> {
        if passages.is_empty() {
            return Ok(());
        }

        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        let embeddings = self.embedding.embed_batch(&texts).await?;
        if embeddings.len() != passages.len() {
            return Err(DomainError::internal(format!(
                "expected {} embeddings, got {}",
                passages.len(),
                embeddings.len()
            )));
        }

        for (passage, embedding) in passages.iter().zip(embeddings.iter()) {
            self.vector_store.upsert(passage, embedding).await?;
        }
        self.keyword_index.index(passages).await
    }

    /// Both deletes run even when one fails.
    pub async fn remove_source(&self, source: &str) -> Result<(), DomainError> {
        let (vector, keyword) = tokio::join!(
            self.vector_store.delete_by_source(source),
            self.keyword_index.delete_by_source(source),
        );
        vector.and(keyword)
    }

    pub async fn counts(&self) -> (Option<usize>, Option<usize>) {
        let (vector, keyword) = tokio::join!(self.vector_store.count(), self.keyword_index.count());
        (vector.ok(), keyword.ok())
    }
}

struct Candidate {
    passage: Passage,
    vector: f32,
    keyword: f32,
}

/// Weighted sum of min-max normalised scores. A passage missing from one
/// list scores 0 there.
pub fn merge_rankings(
    vector: &[SearchResult],
    keyword: &[SearchResult],
    weights: EnsembleWeights,
    max_docs: usize,
) -> Vec<SearchResult> {
    let mut order: Vec<Candidate> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for (passage, score) in normalize(vector) {
        let idx = *position.entry(passage.id.clone()).or_insert_with(|| {
            order.push(Candidate {
                passage: passage.clone(),
                vector: 0.0,
                keyword: 0.0,
            });
            order.len() - 1
        });
        order[idx].vector = order[idx].vector.max(score);
    }

    for (passage, score) in normalize(keyword) {
        let idx = *position.entry(passage.id.clone()).or_insert_with(|| {
            order.push(Candidate {
                passage: passage.clone(),
                vector: 0.0,
                keyword: 0.0,
            });
            order.len() - 1
        });
        order[idx].keyword = order[idx].keyword.max(score);
    }

    let mut merged: Vec<SearchResult> = order
        .into_iter()
        .map(|c| {
            let combined = weights.vector * c.vector + weights.keyword * c.keyword;
            SearchResult::new(c.passage, combined)
        })
        .collect();

    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(max_docs);
    merged
}

fn normalize(results: &[SearchResult]) -> Vec<(&Passage, f32)> {
    if results.is_empty() {
        return Vec::new();
    }

    let min = results.iter().map(|r| r.score).fold(f32::INFINITY, f32::min);
    let max = results.iter().map(|r| r.score).fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    results
        .iter()
        .map(|r| {
            let norm = if range.abs() < f32::EPSILON {
                1.0
            } else {
                (r.score - min) / range
            };
            (&r.passage, norm)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Embedding;
    use crate::infrastructure::{Bm25Index, InMemoryVectorStore};
    use async_trait::async_trait;
    use std::collections::HashSet;

    fn hit(id: &str, score: f32) -> SearchResult {
        SearchResult::new(Passage::new(id, format!("text of {id}"), 0), score)
    }

    fn ids(results: &[SearchResult]) -> Vec<String> {
        results.iter().map(|r| r.passage.id.clone()).collect()
    }

    /// Maps a few known words onto fixed axes.
    struct KeywordEmbedding;

    #[async_trait]
    impl EmbeddingService for KeywordEmbedding {
        async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
            let lower = text.to_lowercase();
            Ok(Embedding::new(vec![
                lower.contains("myopia") as u8 as f32,
                lower.contains("glaucoma") as u8 as f32,
                lower.contains("cataract") as u8 as f32,
                0.1,
            ]))
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    struct BrokenEmbedding;

    #[async_trait]
    impl EmbeddingService for BrokenEmbedding {
        async fn embed(&self, _text: &str) -> Result<Embedding, DomainError> {
            Err(DomainError::external("embedding API down"))
        }

        async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
            Err(DomainError::external("embedding API down"))
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    struct BrokenKeywordIndex;

    #[async_trait]
    impl KeywordIndex for BrokenKeywordIndex {
        async fn index(&self, _passages: &[Passage]) -> Result<(), DomainError> {
            Err(DomainError::external("keyword index down"))
        }

        async fn search(&self, _q: &str, _k: usize) -> Result<Vec<SearchResult>, DomainError> {
            Err(DomainError::external("keyword index down"))
        }

        async fn delete_by_source(&self, _source: &str) -> Result<(), DomainError> {
            Err(DomainError::external("keyword index down"))
        }

        async fn count(&self) -> Result<usize, DomainError> {
            Err(DomainError::external("keyword index down"))
        }
    }

    fn corpus() -> Vec<Passage> {
        vec![
            Passage::new("myopia.md", "Myopia makes distant objects blurry.", 0),
            Passage::new("myopia.md", "Myopia is corrected with concave lenses.", 1),
            Passage::new("glaucoma.md", "Glaucoma damages the optic nerve.", 0),
            Passage::new("cataract.md", "A cataract clouds the lens of the eye.", 0),
        ]
    }

    async fn seeded(
        embedding: Arc<dyn EmbeddingService>,
        keyword: Arc<dyn KeywordIndex>,
    ) -> HybridRetriever {
        let vector_store = Arc::new(InMemoryVectorStore::new());
        for passage in corpus() {
            let embedding = KeywordEmbedding.embed(&passage.text).await.unwrap();
            vector_store.upsert(&passage, &embedding).await.unwrap();
        }
        keyword.index(&corpus()).await.ok();

        HybridRetriever::new(embedding, vector_store, keyword)
    }

    #[test]
    fn test_merge_dedups_passages_present_in_both() {
        let vector = vec![hit("a", 0.9), hit("b", 0.5), hit("c", 0.1)];
        let keyword = vec![hit("b", 7.0), hit("d", 3.0), hit("a", 1.0)];

        let merged = merge_rankings(&vector, &keyword, EnsembleWeights::default(), 10);

        let unique: HashSet<_> = ids(&merged).into_iter().collect();
        assert_eq!(unique.len(), merged.len());
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn test_merge_dedups_within_one_list() {
        let vector = vec![hit("a", 0.9), hit("a", 0.2), hit("b", 0.1)];
        let merged = merge_rankings(&vector, &[], EnsembleWeights::default(), 10);

        assert_eq!(ids(&merged), vec!["a#0", "b#0"]);
    }

    #[test]
    fn test_merge_weights_and_missing_source_contribution() {
        let vector = vec![hit("a", 1.0), hit("b", 0.0)];
        let keyword = vec![hit("b", 5.0), hit("c", 0.0)];

        let merged = merge_rankings(
            &vector,
            &keyword,
            EnsembleWeights {
                vector: 0.25,
                keyword: 0.75,
            },
            10,
        );

        assert_eq!(ids(&merged), vec!["b#0", "a#0", "c#0"]);
        assert!((merged[0].score - 0.75).abs() < 1e-6);
        assert!((merged[1].score - 0.25).abs() < 1e-6);
        assert_eq!(merged[2].score, 0.0);
    }

    #[test]
    fn test_merge_ties_keep_vector_order() {
        let vector = vec![hit("x", 0.4), hit("y", 0.4)];
        let keyword = vec![hit("z", 2.0)];

        let merged = merge_rankings(&vector, &keyword, EnsembleWeights::default(), 10);

        assert_eq!(ids(&merged), vec!["x#0", "y#0", "z#0"]);
    }

    #[test]
    fn test_merge_truncates_to_max_docs() {
        let vector: Vec<_> = (0..8).map(|i| hit(&format!("p{i}"), 1.0 - i as f32 * 0.1)).collect();
        let merged = merge_rankings(&vector, &[], EnsembleWeights::default(), 3);
        assert_eq!(ids(&merged), vec!["p0#0", "p1#0", "p2#0"]);
    }

    #[test]
    fn test_merge_is_monotonic_in_vector_score() {
        let keyword = vec![hit("target", 1.0), hit("b", 4.0), hit("c", 2.0)];
        let rank_of = |vector_score: f32| {
            let vector = vec![hit("a", 0.6), hit("b", 0.5), hit("target", vector_score), hit("c", 0.2)];
            let merged = merge_rankings(&vector, &keyword, EnsembleWeights::default(), 10);
            merged.iter().position(|r| r.passage.id == "target#0").unwrap()
        };

        let mut previous = rank_of(0.0);
        for step in 1..=20 {
            let rank = rank_of(step as f32 * 0.05);
            assert!(rank <= previous, "rank worsened at step {step}: {previous} -> {rank}");
            previous = rank;
        }
        assert!(previous < rank_of(0.0));
    }

    #[tokio::test]
    async fn test_retrieve_combines_both_indices() {
        let retriever = seeded(Arc::new(KeywordEmbedding), Arc::new(Bm25Index::new().unwrap())).await;

        let result = retriever.retrieve("What is myopia?", 2).await.unwrap();

        assert_eq!(result.len(), 2);
        assert!(result.degraded.is_none());
        assert!(result.results.iter().all(|r| r.passage.source.as_deref() == Some("myopia.md")));
    }

    #[tokio::test]
    async fn test_retrieve_degrades_when_vector_side_fails() {
        let retriever = seeded(Arc::new(BrokenEmbedding), Arc::new(Bm25Index::new().unwrap())).await;

        let result = retriever.retrieve("glaucoma optic nerve", 3).await.unwrap();

        assert_eq!(result.degraded, Some(IndexKind::Vector));
        assert_eq!(result.results[0].passage.id, "glaucoma.md#0");
    }

    #[tokio::test]
    async fn test_retrieve_degrades_when_keyword_side_fails() {
        let retriever = seeded(Arc::new(KeywordEmbedding), Arc::new(BrokenKeywordIndex)).await;

        let result = retriever.retrieve("cataract", 1).await.unwrap();

        assert_eq!(result.degraded, Some(IndexKind::Keyword));
        assert_eq!(result.results[0].passage.id, "cataract.md#0");
    }

    #[tokio::test]
    async fn test_retrieve_fails_when_both_sides_fail() {
        let retriever = seeded(Arc::new(BrokenEmbedding), Arc::new(BrokenKeywordIndex)).await;

        let err = retriever.retrieve("myopia", 2).await.unwrap_err();

        assert!(matches!(err, DomainError::RetrievalUnavailable(_)));
    }

    #[tokio::test]
    async fn test_index_passages_feeds_both_indices() {
        let vector_store = Arc::new(InMemoryVectorStore::new());
        let keyword = Arc::new(Bm25Index::new().unwrap());
        let retriever = HybridRetriever::new(Arc::new(KeywordEmbedding), vector_store, keyword);

        retriever.index_passages(&corpus()).await.unwrap();

        assert_eq!(retriever.counts().await, (Some(4), Some(4)));
    }
}
