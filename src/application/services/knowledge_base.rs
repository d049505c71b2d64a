use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

use super::retrieval::HybridRetriever;
use crate::domain::{chunk_content, DomainError};
use crate::infrastructure::config::KnowledgeBaseConfig;

const EXTENSIONS: &[&str] = &["md", "txt"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub files: usize,
    pub passages: usize,
    pub skipped: Vec<String>,
}

pub struct KnowledgeBaseService {
    retriever: Arc<HybridRetriever>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl KnowledgeBaseService {
    pub fn new(retriever: Arc<HybridRetriever>) -> Self {
        Self {
            retriever,
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }

    pub fn from_config(retriever: Arc<HybridRetriever>, config: &KnowledgeBaseConfig) -> Self {
        Self {
            retriever,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }

    /// Replaces anything previously loaded under `source`.
    #[instrument(skip(self, content))]
    pub async fn ingest(&self, source: &str, content: &str) -> Result<usize, DomainError> {
        if let Err(e) = self.retriever.remove_source(source).await {
            tracing::warn!(error = %e, "could not clear previous passages");
        }

        let passages = chunk_content(source, content, self.chunk_size, self.chunk_overlap);
        if passages.is_empty() {
            return Ok(0);
        }

        self.retriever.index_passages(&passages).await?;
        Ok(passages.len())
    }

    /// A missing directory is not an error.
    #[instrument(skip(self))]
    pub async fn load_dir(&self, dir: &Path) -> Result<LoadReport, DomainError> {
        let mut report = LoadReport::default();

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %dir.display(), "knowledge base directory not found, indices stay empty");
                return Ok(report);
            }
            Err(e) => return Err(DomainError::internal(format!("read {}: {e}", dir.display()))),
        };

        let mut files: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DomainError::internal(e.to_string()))?
        {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file && has_knowledge_extension(&path) {
                files.push(path);
            }
        }
        files.sort();

        for path in files {
            let source = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(file = %source, error = %e, "skipping unreadable file");
                    report.skipped.push(source);
                    continue;
                }
            };

            let count = self.ingest(&source, &content).await?;
            tracing::debug!(file = %source, passages = count, "file indexed");
            report.files += 1;
            report.passages += count;
        }

        tracing::info!(
            files = report.files,
            passages = report.passages,
            skipped = report.skipped.len(),
            "knowledge base loaded"
        );
        Ok(report)
    }
}

fn has_knowledge_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ports::EmbeddingService, Embedding};
    use crate::infrastructure::{Bm25Index, InMemoryVectorStore};
    use async_trait::async_trait;

    struct TopicEmbedding;

    fn topic_vector(text: &str) -> Embedding {
        let lower = text.to_lowercase();
        Embedding::new(vec![
            lower.contains("glaucoma") as u8 as f32,
            lower.contains("myopia") as u8 as f32,
            0.1,
        ])
    }

    #[async_trait]
    impl EmbeddingService for TopicEmbedding {
        async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
            Ok(topic_vector(text))
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
            Ok(texts.iter().map(|t| topic_vector(t)).collect())
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    fn retriever() -> Arc<HybridRetriever> {
        Arc::new(HybridRetriever::new(
            Arc::new(TopicEmbedding),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(Bm25Index::new().unwrap()),
        ))
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("eyeqcheck-kb-{name}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_load_dir_indexes_markdown_and_text() {
        let dir = scratch_dir("load");
        std::fs::write(dir.join("myopia.md"), "Myopia is nearsightedness.\n\nIt is common.").unwrap();
        std::fs::write(dir.join("glaucoma.txt"), "Glaucoma damages the optic nerve.").unwrap();
        std::fs::write(dir.join("notes.pdf"), "ignored").unwrap();

        let retriever = retriever();
        let kb = KnowledgeBaseService::new(retriever.clone());
        let report = kb.load_dir(&dir).await.unwrap();

        assert_eq!(report.files, 2);
        assert_eq!(report.passages, 2);
        assert_eq!(retriever.counts().await, (Some(2), Some(2)));

        let found = retriever.retrieve("glaucoma optic nerve", 1).await.unwrap();
        assert_eq!(found.passage_ids(), vec!["glaucoma.txt#0".to_string()]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_missing_directory_leaves_indices_empty() {
        let retriever = retriever();
        let kb = KnowledgeBaseService::new(retriever.clone());

        let report = kb
            .load_dir(Path::new("/nonexistent/eyeqcheck/knowledge"))
            .await
            .unwrap();

        assert_eq!(report, LoadReport::default());
        assert_eq!(retriever.counts().await, (Some(0), Some(0)));
    }

    #[tokio::test]
    async fn test_reingest_replaces_source_in_both_indices() {
        let retriever = retriever();
        let kb = KnowledgeBaseService::from_config(
            retriever.clone(),
            &KnowledgeBaseConfig {
                chunk_size: 25,
                chunk_overlap: 0,
                ..KnowledgeBaseConfig::default()
            },
        );

        let first = kb
            .ingest("cornea.md", "The cornea is clear.\n\nIt focuses light.")
            .await
            .unwrap();
        assert_eq!(first, 2);

        let second = kb.ingest("cornea.md", "The cornea is clear.").await.unwrap();

        assert_eq!(second, 1);
        assert_eq!(retriever.counts().await, (Some(1), Some(1)));
        let found = retriever.retrieve("focuses light", 4).await.unwrap();
        assert_eq!(found.passage_ids(), vec!["cornea.md#0".to_string()]);
    }
}
