use async_trait::async_trait;
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, NumericOptions, Schema, TextFieldIndexing, TextOptions, Value,
    STORED, STRING,
};
use tantivy::tokenizer::{LowerCaser, RegexTokenizer, TextAnalyzer, TokenStream};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use crate::domain::{ports::KeywordIndex, DomainError, Passage, SearchResult};

const TOKENIZER: &str = "passage";
const WRITER_MEMORY_BYTES: usize = 20_000_000;

#[derive(Clone, Copy)]
struct Fields {
    passage_id: Field,
    source: Field,
    chunk_index: Field,
    text: Field,
}

/// BM25 keyword index over an in-RAM tantivy index.
pub struct Bm25Index {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: Fields,
}

fn index_error(e: impl std::fmt::Display) -> DomainError {
    DomainError::internal(format!("keyword index: {e}"))
}

impl Bm25Index {
    pub fn new() -> Result<Self, DomainError> {
        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(TOKENIZER)
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let mut builder = Schema::builder();
        let fields = Fields {
            passage_id: builder.add_text_field("passage_id", STRING | STORED),
            source: builder.add_text_field("source", STRING | STORED),
            chunk_index: builder.add_u64_field("chunk_index", NumericOptions::default().set_stored()),
            text: builder.add_text_field("text", text_options),
        };

        let index = Index::create_in_ram(builder.build());
        let analyzer = TextAnalyzer::builder(
            RegexTokenizer::new(r"[\p{L}\p{M}\p{N}]+").map_err(index_error)?,
        )
        .filter(LowerCaser)
        .build();
        index.tokenizers().register(TOKENIZER, analyzer);

        let writer = index
            .writer_with_num_threads(1, WRITER_MEMORY_BYTES)
            .map_err(index_error)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(index_error)?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
        })
    }

    fn write<F>(&self, apply: F) -> Result<(), DomainError>
    where
        F: FnOnce(&mut IndexWriter, Fields) -> Result<(), DomainError>,
    {
        let mut writer = self.writer.lock().map_err(index_error)?;
        apply(&mut writer, self.fields)?;
        writer.commit().map_err(index_error)?;
        self.reader.reload().map_err(index_error)
    }

    fn query_terms(&self, query: &str) -> Result<Vec<Term>, DomainError> {
        let mut analyzer = self
            .index
            .tokenizer_for_field(self.fields.text)
            .map_err(index_error)?;

        let mut words: Vec<String> = Vec::new();
        let mut stream = analyzer.token_stream(query);
        stream.process(&mut |token| words.push(token.text.clone()));
        words.sort();
        words.dedup();

        Ok(words
            .iter()
            .map(|w| Term::from_field_text(self.fields.text, w))
            .collect())
    }

    fn to_passage(&self, doc: &TantivyDocument) -> Passage {
        let text_of = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(String::from)
        };

        Passage {
            id: text_of(self.fields.passage_id).unwrap_or_default(),
            text: text_of(self.fields.text).unwrap_or_default(),
            source: text_of(self.fields.source),
            chunk_index: doc
                .get_first(self.fields.chunk_index)
                .and_then(|v| v.as_u64())
                .unwrap_or_default() as usize,
        }
    }
}

#[async_trait]
impl KeywordIndex for Bm25Index {
    async fn index(&self, passages: &[Passage]) -> Result<(), DomainError> {
        if passages.is_empty() {
            return Ok(());
        }

        self.write(|writer, fields| {
            for passage in passages {
                writer.delete_term(Term::from_field_text(fields.passage_id, &passage.id));

                let mut doc = TantivyDocument::default();
                doc.add_text(fields.passage_id, &passage.id);
                if let Some(source) = &passage.source {
                    doc.add_text(fields.source, source);
                }
                doc.add_u64(fields.chunk_index, passage.chunk_index as u64);
                doc.add_text(fields.text, &passage.text);
                writer.add_document(doc).map_err(index_error)?;
            }
            Ok(())
        })
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>, DomainError> {
        let terms = self.query_terms(query)?;
        if terms.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .into_iter()
            .map(|term| {
                let q: Box<dyn Query> = Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, q)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let hits = searcher
            .search(&query, &TopDocs::with_limit(top_k))
            .map_err(index_error)?;

        hits.into_iter()
            .filter(|(score, _)| *score > 0.0)
            .map(|(score, address)| {
                let doc: TantivyDocument = searcher.doc(address).map_err(index_error)?;
                Ok(SearchResult::new(self.to_passage(&doc), score))
            })
            .collect()
    }

    async fn delete_by_source(&self, source: &str) -> Result<(), DomainError> {
        self.write(|writer, fields| {
            writer.delete_term(Term::from_field_text(fields.source, source));
            Ok(())
        })
    }

    async fn count(&self) -> Result<usize, DomainError> {
        Ok(self.reader.searcher().num_docs() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Passage> {
        vec![
            Passage::new("myopia.md", "Myopia, or nearsightedness, blurs distant objects.", 0),
            Passage::new("glaucoma.md", "Glaucoma damages the optic nerve, often through raised eye pressure.", 0),
            Passage::new("exam.md", "A routine eye exam checks visual acuity and eye pressure.", 0),
        ]
    }

    async fn seeded() -> Bm25Index {
        let index = Bm25Index::new().unwrap();
        index.index(&corpus()).await.unwrap();
        index
    }

    #[tokio::test]
    async fn test_search_ranks_matching_passage_first() {
        let index = seeded().await;

        let results = index.search("what is myopia?", 3).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].passage.id, "myopia.md#0");
        assert_eq!(results[0].passage.source.as_deref(), Some("myopia.md"));
        assert!(results[0].score > 0.0);
    }

    #[tokio::test]
    async fn test_rarer_term_scores_higher() {
        let index = seeded().await;

        let results = index.search("optic pressure", 3).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].passage.id, "glaucoma.md#0");
    }

    #[tokio::test]
    async fn test_reindexing_replaces_passage() {
        let index = seeded().await;
        index
            .index(&[Passage::new("myopia.md", "Short sight correction with lenses.", 0)])
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 3);
        assert!(index.search("nearsightedness", 3).await.unwrap().is_empty());
        assert_eq!(index.search("lenses", 3).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_source_drops_every_chunk() {
        let index = seeded().await;
        index
            .index(&[Passage::new("myopia.md", "Myopia often starts in childhood.", 1)])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 4);

        index.delete_by_source("myopia.md").await.unwrap();

        assert_eq!(index.count().await.unwrap(), 2);
        assert!(index.search("myopia", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_thai_words_keep_vowel_marks() {
        let index = Bm25Index::new().unwrap();
        index
            .index(&[Passage::new("th.md", "ตรวจ สายตา ประจำปี", 0)])
            .await
            .unwrap();

        let results = index.search("สายตา", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].passage.chunk_index, 0);
    }

    #[tokio::test]
    async fn test_empty_index_and_blank_query_return_nothing() {
        let index = Bm25Index::new().unwrap();
        assert!(index.search("myopia", 5).await.unwrap().is_empty());

        let index = seeded().await;
        assert!(index.search("?!", 5).await.unwrap().is_empty());
    }
}
