mod embedding;
mod keyword_index;
mod llm;
mod transcription;
mod vector_store;

pub use embedding::EmbeddingService;
pub use keyword_index::KeywordIndex;
pub use llm::LlmService;
pub use transcription::TranscriptionService;
pub use vector_store::VectorStore;
