pub mod config;
pub mod embedding;
pub mod keyword_index;
pub mod llm;
pub mod telemetry;
pub mod transcription;
pub mod vector_store;

pub use config::{AppConfig, Config, PromptsConfig};
pub use embedding::TextEmbedding;
pub use keyword_index::Bm25Index;
pub use llm::{build_llm, AnthropicLlm, OpenAiLlm};
pub use transcription::WhisperTranscription;
pub use vector_store::{InMemoryVectorStore, QdrantVectorStore};
