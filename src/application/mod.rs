//! Application layer - chat and transcription use cases.
//!
//! Services here orchestrate retrieval, generation and transcription through
//! the domain ports; concrete adapters are injected at startup.

pub mod services;

pub use services::{
    AudioUpload, ChatService, HybridRetriever, KnowledgeBaseService, ParameterSelector,
    SttService,
};
