mod chat;
mod context;
mod knowledge_base;
mod parameters;
mod retrieval;
mod single_flight;
mod stt;

pub use chat::ChatService;
pub use context::{format_context, CONTEXT_DELIMITER};
pub use knowledge_base::{KnowledgeBaseService, LoadReport};
pub use parameters::ParameterSelector;
pub use retrieval::{merge_rankings, EnsembleWeights, HybridRetriever};
pub use single_flight::{Flight, SingleFlight};
pub use stt::{AudioUpload, FormatGuide, SttHealth, SttService, SUPPORTED_FORMATS};
