mod conversation;
mod embedding;
mod generation;
mod passage;
mod transcript;

pub use conversation::{Conversation, Message, MessageRole};
pub use embedding::Embedding;
pub use generation::{ChatReply, Generation, GenerationParameters, ResponseFormat, TokenUsage};
pub use passage::{chunk_content, IndexKind, Passage, RetrievalResult, SearchResult};
pub use transcript::{AudioClip, RawTranscript, Transcript, TranscriptSegment, TranscriptionOptions};
