mod whisper;

pub use whisper::WhisperTranscription;
