use serde::{Deserialize, Serialize};

/// Audio handed to the transcription provider after validation.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub data: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct TranscriptionOptions {
    pub language: Option<String>,
    pub prompt: Option<String>,
}

/// What the transcription provider returned, before post-processing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawTranscript {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TranscriptSegment {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub avg_logprob: Option<f64>,
}

impl RawTranscript {
    /// Mean of `clamp(avg_logprob + 1, 0, 1)` over segments that report one.
    pub fn confidence(&self) -> Option<f64> {
        let scores: Vec<f64> = self
            .segments
            .iter()
            .filter_map(|s| s.avg_logprob)
            .map(|p| (p + 1.0).clamp(0.0, 1.0))
            .collect();

        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub original_text: String,
    pub language: Option<String>,
    pub confidence: Option<f64>,
    pub duration: Option<f64>,
    pub filename: Option<String>,
    pub word_count: usize,
    pub processing_time: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_averages_clamped_logprobs() {
        let raw = RawTranscript {
            text: "hello".into(),
            segments: vec![
                TranscriptSegment {
                    text: "a".into(),
                    avg_logprob: Some(-0.2),
                },
                TranscriptSegment {
                    text: "b".into(),
                    avg_logprob: Some(-1.5),
                },
                TranscriptSegment {
                    text: "c".into(),
                    avg_logprob: None,
                },
            ],
            ..Default::default()
        };

        let confidence = raw.confidence().unwrap();
        assert!((confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_none_without_segments() {
        let raw: RawTranscript = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(raw.confidence(), None);
    }
}
