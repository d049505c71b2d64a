use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    FreeText,
    StructuredJson,
}

/// Sampling settings for one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
}

impl GenerationParameters {
    pub fn new(temperature: f32, max_tokens: u32, response_format: ResponseFormat) -> Self {
        Self {
            temperature,
            max_tokens,
            response_format,
        }
    }

    /// Applies caller overrides, clamping to `[0, 1]` and `[1, ceiling]`.
    pub fn with_overrides(
        mut self,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
        ceiling: u32,
    ) -> Self {
        if let Some(max_tokens) = max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(temperature) = temperature {
            self.temperature = temperature;
        }
        self.clamped(ceiling)
    }

    pub fn clamped(mut self, ceiling: u32) -> Self {
        self.max_tokens = self.max_tokens.clamp(1, ceiling.max(1));
        self.temperature = if self.temperature.is_nan() {
            0.0
        } else {
            self.temperature.clamp(0.0, 1.0)
        };
        self
    }

    pub fn wants_json(&self) -> bool {
        self.response_format == ResponseFormat::StructuredJson
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
    pub thread_id: String,
    /// Ids of the passages placed in the model context, in rank order.
    pub sources: Vec<String>,
    pub cached: bool,
    pub grounded: bool,
    pub usage: TokenUsage,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_are_clamped_to_ceiling() {
        let params = GenerationParameters::new(0.7, 1000, ResponseFormat::FreeText)
            .with_overrides(Some(9000), Some(1.8), 1500);

        assert_eq!(params.max_tokens, 1500);
        assert_eq!(params.temperature, 1.0);
    }

    #[test]
    fn test_zero_max_tokens_is_raised_to_one() {
        let params = GenerationParameters::new(0.2, 0, ResponseFormat::FreeText).clamped(1500);
        assert_eq!(params.max_tokens, 1);
    }

    #[test]
    fn test_missing_overrides_keep_selection() {
        let params = GenerationParameters::new(0.3, 1500, ResponseFormat::StructuredJson)
            .with_overrides(None, None, 1500);

        assert_eq!(params.temperature, 0.3);
        assert!(params.wants_json());
    }
}
