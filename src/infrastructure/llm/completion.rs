use rig::completion::{CompletionError, CompletionModel};
use rig::http_client::Error as HttpClientError;
use rig::message::{AssistantContent, Message as RigMessage};
use std::time::Duration;

use crate::domain::{
    Conversation, DomainError, Generation, GenerationParameters, MessageRole, TokenUsage,
};

pub(crate) struct PreparedPrompt {
    pub preamble: String,
    pub history: Vec<RigMessage>,
    pub prompt: RigMessage,
}

/// Turns after the last user message are dropped.
pub(crate) fn prepare(
    system_instruction: &str,
    conversation: &Conversation,
    json_instruction: Option<&str>,
) -> Result<PreparedPrompt, DomainError> {
    let mut preamble = system_instruction.to_string();
    for extra in conversation.system_messages() {
        preamble.push_str("\n\n");
        preamble.push_str(extra);
    }
    if let Some(instruction) = json_instruction {
        preamble.push_str("\n\n");
        preamble.push_str(instruction);
    }

    let dialogue: Vec<_> = conversation.dialogue().collect();
    let last_user = dialogue
        .iter()
        .rposition(|m| m.role == MessageRole::User)
        .ok_or_else(|| DomainError::validation("Conversation has no user message"))?;

    let history = dialogue[..last_user]
        .iter()
        .map(|m| match m.role {
            MessageRole::Assistant => RigMessage::assistant(m.content.clone()),
            _ => RigMessage::user(m.content.clone()),
        })
        .collect();

    Ok(PreparedPrompt {
        preamble,
        history,
        prompt: RigMessage::user(dialogue[last_user].content.clone()),
    })
}

pub(crate) async fn send<M: CompletionModel>(
    model: &M,
    prepared: PreparedPrompt,
    params: &GenerationParameters,
    timeout: Duration,
) -> Result<Generation, DomainError> {
    let request = model
        .completion_request(prepared.prompt)
        .preamble(prepared.preamble)
        .messages(prepared.history)
        .temperature(f64::from(params.temperature))
        .max_tokens(u64::from(params.max_tokens));

    let response = tokio::time::timeout(timeout, request.send())
        .await
        .map_err(|_| DomainError::provider_unavailable("Generation timed out"))?
        .map_err(|e| classify_completion_error(&e))?;

    let text = response
        .choice
        .iter()
        .filter_map(|content| match content {
            AssistantContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(DomainError::provider_rejected("Provider returned no text"));
    }

    Ok(Generation {
        text,
        usage: TokenUsage::new(response.usage.input_tokens, response.usage.output_tokens),
    })
}

/// Provider error `type`/`code` values worth retrying.
const TRANSIENT_ERROR_TYPES: &[&str] = &[
    "rate_limit_error",
    "rate_limit_exceeded",
    "overloaded_error",
    "api_error",
    "server_error",
    "service_unavailable",
    "timeout",
];

const TRANSIENT_PHRASES: &[&[&str]] = &[
    &["too", "many", "requests"],
    &["rate", "limit"],
    &["overloaded"],
    &["service", "unavailable"],
    &["temporarily", "unavailable"],
    &["timed", "out"],
];

fn transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Transport failures and 429/5xx become `ProviderUnavailable`; invalid
/// requests, auth and policy refusals become `ProviderRejected`.
pub(crate) fn classify_completion_error(err: &CompletionError) -> DomainError {
    let message = err.to_string();
    match err {
        CompletionError::HttpError(
            HttpClientError::InvalidStatusCode(status)
            | HttpClientError::InvalidStatusCodeWithMessage(status, _),
        ) => {
            if transient_status(status.as_u16()) {
                DomainError::provider_unavailable(message)
            } else {
                DomainError::provider_rejected(message)
            }
        }
        CompletionError::HttpError(_) => DomainError::provider_unavailable(message),
        CompletionError::ProviderError(body) | CompletionError::ResponseError(body) => {
            classify_provider_message(body)
        }
        _ => DomainError::provider_rejected(message),
    }
}

pub(crate) fn classify_provider_message(message: &str) -> DomainError {
    let transient = match error_types(message) {
        Some(types) => types
            .iter()
            .any(|t| TRANSIENT_ERROR_TYPES.contains(&t.as_str())),
        None => transient_tokens(message),
    };

    if transient {
        DomainError::provider_unavailable(message)
    } else {
        DomainError::provider_rejected(message)
    }
}

fn error_types(message: &str) -> Option<Vec<String>> {
    let body: serde_json::Value = serde_json::from_str(&message[message.find('{')?..]).ok()?;
    let error = body.get("error");

    let types: Vec<String> = [
        error.and_then(|e| e.get("type")),
        error.and_then(|e| e.get("code")),
        body.get("type"),
    ]
    .into_iter()
    .flatten()
    .filter_map(|v| v.as_str())
    .filter(|t| *t != "error")
    .map(str::to_lowercase)
    .collect();

    (!types.is_empty()).then_some(types)
}

fn transient_tokens(message: &str) -> bool {
    let lower = message.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.iter().any(|t| TRANSIENT_ERROR_TYPES.contains(t)) {
        return true;
    }

    let status_after_label = tokens.windows(2).any(|pair| {
        matches!(pair[0], "status" | "code" | "http")
            && pair[1].parse::<u16>().is_ok_and(transient_status)
    });
    if status_after_label {
        return true;
    }

    TRANSIENT_PHRASES
        .iter()
        .any(|phrase| tokens.windows(phrase.len()).any(|w| w == *phrase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Message;

    #[test]
    fn test_classify_rate_limit_as_unavailable() {
        let err = classify_provider_message("429 Too Many Requests: rate limit reached");
        assert!(matches!(err, DomainError::ProviderUnavailable(_)));

        let err = classify_provider_message("overloaded_error");
        assert!(matches!(err, DomainError::ProviderUnavailable(_)));

        let err = classify_provider_message("upstream returned status 503");
        assert!(matches!(err, DomainError::ProviderUnavailable(_)));
    }

    #[test]
    fn test_classify_policy_refusal_as_rejected() {
        let err = classify_provider_message("invalid_request_error: content_policy_violation");
        assert!(matches!(err, DomainError::ProviderRejected(_)));
    }

    #[test]
    fn test_numbers_inside_messages_are_not_status_codes() {
        let err = classify_provider_message(
            "invalid_request_error: max_tokens: 15000 > 4096, which is the maximum allowed",
        );
        assert!(matches!(err, DomainError::ProviderRejected(_)));

        let err = classify_provider_message("invalid x-api-key (request id req_5029ab)");
        assert!(matches!(err, DomainError::ProviderRejected(_)));
    }

    #[test]
    fn test_classify_json_error_bodies_by_type() {
        let err = classify_provider_message(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        );
        assert!(matches!(err, DomainError::ProviderUnavailable(_)));

        let err = classify_provider_message(
            r#"{"error":{"message":"The server had an error","type":"server_error","code":null}}"#,
        );
        assert!(matches!(err, DomainError::ProviderUnavailable(_)));

        let err = classify_provider_message(
            r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","code":"insufficient_quota"}}"#,
        );
        assert!(matches!(err, DomainError::ProviderRejected(_)));
    }

    #[test]
    fn test_classify_completion_error_variants() {
        let err = classify_completion_error(&CompletionError::HttpError(
            HttpClientError::Instance(Box::from("connection refused")),
        ));
        assert!(matches!(err, DomainError::ProviderUnavailable(_)));

        let err = classify_completion_error(&CompletionError::ProviderError(
            "invalid x-api-key (request id req_5029ab)".to_string(),
        ));
        assert!(matches!(err, DomainError::ProviderRejected(_)));

        let err = classify_completion_error(&CompletionError::ResponseError(
            "rate_limit_error".to_string(),
        ));
        assert!(matches!(err, DomainError::ProviderUnavailable(_)));
    }

    #[test]
    fn test_prepare_splits_history_and_prompt() {
        let conversation = Conversation::new(vec![
            Message::system("Answer in Thai."),
            Message::user("What is myopia?"),
            Message::assistant("Nearsightedness."),
            Message::user("How is it corrected?"),
        ]);

        let prepared = prepare("You are EyeQcheck.", &conversation, Some("JSON only.")).unwrap();

        assert!(prepared.preamble.starts_with("You are EyeQcheck."));
        assert!(prepared.preamble.contains("Answer in Thai."));
        assert!(prepared.preamble.ends_with("JSON only."));
        assert_eq!(prepared.history.len(), 2);
        assert!(matches!(prepared.prompt, RigMessage::User { .. }));
        assert!(matches!(prepared.history[1], RigMessage::Assistant { .. }));
    }

    #[test]
    fn test_prepare_requires_user_message() {
        let conversation = Conversation::new(vec![Message::assistant("Hello")]);
        let err = prepare("sys", &conversation, None).err().unwrap();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
