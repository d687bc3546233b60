use async_openai::error::OpenAIError;

/// Transient-failure classification for the model endpoint: connection and
/// timeout trouble, plus the quota/availability statuses the Gemini surface
/// reports (RESOURCE_EXHAUSTED, UNAVAILABLE, DEADLINE_EXCEEDED).
pub(super) fn should_retry_openai_error(err: &OpenAIError) -> bool {
    match err {
        OpenAIError::Reqwest(e) => e.is_timeout() || e.is_connect(),
        OpenAIError::JSONDeserialize(_, _) => true,
        OpenAIError::ApiError(api) => {
            let msg = api.message.to_ascii_lowercase();
            let code = api.code.as_deref().unwrap_or("").to_ascii_lowercase();

            msg.contains("quota")
                || msg.contains("rate limit")
                || msg.contains("429")
                || msg.contains("overload")
                || msg.contains("unavailable")
                || msg.contains("timeout")
                || code.contains("resource_exhausted")
                || code.contains("unavailable")
                || code.contains("deadline_exceeded")
                || code.contains("429")
                || code.contains("503")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::ApiError;

    fn api_error(message: &str, code: Option<&str>) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: message.to_string(),
            r#type: None,
            param: None,
            code: code.map(str::to_string),
        })
    }

    #[test]
    fn quota_and_availability_statuses_are_retryable() {
        assert!(should_retry_openai_error(&api_error(
            "Resource has been exhausted (e.g. check quota).",
            Some("RESOURCE_EXHAUSTED"),
        )));
        assert!(should_retry_openai_error(&api_error(
            "The model is overloaded. Please try again later.",
            Some("UNAVAILABLE"),
        )));
        assert!(should_retry_openai_error(&api_error("HTTP 429", None)));
    }

    #[test]
    fn caller_errors_are_not_retryable() {
        assert!(!should_retry_openai_error(&api_error(
            "API key not valid.",
            Some("INVALID_ARGUMENT"),
        )));
        assert!(!should_retry_openai_error(&api_error(
            "Permission denied.",
            Some("PERMISSION_DENIED"),
        )));
    }
}
