use thiserror::Error;

/// A convenience `Result` alias using [`ScribeError`].
pub type ScribeResult<T> = Result<T, ScribeError>;

/// Top-level error type for the Scribe workspace.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Error, Debug)]
pub enum ScribeError {
    /// An error raised while running the agent graph.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An error from an outbound HTTP request (e.g. chat model API call).
    #[error("HTTP error: {0}")]
    Http(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the web search provider.
    #[error("Search error: {0}")]
    Search(String),

    /// An error raised by a tool during invocation.
    #[error("Tool error: {0}")]
    Tool(String),

    /// An error from the HTTP gateway layer.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A wire protocol error surfaced outside the translator.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Caller input that failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScribeError::Search("rate limited".to_string());
        assert_eq!(err.to_string(), "Search error: rate limited");
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: ScribeError = parse.unwrap_err().into();
        assert!(matches!(err, ScribeError::Json(_)));
    }
}
