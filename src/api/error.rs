use reqwest::StatusCode;

const MAX_ERROR_DETAIL_CHARS: usize = 300;

/// Failures talking to the backend before or while a body is read.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("cannot reach local API endpoint '{url}': {source}. Start the backend or update ASKDOC_API_URL.")]
    LocalUnreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("cannot reach API endpoint '{url}': {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("API request to '{url}' timed out")]
    Timeout { url: String },

    #[error("API endpoint '{url}' returned HTTP {status}: {detail}")]
    Status {
        url: String,
        status: StatusCode,
        detail: String,
    },

    #[error("API request to '{url}' failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response body from '{url}': {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

/// Why a submitted turn did not complete.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("question exceeds {max} characters")]
    QuestionTooLong { max: usize },

    #[error(transparent)]
    Transport(#[from] ApiError),

    /// Explicit `error` frame from the server.
    #[error("{0}")]
    Stream(String),

    #[error("the answer stream ended before it completed")]
    Incomplete,

    #[error("no data received for {secs}s; the answer stream was abandoned")]
    Timeout { secs: u64 },

    #[error("the question was cancelled")]
    Cancelled,
}

impl TurnError {
    /// Validation failures leave the conversation untouched.
    pub fn is_rejected_before_submit(&self) -> bool {
        matches!(
            self,
            TurnError::EmptyQuestion | TurnError::QuestionTooLong { .. }
        )
    }
}

/// Pulls the FastAPI `detail` field out of an error body, falling back to the
/// raw text.
pub(crate) fn error_detail(body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| match value.get("detail") {
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        })
        .unwrap_or_else(|| body.trim().to_string());

    if detail.is_empty() {
        return "<empty body>".to_string();
    }
    if detail.chars().count() > MAX_ERROR_DETAIL_CHARS {
        let truncated: String = detail.chars().take(MAX_ERROR_DETAIL_CHARS).collect();
        return format!("{truncated}...");
    }
    detail
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_prefers_fastapi_detail() {
        let body = r#"{"detail":"File is still being processed. Status: processing"}"#;
        assert_eq!(
            error_detail(body),
            "File is still being processed. Status: processing"
        );
    }

    #[test]
    fn test_error_detail_falls_back_to_body_text() {
        assert_eq!(error_detail("  upstream exploded \n"), "upstream exploded");
        assert_eq!(error_detail(""), "<empty body>");
    }

    #[test]
    fn test_error_detail_truncates_long_bodies() {
        let body = "x".repeat(MAX_ERROR_DETAIL_CHARS + 50);
        let detail = error_detail(&body);
        assert!(detail.ends_with("..."));
        assert_eq!(detail.chars().count(), MAX_ERROR_DETAIL_CHARS + 3);
    }

    #[test]
    fn test_stream_error_displays_server_message_verbatim() {
        let error = TurnError::Stream("rate limited".to_string());
        assert_eq!(error.to_string(), "rate limited");
    }
}
