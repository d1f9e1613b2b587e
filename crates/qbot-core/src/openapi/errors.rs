/// Per-request OpenAPI failure.
///
/// Never retried inside the client; retry policy belongs to the caller.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The platform answered with a non-2xx status.
    #[error("code:{code}, text:{body}, traceID:{}", .trace_id.as_deref().unwrap_or(""))]
    Status {
        code: u16,
        body: String,
        trace_id: Option<String>,
    },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    /// A request/response filter rejected the call.
    #[error("filter rejected request: {0}")]
    Filter(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("operation not supported by this api version: {0}")]
    Unsupported(&'static str),
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn trace_id(&self) -> Option<&str> {
        match self {
            ApiError::Status { trace_id, .. } => trace_id.as_deref(),
            _ => None,
        }
    }

    /// Short reason that is safe to show to end users (no codes, no bodies).
    pub fn user_reason(&self) -> &'static str {
        match self {
            ApiError::Status { code: 429, .. } => "the platform is rate limiting replies",
            ApiError::Status { code, .. } if *code >= 500 => {
                "the platform is temporarily unavailable"
            }
            ApiError::Status { .. } => "the platform rejected the reply",
            ApiError::Timeout => "the request timed out",
            ApiError::Transport(_) => "the platform could not be reached",
            ApiError::Filter(_) | ApiError::InvalidRequest(_) => "the reply was not allowed",
            ApiError::Unsupported(_) => "this kind of reply is not supported here",
            ApiError::Decode(_) => "the platform sent an unexpected answer",
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_carries_code_body_and_trace() {
        let err = ApiError::Status {
            code: 429,
            body: "{\"code\":22009}".to_string(),
            trace_id: Some("t-1".to_string()),
        };
        assert_eq!(err.to_string(), "code:429, text:{\"code\":22009}, traceID:t-1");
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(err.trace_id(), Some("t-1"));
    }

    #[test]
    fn user_reason_hides_details() {
        let err = ApiError::Status {
            code: 500,
            body: "stack trace here".to_string(),
            trace_id: None,
        };
        assert!(!err.user_reason().contains("500"));
        assert!(!err.user_reason().contains("stack"));
    }
}
