use crate::openapi::ApiError;

/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the processor can
/// tell configuration problems (fatal) from per-request failures (fallback reply).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("api error: {0}")]
    Api(#[from] ApiError),

    #[error("token error: {0}")]
    Token(String),

    #[error("handler error: {0}")]
    Handler(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
