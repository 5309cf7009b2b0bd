use thiserror::Error;

/// Failures talking to the chat and conversation endpoints.
///
/// An endpoint that answers with an `{"error": ...}` body on the chat route is
/// not a `ChatError`; that is a successful exchange carrying an API error and
/// surfaces as [`crate::api::ChatResponse::error`].
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Remote(String),
}

pub type ChatResult<T> = std::result::Result<T, ChatError>;
