use thiserror::Error;

/// Failure of a call into the remote generative-AI service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The key or project was rejected, or the model is not visible to it
    #[error("authorization failed ({status}): {message}")]
    Authorization { status: u16, message: String },

    #[error("remote error {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response stream could not be decoded or carried an error payload
    #[error("malformed stream: {0}")]
    Stream(String),

    #[error("no image data found in response")]
    NoImageData,

    #[error("no API key selected")]
    MissingApiKey,
}

impl ServiceError {
    /// Map an HTTP error status to the structured error kind
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 | 404 => ServiceError::Authorization { status, message },
            _ => ServiceError::Remote { status, message },
        }
    }

    /// True when the caller should re-prompt for a key before retrying
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            ServiceError::Authorization { .. } | ServiceError::MissingApiKey
        )
    }
}
