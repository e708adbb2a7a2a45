use thiserror::Error;

/// Local precondition failures; raised before any request is made.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// No posts are selected.
    #[error("select at least one post")]
    EmptySelection,
    /// Message is empty after trimming.
    #[error("message text is empty")]
    EmptyMessage,
    /// Settings carry no usable community.
    #[error("add at least one community with a group id and a token")]
    NoCommunities,
    /// Request delay outside the range the backend accepts.
    #[error("request delay {0} must be between 0.05 and 30 seconds")]
    DelayOutOfRange(f64),
    /// Default promo message is blank.
    #[error("promo message is empty")]
    EmptyPromoMessage,
}

/// Any failed call to the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx answer; `body` is the server's text, passed through as-is.
    #[error("server answered {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// Connection, timeout or protocol failure.
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    /// 2xx answer whose body did not match the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Text to show the operator: the server body when there is one.
    pub fn detail(&self) -> String {
        match self {
            ApiError::Status { body, .. } if !body.is_empty() => body.clone(),
            other => other.to_string(),
        }
    }

    /// `true` for a 404 answer.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }
}

/// Failure to create a job.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Rejected locally, nothing was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The backend refused (or never answered) the create call; no job may be assumed.
    #[error("submission failed: {}", .0.detail())]
    Rejected(#[source] ApiError),
}
