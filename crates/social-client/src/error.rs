use thiserror::Error;

#[derive(Error, Debug)]
pub enum SocialError {
    #[error("Rate limited (HTTP 429): {0}")]
    RateLimited(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Session cache error: {0}")]
    SessionCache(String),
}

impl SocialError {
    /// Whether the service asked us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SocialError::RateLimited(_))
    }
}

impl From<reqwest::Error> for SocialError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SocialError::Timeout(e.to_string())
        } else {
            SocialError::Request(e.to_string())
        }
    }
}

pub type SocialResult<T> = Result<T, SocialError>;
