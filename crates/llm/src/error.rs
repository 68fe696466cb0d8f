use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("rate limited after {0} retries")]
    RateLimited(usize),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("{operation} is not supported by the {provider} provider")]
    Unsupported {
        operation: &'static str,
        provider: &'static str,
    },
}

impl LlmError {
    /// HTTP status reported by the provider, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Upstream { status, .. } => Some(*status),
            LlmError::RateLimited(_) => Some(429),
            LlmError::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Transport(err) if err.is_timeout())
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
