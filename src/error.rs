use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Rate limit exceeded (HTTP 429)")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Unable to decode response from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },

    #[error("Response from {url} has no '{link}' link")]
    MissingLink { url: String, link: &'static str },

    #[error("Order {order_url} ended in state '{state}': {body}")]
    OrderFailed {
        order_url: String,
        state: String,
        body: String,
    },

    #[error("Order {order_url} still not finished after {polls} polls")]
    PollTimeout { order_url: String, polls: u32 },

    #[error("Unable to write download: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Status { status, .. } => status.is_server_error(),
            // connection setup, timeouts and bodies cut off mid-transfer
            Self::Transport(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode()
            }
            _ => false,
        }
    }

    /// Delay requested by the server, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}
