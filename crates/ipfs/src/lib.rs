//! Pincraft IPFS
//!
//! HTTP client for the local Kubo storage node and the gateway-fetch pin
//! executor. The publisher's content lives on a private swarm, so pinning
//! is always fetch-then-add; peer routing alone cannot find it.

pub mod client;
pub mod executor;

pub use client::{AddResponse, KuboClient};
pub use executor::GatewayPinExecutor;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpfsError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("HTTP {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("malformed response: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for IpfsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                detail: err.to_string(),
            }
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl IpfsError {
    /// Only network trouble and server-side errors are worth retrying;
    /// protocol-level failures are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Protocol(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, IpfsError>;
