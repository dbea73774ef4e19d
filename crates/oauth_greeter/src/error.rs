use thiserror::Error;

use crate::auth::flow::InvalidTransition;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failures of a single request/response cycle.
///
/// None of these are fatal to the listener; handlers turn them into a
/// server-error status for the request that hit them.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Connection refused, reset, or the request deadline expired.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider answered with something that is not JSON.
    #[error("Decode error: {source} (body: {body:?})")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },

    #[error(transparent)]
    Flow(#[from] InvalidTransition),
}

impl GatewayError {
    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport(_))
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, GatewayError::Decode { .. })
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Transport(e.to_string())
    }
}
