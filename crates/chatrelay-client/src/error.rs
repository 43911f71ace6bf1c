//! Error types for the reconstruction stage

use thiserror::Error;

use chatrelay_models::ModelError;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("relay refused the request (status {status}): {message}")]
    Relay { status: u16, message: String },

    #[error("stream broke mid-flight: {0}")]
    Stream(String),

    #[error("received bytes are not valid UTF-8: {0}")]
    Decode(String),

    #[error("no data received for {0} seconds")]
    Timeout(u64),

    #[error("a streaming request is already in flight")]
    RequestInFlight,

    #[error(transparent)]
    Model(#[from] ModelError),
}
