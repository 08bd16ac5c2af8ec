//! Error types for device communication.

use thiserror::Error;

/// Errors that can occur while talking to the remote device.
#[derive(Debug, Error)]
pub enum Error {
    /// The operation needs an endpoint that is not configured.
    #[error("endpoint '{0}' is not configured")]
    Unconfigured(&'static str),

    /// Connection could not be established or was reset mid-transfer.
    #[error("network error: {0}")]
    Network(String),

    /// The response body was required to be JSON but was not.
    #[error("invalid response body: {0}")]
    Parse(String),

    /// The device answered with an in-band error indicator.
    #[error("device reported an error: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, Error>;
