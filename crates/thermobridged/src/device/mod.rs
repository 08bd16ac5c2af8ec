//! Client for the remote heating device's ad-hoc HTTP API.
//!
//! Split into small, separately testable pieces: endpoint descriptors,
//! request construction, transport execution, and tolerant response parsing.

mod endpoint;
mod error;
mod request;
mod response;
mod transport;

pub use endpoint::ContentType;
pub use endpoint::Endpoint;
pub use endpoint::Endpoints;
pub use error::Error;
pub use error::Result;
pub use request::DeviceRequest;
pub use response::error_message;
pub use response::extract_temperature;
pub use transport::Expect;
pub use transport::HttpTransport;
pub use transport::Payload;
pub use transport::Transport;

#[cfg(test)]
pub(crate) use transport::MockTransport;
