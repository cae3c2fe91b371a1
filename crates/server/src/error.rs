//! Print job error types
//!
//! Every failure past request routing ends up here and is reported to the
//! client as a 500 carrying the error's `Display` text.

use crate::usb::DeviceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrintError {
    /// The request body could not supply the declared payload
    #[error("failed to read print payload: {0}")]
    Payload(#[source] std::io::Error),

    /// Device lookup, configuration, claim, write or release failed
    #[error(transparent)]
    Device(#[from] DeviceError),
}

pub type Result<T> = std::result::Result<T, PrintError>;
