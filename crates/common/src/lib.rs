//! Common utilities for tspl-bridge
//!
//! This crate provides the pieces shared by the bridge library and its binary:
//! the printer's USB identity, error handling and logging setup.

pub mod error;
pub mod logging;
pub mod usb_types;

pub use error::{Error, Result};
pub use logging::setup_logging;
pub use usb_types::DeviceIdentity;
