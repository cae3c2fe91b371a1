//! tspl-bridge
//!
//! Accepts TSPL print jobs over HTTP and writes them to a USB label printer.
//!
//! The [`bridge::PrintBridge`] owns the request-to-device pipeline and talks
//! to hardware only through the [`usb::DeviceAccess`] trait, so the HTTP
//! surface in [`http`] can be exercised against [`usb::mock::MockAccess`].

pub mod bridge;
pub mod config;
pub mod error;
pub mod http;
pub mod service;
pub mod usb;

pub use bridge::{PrintBridge, PrintRequest, PrintResponse, Rejection};
pub use config::{PrinterSettings, ServerConfig};
pub use error::PrintError;
