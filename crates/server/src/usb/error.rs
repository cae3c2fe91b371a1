//! USB device error types

use std::fmt;
use thiserror::Error;
use tspl_common::DeviceIdentity;

/// Step of the device interaction that produced a libusb error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbOperation {
    InitContext,
    Enumerate,
    Open,
    KernelDriverQuery { interface: u8 },
    DetachKernelDriver { interface: u8 },
    SetConfiguration,
    ClaimInterface { interface: u8 },
    ReleaseInterface { interface: u8 },
    Write { endpoint: u8 },
}

impl fmt::Display for UsbOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitContext => write!(f, "initialize libusb"),
            Self::Enumerate => write!(f, "enumerate devices"),
            Self::Open => write!(f, "open device"),
            Self::KernelDriverQuery { interface } => {
                write!(f, "query kernel driver on interface {}", interface)
            }
            Self::DetachKernelDriver { interface } => {
                write!(f, "detach kernel driver from interface {}", interface)
            }
            Self::SetConfiguration => write!(f, "set configuration"),
            Self::ClaimInterface { interface } => write!(f, "claim interface {}", interface),
            Self::ReleaseInterface { interface } => write!(f, "release interface {}", interface),
            Self::Write { endpoint } => write!(f, "write to endpoint {:#04x}", endpoint),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("usb device not found: {identity}")]
    NotFound { identity: DeviceIdentity },

    #[error("{operation} failed: {source}")]
    Usb {
        operation: UsbOperation,
        #[source]
        source: rusb::Error,
    },

    #[error("short write to endpoint {endpoint:#04x}: {written} of {expected} bytes")]
    ShortWrite {
        endpoint: u8,
        written: usize,
        expected: usize,
    },
}

impl DeviceError {
    pub fn usb(operation: UsbOperation, source: rusb::Error) -> Self {
        Self::Usb { operation, source }
    }

    /// True when the host's USB stack does not implement the operation
    /// (kernel driver queries on macOS and Windows, for example)
    pub fn is_not_supported(&self) -> bool {
        matches!(
            self,
            Self::Usb {
                source: rusb::Error::NotSupported,
                ..
            }
        )
    }
}
