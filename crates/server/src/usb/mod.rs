//! USB subsystem
//!
//! The print bridge talks to the printer through two traits:
//! [`DeviceAccess`] locates and opens the device, [`PrinterDevice`] performs
//! the per-request operations on the opened handle. The rusb implementations
//! live in [`manager`] and [`device`]; [`mock`] provides a recording fake for
//! tests.
//!
//! USB calls block the calling thread until completion or timeout, so callers
//! on the Tokio runtime run them through `spawn_blocking`.

pub mod claim;
pub mod device;
pub mod error;
pub mod manager;
pub mod mock;
pub mod transfers;

pub use claim::InterfaceClaim;
pub use device::RusbPrinter;
pub use error::{DeviceError, UsbOperation};
pub use manager::{DeviceSummary, RusbAccess};

use tspl_common::DeviceIdentity;

/// Locates the printer among attached devices
///
/// A fresh device is opened for every print job; implementations must not
/// cache handles between calls.
pub trait DeviceAccess: Send + Sync {
    type Device: PrinterDevice;

    /// Open the first attached device matching `identity`
    fn open(&self, identity: DeviceIdentity) -> Result<Self::Device, DeviceError>;
}

/// Operations the bridge performs on an opened printer
pub trait PrinterDevice {
    /// Whether a kernel driver is bound to `interface`
    fn kernel_driver_active(&mut self, interface: u8) -> Result<bool, DeviceError>;

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), DeviceError>;

    /// Select the device's default (first) configuration
    fn set_configuration(&mut self) -> Result<(), DeviceError>;

    fn claim_interface(&mut self, interface: u8) -> Result<(), DeviceError>;

    fn release_interface(&mut self, interface: u8) -> Result<(), DeviceError>;

    /// Write `data` to an OUT endpoint in a single transfer
    ///
    /// Returns the number of bytes the device accepted, which may be less than
    /// `data.len()` if the transfer timed out part way.
    fn write(&mut self, endpoint: u8, data: &[u8]) -> Result<usize, DeviceError>;
}
