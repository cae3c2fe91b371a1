//! Scoped interface claim
//!
//! An [`InterfaceClaim`] is the only way the bridge writes to the printer.
//! The interface is released by [`InterfaceClaim::release`], or by `Drop` on
//! any other exit path, so a failed write never leaves the interface claimed.

use crate::usb::{DeviceError, PrinterDevice};
use tracing::{debug, warn};

pub struct InterfaceClaim<'a, D: PrinterDevice> {
    device: &'a mut D,
    interface: u8,
    released: bool,
}

impl<'a, D: PrinterDevice> InterfaceClaim<'a, D> {
    /// Claim `interface` on `device`
    ///
    /// Fails with the host stack's error (typically `Busy`) if another process
    /// or request holds the interface.
    pub fn acquire(device: &'a mut D, interface: u8) -> Result<Self, DeviceError> {
        device.claim_interface(interface)?;
        debug!("Claimed interface {}", interface);

        Ok(Self {
            device,
            interface,
            released: false,
        })
    }

    /// Write the whole of `data` to `endpoint` in one transfer
    ///
    /// A partial write is an error; nothing is retried.
    pub fn write_all(&mut self, endpoint: u8, data: &[u8]) -> Result<(), DeviceError> {
        let written = self.device.write(endpoint, data)?;
        if written != data.len() {
            return Err(DeviceError::ShortWrite {
                endpoint,
                written,
                expected: data.len(),
            });
        }

        debug!("Wrote {} bytes to endpoint {:#04x}", written, endpoint);
        Ok(())
    }

    /// Release the interface, reporting failure to the caller
    pub fn release(mut self) -> Result<(), DeviceError> {
        self.released = true;
        self.device.release_interface(self.interface)?;
        debug!("Released interface {}", self.interface);
        Ok(())
    }
}

impl<D: PrinterDevice> Drop for InterfaceClaim<'_, D> {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        match self.device.release_interface(self.interface) {
            Ok(()) => debug!("Released interface {} on drop", self.interface),
            Err(e) => warn!("Failed to release interface {}: {}", self.interface, e),
        }
    }
}
