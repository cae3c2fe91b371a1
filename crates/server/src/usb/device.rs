//! rusb-backed printer handle

use crate::usb::transfers::{DEFAULT_WRITE_TIMEOUT, write_out};
use crate::usb::{DeviceError, PrinterDevice, UsbOperation};
use rusb::{Context, DeviceHandle};
use tracing::debug;
use tspl_common::DeviceIdentity;

/// An opened printer
///
/// Dropping it closes the libusb handle.
pub struct RusbPrinter {
    handle: DeviceHandle<Context>,
    identity: DeviceIdentity,
}

impl RusbPrinter {
    pub fn new(handle: DeviceHandle<Context>, identity: DeviceIdentity) -> Self {
        Self { handle, identity }
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }
}

impl PrinterDevice for RusbPrinter {
    fn kernel_driver_active(&mut self, interface: u8) -> Result<bool, DeviceError> {
        self.handle
            .kernel_driver_active(interface)
            .map_err(|e| DeviceError::usb(UsbOperation::KernelDriverQuery { interface }, e))
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), DeviceError> {
        self.handle
            .detach_kernel_driver(interface)
            .map_err(|e| DeviceError::usb(UsbOperation::DetachKernelDriver { interface }, e))?;
        debug!(
            "Detached kernel driver from interface {} on {}",
            interface, self.identity
        );
        Ok(())
    }

    fn set_configuration(&mut self) -> Result<(), DeviceError> {
        let map = |e| DeviceError::usb(UsbOperation::SetConfiguration, e);

        let config = self.handle.device().config_descriptor(0).map_err(map)?;
        self.handle
            .set_active_configuration(config.number())
            .map_err(map)?;

        debug!(
            "Set configuration {} on {}",
            config.number(),
            self.identity
        );
        Ok(())
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), DeviceError> {
        self.handle
            .claim_interface(interface)
            .map_err(|e| DeviceError::usb(UsbOperation::ClaimInterface { interface }, e))
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), DeviceError> {
        self.handle
            .release_interface(interface)
            .map_err(|e| DeviceError::usb(UsbOperation::ReleaseInterface { interface }, e))
    }

    fn write(&mut self, endpoint: u8, data: &[u8]) -> Result<usize, DeviceError> {
        write_out(&self.handle, endpoint, data, DEFAULT_WRITE_TIMEOUT)
    }
}
