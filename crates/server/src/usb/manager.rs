//! USB device lookup
//!
//! Enumerates attached devices through a libusb context and opens the one
//! matching the printer's identity. Nothing is cached: every lookup walks the
//! current device list, so a replugged printer is found on the next request.

use crate::usb::{DeviceAccess, DeviceError, RusbPrinter, UsbOperation};
use rusb::{Context, Device, DeviceHandle, UsbContext};
use tracing::{debug, warn};
use tspl_common::DeviceIdentity;

/// Description of an attached device, for `--list-devices`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub identity: DeviceIdentity,
    pub bus_number: u8,
    pub device_address: u8,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

/// libusb-backed [`DeviceAccess`]
pub struct RusbAccess {
    context: Context,
}

impl RusbAccess {
    pub fn new() -> Result<Self, DeviceError> {
        let context =
            Context::new().map_err(|e| DeviceError::usb(UsbOperation::InitContext, e))?;
        Ok(Self { context })
    }

    /// Describe every attached device
    ///
    /// Devices whose descriptor cannot be read are skipped.
    pub fn list_devices(&self) -> Result<Vec<DeviceSummary>, DeviceError> {
        let devices = self
            .context
            .devices()
            .map_err(|e| DeviceError::usb(UsbOperation::Enumerate, e))?;

        let mut summaries = Vec::new();
        for device in devices.iter() {
            match summarize(&device) {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!(
                    "Failed to read descriptor: bus={}, addr={}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                ),
            }
        }

        Ok(summaries)
    }
}

impl DeviceAccess for RusbAccess {
    type Device = RusbPrinter;

    fn open(&self, identity: DeviceIdentity) -> Result<Self::Device, DeviceError> {
        let devices = self
            .context
            .devices()
            .map_err(|e| DeviceError::usb(UsbOperation::Enumerate, e))?;

        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    debug!(
                        "Skipping device bus={}, addr={}: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                }
            };

            if !identity.matches(descriptor.vendor_id(), descriptor.product_id()) {
                continue;
            }

            let handle = device
                .open()
                .map_err(|e| DeviceError::usb(UsbOperation::Open, e))?;

            debug!(
                "Opened {} at bus={}, addr={}",
                identity,
                device.bus_number(),
                device.address()
            );
            return Ok(RusbPrinter::new(handle, identity));
        }

        Err(DeviceError::NotFound { identity })
    }
}

fn summarize<T: UsbContext>(device: &Device<T>) -> Result<DeviceSummary, rusb::Error> {
    let descriptor = device.device_descriptor()?;

    // String descriptors need an open handle, which may be refused without
    // permissions; the ids are still worth listing.
    let (manufacturer, product, serial_number) = match device.open() {
        Ok(handle) => (
            read_string(&handle, descriptor.manufacturer_string_index()),
            read_string(&handle, descriptor.product_string_index()),
            read_string(&handle, descriptor.serial_number_string_index()),
        ),
        Err(_) => (None, None, None),
    };

    Ok(DeviceSummary {
        identity: DeviceIdentity::new(descriptor.vendor_id(), descriptor.product_id()),
        bus_number: device.bus_number(),
        device_address: device.address(),
        manufacturer,
        product,
        serial_number,
    })
}

fn read_string<T: UsbContext>(handle: &DeviceHandle<T>, index: Option<u8>) -> Option<String> {
    index.and_then(|idx| handle.read_string_descriptor_ascii(idx).ok())
}
