//! OUT transfer execution
//!
//! The printer's output endpoint may be declared as bulk or interrupt; the
//! transfer primitive is picked from the active configuration's endpoint
//! descriptor, falling back to bulk when the endpoint is not described.

use crate::usb::{DeviceError, UsbOperation};
use rusb::{Context, DeviceHandle, Direction, TransferType, UsbContext};
use std::time::Duration;
use tracing::debug;

/// Default timeout for a print payload write (1 second)
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Write `data` to `endpoint` in a single transfer and return the bytes sent
pub fn write_out(
    handle: &DeviceHandle<Context>,
    endpoint: u8,
    data: &[u8],
    timeout: Duration,
) -> Result<usize, DeviceError> {
    let transfer_type = endpoint_transfer_type(handle, endpoint).unwrap_or(TransferType::Bulk);

    debug!(
        "OUT transfer: endpoint={:#04x}, type={:?}, data_len={}, timeout={}ms",
        endpoint,
        transfer_type,
        data.len(),
        timeout.as_millis()
    );

    let result = match transfer_type {
        TransferType::Interrupt => handle.write_interrupt(endpoint, data, timeout),
        _ => handle.write_bulk(endpoint, data, timeout),
    };

    result.map_err(|e| DeviceError::usb(UsbOperation::Write { endpoint }, e))
}

/// Look up an OUT endpoint's transfer type in the active configuration
fn endpoint_transfer_type<T: UsbContext>(
    handle: &DeviceHandle<T>,
    endpoint: u8,
) -> Option<TransferType> {
    let config = handle.device().active_config_descriptor().ok()?;

    config
        .interfaces()
        .flat_map(|interface| interface.descriptors())
        .flat_map(|descriptor| {
            descriptor
                .endpoint_descriptors()
                .map(|ep| (ep.address(), ep.direction(), ep.transfer_type()))
                .collect::<Vec<_>>()
        })
        .find(|(address, direction, _)| *address == endpoint && *direction == Direction::Out)
        .map(|(_, _, transfer_type)| transfer_type)
}

/// Whether `endpoint` is a valid OUT endpoint address
pub fn is_out_endpoint(endpoint: u8) -> bool {
    endpoint & 0x80 == 0 && endpoint & 0x0f != 0
}
