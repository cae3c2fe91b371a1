//! USB identity of the supported printer

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vendor/product pair used to locate the printer among attached devices
///
/// Written as `vvvv:pppp` in hex, with optional `0x` prefixes on either half:
///
/// ```
/// use tspl_common::DeviceIdentity;
///
/// let id: DeviceIdentity = "0x1fc9:2016".parse().unwrap();
/// assert_eq!(id, DeviceIdentity::new(0x1fc9, 0x2016));
/// assert_eq!(id.to_string(), "1fc9:2016");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// Check a device descriptor's ids against this identity
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

impl FromStr for DeviceIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Error::InvalidIdentity {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let (vid, pid) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| invalid("expected VID:PID, e.g. '1fc9:2016'"))?;

        if pid.contains(':') {
            return Err(invalid("expected exactly one ':' separator"));
        }

        Ok(Self {
            vendor_id: parse_hex_id(vid).ok_or_else(|| invalid("vendor id is not 1-4 hex digits"))?,
            product_id: parse_hex_id(pid)
                .ok_or_else(|| invalid("product id is not 1-4 hex digits"))?,
        })
    }
}

impl TryFrom<String> for DeviceIdentity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceIdentity> for String {
    fn from(value: DeviceIdentity) -> Self {
        value.to_string()
    }
}

fn parse_hex_id(id: &str) -> Option<u16> {
    let hex = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .unwrap_or(id);

    if hex.is_empty() || hex.len() > 4 {
        return None;
    }

    u16::from_str_radix(hex, 16).ok()
}
