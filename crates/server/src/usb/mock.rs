//! Recording fake for [`DeviceAccess`]
//!
//! Records every call the bridge makes, in order, and fails selected steps on
//! request. Used by the unit tests here and by the HTTP integration tests.

use crate::usb::{DeviceAccess, DeviceError, PrinterDevice, UsbOperation};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tspl_common::DeviceIdentity;

/// A call observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Open,
    KernelDriverActive(u8),
    DetachKernelDriver(u8),
    SetConfiguration,
    ClaimInterface(u8),
    Write { endpoint: u8, data: Vec<u8> },
    ReleaseInterface(u8),
}

/// Call kind, without arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockStep {
    Open,
    KernelDriverActive,
    DetachKernelDriver,
    SetConfiguration,
    ClaimInterface,
    Write,
    ReleaseInterface,
}

impl MockCall {
    pub fn step(&self) -> MockStep {
        match self {
            Self::Open => MockStep::Open,
            Self::KernelDriverActive(_) => MockStep::KernelDriverActive,
            Self::DetachKernelDriver(_) => MockStep::DetachKernelDriver,
            Self::SetConfiguration => MockStep::SetConfiguration,
            Self::ClaimInterface(_) => MockStep::ClaimInterface,
            Self::Write { .. } => MockStep::Write,
            Self::ReleaseInterface(_) => MockStep::ReleaseInterface,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<MockCall>,
    failures: HashMap<MockStep, rusb::Error>,
    missing: bool,
    kernel_driver_active: bool,
    short_write: Option<usize>,
    write_delay: Option<Duration>,
    claimed: bool,
}

/// Shared handle to a fake printer
///
/// Clones share state, so a test can keep one clone and hand another to the
/// bridge. Like a real host stack, a second claim while the interface is held
/// fails with `Busy`.
#[derive(Debug, Clone, Default)]
pub struct MockAccess {
    state: Arc<Mutex<MockState>>,
}

impl MockAccess {
    /// A present printer that accepts every operation
    pub fn new() -> Self {
        Self::default()
    }

    /// No matching device is attached
    pub fn without_device(self) -> Self {
        self.lock().missing = true;
        self
    }

    /// Fail `step` with `error` every time it is called
    pub fn fail_on(self, step: MockStep, error: rusb::Error) -> Self {
        self.lock().failures.insert(step, error);
        self
    }

    /// Report a kernel driver bound to every interface
    pub fn with_kernel_driver(self) -> Self {
        self.lock().kernel_driver_active = true;
        self
    }

    /// Accept at most `written` bytes per write
    pub fn with_short_write(self, written: usize) -> Self {
        self.lock().short_write = Some(written);
        self
    }

    /// Block each write for `delay`, holding the claim
    pub fn with_write_delay(self, delay: Duration) -> Self {
        self.lock().write_delay = Some(delay);
        self
    }

    /// All calls so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Number of calls of one kind
    pub fn count(&self, step: MockStep) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.step() == step)
            .count()
    }

    /// Payloads written so far, in order
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Write { data, .. } => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: MockCall, operation: UsbOperation) -> Result<(), DeviceError> {
        let step = call.step();
        let mut state = self.lock();
        state.calls.push(call);
        match state.failures.get(&step) {
            Some(error) => Err(DeviceError::usb(operation, *error)),
            None => Ok(()),
        }
    }
}

impl DeviceAccess for MockAccess {
    type Device = MockDevice;

    fn open(&self, identity: DeviceIdentity) -> Result<Self::Device, DeviceError> {
        self.record(MockCall::Open, UsbOperation::Open)?;
        if self.lock().missing {
            return Err(DeviceError::NotFound { identity });
        }

        Ok(MockDevice {
            access: self.clone(),
        })
    }
}

/// Device handle returned by [`MockAccess::open`]
#[derive(Debug)]
pub struct MockDevice {
    access: MockAccess,
}

impl PrinterDevice for MockDevice {
    fn kernel_driver_active(&mut self, interface: u8) -> Result<bool, DeviceError> {
        self.access.record(
            MockCall::KernelDriverActive(interface),
            UsbOperation::KernelDriverQuery { interface },
        )?;
        Ok(self.access.lock().kernel_driver_active)
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> Result<(), DeviceError> {
        self.access.record(
            MockCall::DetachKernelDriver(interface),
            UsbOperation::DetachKernelDriver { interface },
        )?;
        self.access.lock().kernel_driver_active = false;
        Ok(())
    }

    fn set_configuration(&mut self) -> Result<(), DeviceError> {
        self.access
            .record(MockCall::SetConfiguration, UsbOperation::SetConfiguration)
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), DeviceError> {
        self.access.record(
            MockCall::ClaimInterface(interface),
            UsbOperation::ClaimInterface { interface },
        )?;

        let mut state = self.access.lock();
        if state.claimed {
            return Err(DeviceError::usb(
                UsbOperation::ClaimInterface { interface },
                rusb::Error::Busy,
            ));
        }
        state.claimed = true;
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), DeviceError> {
        self.access.lock().claimed = false;
        self.access.record(
            MockCall::ReleaseInterface(interface),
            UsbOperation::ReleaseInterface { interface },
        )
    }

    fn write(&mut self, endpoint: u8, data: &[u8]) -> Result<usize, DeviceError> {
        self.access.record(
            MockCall::Write {
                endpoint,
                data: data.to_vec(),
            },
            UsbOperation::Write { endpoint },
        )?;

        let (delay, short_write) = {
            let state = self.access.lock();
            (state.write_delay, state.short_write)
        };
        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        Ok(short_write.map_or(data.len(), |limit| limit.min(data.len())))
    }
}
