//! Print bridge
//!
//! Turns one HTTP print request into one USB write. The pipeline is strictly
//! linear: check the path, check the method and content type, read the
//! payload, open the printer, detach a bound kernel driver, set the
//! configuration, claim the interface, write, release, respond.
//!
//! Routing rejections produce an empty 404/405 without touching the device.
//! Every later failure becomes a 500 whose body is the error text, and is
//! logged. There is no retry and no queue.
//!
//! # Release failures
//!
//! If the write fails, its error is reported and a failing release is only
//! logged. If the write succeeds but the release fails, the release error is
//! reported, since the job only succeeds when the interface is given back.

use crate::config::PrinterSettings;
use crate::error::{PrintError, Result};
use crate::usb::{DeviceAccess, InterfaceClaim, PrinterDevice};
use axum::http::{HeaderMap, Method, StatusCode, header};
use std::io::{self, Read};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, warn};

/// Why a request was turned away before any device access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Path does not end with the print route suffix
    NotFound,
    /// Method other than POST on the print route
    MethodNotAllowed,
    /// Content type is not the printer language's media type
    UnsupportedContentType,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed | Self::UnsupportedContentType => {
                StatusCode::METHOD_NOT_ALLOWED
            }
        }
    }
}

/// One inbound print request
#[derive(Debug)]
pub struct PrintRequest<R> {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: R,
}

/// Status and plain-text body sent back to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintResponse {
    pub status: StatusCode,
    pub body: String,
}

impl PrintResponse {
    pub fn ok() -> Self {
        Self::empty(StatusCode::OK)
    }

    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }

    pub fn from_error(err: &PrintError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: err.to_string(),
        }
    }
}

impl From<Rejection> for PrintResponse {
    fn from(rejection: Rejection) -> Self {
        Self::empty(rejection.status())
    }
}

pub struct PrintBridge<A: DeviceAccess> {
    access: A,
    settings: PrinterSettings,
    device_lock: Option<Mutex<()>>,
}

impl<A: DeviceAccess> PrintBridge<A> {
    pub fn new(access: A, settings: PrinterSettings) -> Self {
        let device_lock = settings.serialize_access.then(|| Mutex::new(()));

        Self {
            access,
            settings,
            device_lock,
        }
    }

    pub fn settings(&self) -> &PrinterSettings {
        &self.settings
    }

    /// Handle one print request from start to finish
    ///
    /// Blocks on device I/O; never panics on device or payload errors.
    pub fn submit_print_job<R: Read>(&self, request: PrintRequest<R>) -> PrintResponse {
        if let Err(rejection) = self.route(&request.method, &request.path, &request.headers) {
            debug!(
                "Rejected {} {}: {:?}",
                request.method, request.path, rejection
            );
            return rejection.into();
        }

        let result = read_payload(&request.headers, request.body)
            .and_then(|payload| self.print(&payload));

        match result {
            Ok(()) => PrintResponse::ok(),
            Err(e) => {
                error!("{}", e);
                PrintResponse::from_error(&e)
            }
        }
    }

    /// Decide whether a request is a print job, without touching the device
    ///
    /// Checks run in order: path suffix, method, content type.
    pub fn route(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
    ) -> std::result::Result<(), Rejection> {
        if !path.ends_with(self.settings.route_suffix.as_str()) {
            return Err(Rejection::NotFound);
        }

        if *method != Method::POST {
            return Err(Rejection::MethodNotAllowed);
        }

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());
        if content_type != Some(self.settings.content_type.as_str()) {
            return Err(Rejection::UnsupportedContentType);
        }

        Ok(())
    }

    /// Send `payload` to the printer in one write
    pub fn print(&self, payload: &[u8]) -> Result<()> {
        let _serialized = self
            .device_lock
            .as_ref()
            .map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner));

        let interface = self.settings.interface;
        let mut device = self.access.open(self.settings.device)?;

        detach_kernel_driver(&mut device, interface)?;
        device.set_configuration()?;

        let mut claim = InterfaceClaim::acquire(&mut device, interface)?;
        let written = claim.write_all(self.settings.endpoint, payload);
        let released = claim.release();

        match (written, released) {
            (Ok(()), Ok(())) => {
                debug!(
                    "Printed {} bytes on {}",
                    payload.len(),
                    self.settings.device
                );
                Ok(())
            }
            (Err(write_err), Ok(())) => Err(write_err.into()),
            (Err(write_err), Err(release_err)) => {
                warn!("Release after failed write also failed: {}", release_err);
                Err(write_err.into())
            }
            (Ok(()), Err(release_err)) => Err(release_err.into()),
        }
    }
}

/// Detach a kernel driver bound to `interface`, if the host supports asking
fn detach_kernel_driver<D: PrinterDevice>(device: &mut D, interface: u8) -> Result<()> {
    match device.kernel_driver_active(interface) {
        Ok(true) => {}
        Ok(false) => return Ok(()),
        Err(e) if e.is_not_supported() => {
            debug!("Kernel driver query not supported: {}", e);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    match device.detach_kernel_driver(interface) {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_supported() => {
            debug!("Kernel driver detach not supported: {}", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Read exactly `content-length` bytes from `body`
///
/// A missing header means an empty payload. A malformed header or a body
/// that ends early is an I/O error.
pub fn read_payload<R: Read>(headers: &HeaderMap, body: R) -> Result<Vec<u8>> {
    let declared = match headers.get(header::CONTENT_LENGTH) {
        None => 0,
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or_else(|| {
                PrintError::Payload(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid content-length header: {:?}", value),
                ))
            })?,
    };

    let mut payload = Vec::new();
    body.take(declared)
        .read_to_end(&mut payload)
        .map_err(PrintError::Payload)?;

    if (payload.len() as u64) < declared {
        return Err(PrintError::Payload(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "expected {} bytes, body ended after {}",
                declared,
                payload.len()
            ),
        )));
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::mock::{MockAccess, MockCall, MockStep};
    use axum::http::HeaderValue;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    const LABEL: &[u8] = b"SIZE 50 mm,30 mm\nCLS\nTEXT 10,10,\"3\",0,1,1,\"HELLO\"\nPRINT 1\n";

    fn bridge(mock: &MockAccess) -> PrintBridge<MockAccess> {
        PrintBridge::new(mock.clone(), PrinterSettings::default())
    }

    fn headers(content_type: &str, content_length: usize) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(content_type).unwrap(),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
        headers
    }

    fn print_request(path: &str, body: &'static [u8]) -> PrintRequest<&'static [u8]> {
        PrintRequest {
            method: Method::POST,
            path: path.to_string(),
            headers: headers("application/tspl", body.len()),
            body,
        }
    }

    #[test]
    fn test_success_claims_writes_releases_in_order() {
        let mock = MockAccess::new();
        let response = bridge(&mock).submit_print_job(print_request("/tspl", LABEL));

        assert_eq!(response, PrintResponse::ok());
        assert_eq!(
            mock.calls(),
            vec![
                MockCall::Open,
                MockCall::KernelDriverActive(0),
                MockCall::SetConfiguration,
                MockCall::ClaimInterface(0),
                MockCall::Write {
                    endpoint: 1,
                    data: LABEL.to_vec()
                },
                MockCall::ReleaseInterface(0),
            ]
        );
    }

    #[test]
    fn test_path_prefix_is_ignored() {
        let mock = MockAccess::new();
        let response =
            bridge(&mock).submit_print_job(print_request("/printers/front-desk/tspl", LABEL));

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(mock.written(), vec![LABEL.to_vec()]);
    }

    #[test]
    fn test_wrong_path_is_404_without_device_access() {
        let mock = MockAccess::new();
        for path in ["/", "/print", "/tspl/", "/tspl2", "/TSPL"] {
            let response = bridge(&mock).submit_print_job(print_request(path, LABEL));
            assert_eq!(response, PrintResponse::empty(StatusCode::NOT_FOUND), "{path}");
        }
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_wrong_path_wins_over_method_and_content_type() {
        let mock = MockAccess::new();
        let request = PrintRequest {
            method: Method::GET,
            path: "/status".to_string(),
            headers: HeaderMap::new(),
            body: &b""[..],
        };

        let response = bridge(&mock).submit_print_job(request);
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_wrong_content_type_is_405_without_device_access() {
        let mock = MockAccess::new();
        for content_type in ["text/tspl", "application/octet-stream", "application/TSPL"] {
            let request = PrintRequest {
                headers: headers(content_type, LABEL.len()),
                ..print_request("/tspl", LABEL)
            };
            let response = bridge(&mock).submit_print_job(request);
            assert_eq!(
                response,
                PrintResponse::empty(StatusCode::METHOD_NOT_ALLOWED),
                "{content_type}"
            );
        }

        let mut request = print_request("/tspl", LABEL);
        request.headers.remove(header::CONTENT_TYPE);
        let response = bridge(&mock).submit_print_job(request);
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);

        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_non_post_is_405() {
        let mock = MockAccess::new();
        let request = PrintRequest {
            method: Method::PUT,
            ..print_request("/tspl", LABEL)
        };

        let response = bridge(&mock).submit_print_job(request);
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_device_not_found_is_500() {
        let mock = MockAccess::new().without_device();
        let response = bridge(&mock).submit_print_job(print_request("/tspl", LABEL));

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body.contains("usb device not found"));
        assert!(response.body.contains("1fc9:2016"));
        assert_eq!(mock.count(MockStep::ClaimInterface), 0);
        assert_eq!(mock.count(MockStep::Write), 0);
    }

    #[test]
    fn test_write_failure_still_releases() {
        let mock = MockAccess::new().fail_on(MockStep::Write, rusb::Error::Timeout);
        let response = bridge(&mock).submit_print_job(print_request("/tspl", LABEL));

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body.contains("write to endpoint 0x01 failed"));
        assert!(response.body.contains(&rusb::Error::Timeout.to_string()));
        assert_eq!(mock.count(MockStep::ReleaseInterface), 1);
        assert_eq!(mock.calls().last(), Some(&MockCall::ReleaseInterface(0)));
    }

    #[test]
    fn test_short_write_is_500_and_releases() {
        let mock = MockAccess::new().with_short_write(8);
        let response = bridge(&mock).submit_print_job(print_request("/tspl", LABEL));

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body.contains("short write"));
        assert_eq!(mock.count(MockStep::ReleaseInterface), 1);
    }

    #[test]
    fn test_busy_interface_is_500() {
        let mock = MockAccess::new().fail_on(MockStep::ClaimInterface, rusb::Error::Busy);
        let response = bridge(&mock).submit_print_job(print_request("/tspl", LABEL));

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body.contains("claim interface 0 failed"));
        assert_eq!(mock.count(MockStep::Write), 0);
        assert_eq!(mock.count(MockStep::ReleaseInterface), 0);
    }

    #[test]
    fn test_set_configuration_failure_is_500() {
        let mock = MockAccess::new().fail_on(MockStep::SetConfiguration, rusb::Error::Busy);
        let response = bridge(&mock).submit_print_job(print_request("/tspl", LABEL));

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body.contains("set configuration failed"));
        assert_eq!(mock.count(MockStep::ClaimInterface), 0);
    }

    #[test]
    fn test_write_error_wins_over_release_error() {
        let mock = MockAccess::new()
            .fail_on(MockStep::Write, rusb::Error::Pipe)
            .fail_on(MockStep::ReleaseInterface, rusb::Error::NoDevice);
        let response = bridge(&mock).submit_print_job(print_request("/tspl", LABEL));

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body.contains("write to endpoint"));
        assert!(!response.body.contains("release interface"));
        assert_eq!(mock.count(MockStep::ReleaseInterface), 1);
    }

    #[test]
    fn test_release_error_after_good_write_is_500() {
        let mock = MockAccess::new().fail_on(MockStep::ReleaseInterface, rusb::Error::NoDevice);
        let response = bridge(&mock).submit_print_job(print_request("/tspl", LABEL));

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body.contains("release interface 0 failed"));
        assert_eq!(mock.written(), vec![LABEL.to_vec()]);
    }

    #[test]
    fn test_kernel_driver_is_detached_first() {
        let mock = MockAccess::new().with_kernel_driver();
        let response = bridge(&mock).submit_print_job(print_request("/tspl", LABEL));

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            &mock.calls()[1..4],
            &[
                MockCall::KernelDriverActive(0),
                MockCall::DetachKernelDriver(0),
                MockCall::SetConfiguration,
            ]
        );
    }

    #[test]
    fn test_kernel_driver_query_unsupported_is_ignored() {
        let mock =
            MockAccess::new().fail_on(MockStep::KernelDriverActive, rusb::Error::NotSupported);
        let response = bridge(&mock).submit_print_job(print_request("/tspl", LABEL));

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(mock.count(MockStep::DetachKernelDriver), 0);
    }

    #[test]
    fn test_detach_failure_is_propagated() {
        let mock = MockAccess::new()
            .with_kernel_driver()
            .fail_on(MockStep::DetachKernelDriver, rusb::Error::Access);
        let response = bridge(&mock).submit_print_job(print_request("/tspl", LABEL));

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body.contains("detach kernel driver from interface 0"));
        assert_eq!(mock.count(MockStep::ClaimInterface), 0);
    }

    #[test]
    fn test_kernel_driver_query_failure_is_propagated() {
        let mock = MockAccess::new().fail_on(MockStep::KernelDriverActive, rusb::Error::Access);
        let response = bridge(&mock).submit_print_job(print_request("/tspl", LABEL));

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body.contains("query kernel driver on interface 0 failed"));
        assert_eq!(mock.count(MockStep::DetachKernelDriver), 0);
        assert_eq!(mock.count(MockStep::SetConfiguration), 0);
        assert_eq!(mock.count(MockStep::ClaimInterface), 0);
    }

    #[test]
    fn test_detach_unsupported_is_ignored() {
        let mock = MockAccess::new()
            .with_kernel_driver()
            .fail_on(MockStep::DetachKernelDriver, rusb::Error::NotSupported);
        let response = bridge(&mock).submit_print_job(print_request("/tspl", LABEL));

        assert_eq!(response.status, StatusCode::OK);
    }

    #[test]
    fn test_truncated_body_is_500_without_device_access() {
        let mock = MockAccess::new();
        let request = PrintRequest {
            headers: headers("application/tspl", LABEL.len() + 10),
            ..print_request("/tspl", LABEL)
        };

        let response = bridge(&mock).submit_print_job(request);
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body.contains("failed to read print payload"));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_repeated_jobs_are_independent() {
        let mock = MockAccess::new();
        let bridge = bridge(&mock);

        assert_eq!(
            bridge.submit_print_job(print_request("/tspl", LABEL)),
            PrintResponse::ok()
        );
        assert_eq!(
            bridge.submit_print_job(print_request("/tspl", LABEL)),
            PrintResponse::ok()
        );

        assert_eq!(mock.count(MockStep::Open), 2);
        assert_eq!(mock.count(MockStep::ClaimInterface), 2);
        assert_eq!(mock.count(MockStep::ReleaseInterface), 2);
        assert_eq!(mock.written(), vec![LABEL.to_vec(), LABEL.to_vec()]);
    }

    #[test]
    fn test_serialized_access_lets_concurrent_jobs_succeed() {
        let mock = MockAccess::new().with_write_delay(Duration::from_millis(50));
        let settings = PrinterSettings {
            serialize_access: true,
            ..PrinterSettings::default()
        };
        let bridge = Arc::new(PrintBridge::new(mock.clone(), settings));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let bridge = Arc::clone(&bridge);
                thread::spawn(move || bridge.submit_print_job(print_request("/tspl", LABEL)))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), PrintResponse::ok());
        }
        assert_eq!(mock.count(MockStep::Write), 4);
    }

    #[test]
    fn test_unserialized_overlap_surfaces_busy() {
        let mock = MockAccess::new().with_write_delay(Duration::from_millis(300));
        let bridge = Arc::new(bridge(&mock));

        let first = {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || bridge.submit_print_job(print_request("/tspl", LABEL)))
        };

        // Wait until the first job holds the claim
        while mock.count(MockStep::Write) == 0 {
            thread::sleep(Duration::from_millis(5));
        }

        let second = bridge.submit_print_job(print_request("/tspl", LABEL));
        assert_eq!(second.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(second.body.contains("claim interface 0 failed"));

        assert_eq!(first.join().unwrap(), PrintResponse::ok());
    }

    #[test]
    fn test_read_payload() {
        let payload = read_payload(&headers("application/tspl", 3), &b"CLS\n"[..]).unwrap();
        assert_eq!(payload, b"CLS");

        let payload = read_payload(&HeaderMap::new(), &b"ignored"[..]).unwrap();
        assert!(payload.is_empty());

        let mut bad = HeaderMap::new();
        bad.insert(header::CONTENT_LENGTH, HeaderValue::from_static("ten"));
        let err = read_payload(&bad, &b""[..]).unwrap_err();
        assert!(err.to_string().contains("invalid content-length"));
    }
}
