//! HTTP surface
//!
//! A single fallback handler receives every request, so the print route can
//! match any path that ends with the configured suffix. Routing is decided
//! before the body is read; the device work runs on the blocking pool.

use crate::bridge::{PrintBridge, PrintRequest, PrintResponse};
use crate::error::PrintError;
use crate::usb::DeviceAccess;
use axum::Router;
use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::io::{self, Cursor};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Build the router serving print jobs for `bridge`
pub fn router<A>(bridge: Arc<PrintBridge<A>>) -> Router
where
    A: DeviceAccess + 'static,
{
    Router::new()
        .fallback(handle_print::<A>)
        .with_state(bridge)
}

impl IntoResponse for PrintResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, "text/plain")],
            self.body,
        )
            .into_response()
    }
}

async fn handle_print<A>(State(bridge): State<Arc<PrintBridge<A>>>, request: Request) -> Response
where
    A: DeviceAccess + 'static,
{
    let (parts, body) = request.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();

    let response = match bridge.route(&parts.method, &path, &parts.headers) {
        Err(rejection) => {
            debug!("Rejected {} {}: {:?}", method, path, rejection);
            PrintResponse::from(rejection)
        }
        Ok(()) => match to_bytes(body, bridge.settings().max_payload_bytes).await {
            Err(e) => {
                let err = PrintError::Payload(io::Error::other(e.to_string()));
                error!("{}", err);
                PrintResponse::from_error(&err)
            }
            Ok(bytes) => {
                let job = PrintRequest {
                    method: parts.method,
                    path: path.clone(),
                    headers: parts.headers,
                    body: Cursor::new(bytes),
                };
                let bridge = Arc::clone(&bridge);

                match tokio::task::spawn_blocking(move || bridge.submit_print_job(job)).await {
                    Ok(response) => response,
                    Err(e) => {
                        error!("Print task failed: {}", e);
                        PrintResponse {
                            status: StatusCode::INTERNAL_SERVER_ERROR,
                            body: format!("print task failed: {}", e),
                        }
                    }
                }
            }
        },
    };

    info!("{} {} -> {}", method, path, response.status.as_u16());
    response.into_response()
}
