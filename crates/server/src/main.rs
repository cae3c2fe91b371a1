//! tspl-bridge Server
//!
//! HTTP-to-USB bridge for TSPL label printers. Accepts `POST .../tspl` with
//! `content-type: application/tspl` and writes the body to the printer.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tspl_bridge::config::ServerConfig;
use tspl_bridge::usb::RusbAccess;
use tspl_bridge::{PrintBridge, http, service};
use tspl_common::{DeviceIdentity, setup_logging};

#[derive(Parser, Debug)]
#[command(name = "tspl-bridge")]
#[command(
    author,
    version,
    about = "TSPL print bridge - Send label jobs to a USB printer over HTTP"
)]
#[command(long_about = "
Forwards raw TSPL print jobs received over HTTP to a USB label printer.

EXAMPLES:
    # Run with default config (port 80, printer 1fc9:2016)
    tspl-bridge

    # Run with custom config
    tspl-bridge --config /path/to/config.toml

    # Drive a different printer on another port
    tspl-bridge --device 04f9:2042 --bind 0.0.0.0:8080

    # List USB devices without starting server
    tspl-bridge --list-devices

    # Print a label
    curl -X POST -H 'content-type: application/tspl' --data-binary @label.tspl http://host/tspl

CONFIGURATION:
    The server looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/tspl-bridge/server.toml
    3. /etc/tspl-bridge/server.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Listen address, overrides the config file
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Printer vendor:product id in hex, overrides the config file
    #[arg(short, long, value_name = "VID:PID")]
    device: Option<DeviceIdentity>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = ServerConfig::default();
        let path = ServerConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        ServerConfig::load(path).context("Failed to load configuration")?
    } else {
        ServerConfig::load_or_default().context("Failed to load configuration")?
    };

    if let Some(level) = args.log_level {
        config.server.log_level = level;
    }
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if let Some(device) = args.device {
        config.printer.device = device;
    }
    config.validate().context("Invalid configuration")?;

    setup_logging(&config.server.log_level).context("Failed to setup logging")?;

    info!("tspl-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", config.server.log_level);

    let access = RusbAccess::new().context("Failed to initialize USB")?;

    if args.list_devices {
        return list_devices_mode(&access, config.printer.device);
    }

    run_server(config, access).await
}

/// List USB devices and exit
fn list_devices_mode(access: &RusbAccess, printer: DeviceIdentity) -> Result<()> {
    info!("Listing USB devices...");

    let devices = access.list_devices().context("Failed to list USB devices")?;

    if devices.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }

    println!("Found {} USB device(s):\n", devices.len());
    for device in devices {
        let marker = if device.identity == printer {
            " (configured printer)"
        } else {
            ""
        };
        println!(
            "  {} - {} {}{}",
            device.identity,
            device
                .manufacturer
                .as_deref()
                .unwrap_or("Unknown Manufacturer"),
            device.product.as_deref().unwrap_or("Unknown Product"),
            marker
        );
        println!(
            "      Bus {:03} Device {:03}",
            device.bus_number, device.device_address
        );
        if let Some(serial) = &device.serial_number {
            println!("      Serial: {}", serial);
        }
        println!();
    }

    Ok(())
}

/// Serve print jobs until Ctrl+C
async fn run_server(config: ServerConfig, access: RusbAccess) -> Result<()> {
    let addr = config.bind_addr()?;
    let printer = config.printer.device;
    let serialized = config.printer.serialize_access;

    let bridge = Arc::new(PrintBridge::new(access, config.printer));
    let app = http::router(bridge);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on: {}", addr);
    info!(
        "Printing to {} ({} device access)",
        printer,
        if serialized { "serialized" } else { "unserialized" }
    );

    if service::is_systemd() {
        info!("Running under systemd");
    }
    service::notify_ready().context("Failed to notify systemd ready")?;
    service::notify_status(&format!("Forwarding print jobs to {}", printer))
        .context("Failed to send status to systemd")?;

    info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    if let Err(e) = service::notify_stopping() {
        error!("Failed to notify systemd stopping: {:#}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => error!("Error waiting for Ctrl+C: {}", e),
    }
}
