//! Server configuration management
//!
//! Every setting has a built-in default matching the reference deployment
//! (port 80, printer `1fc9:2016`, interface 0, endpoint 1, `POST .../tspl`
//! with `application/tspl`), so a configuration file is optional.

use crate::usb::transfers::is_out_endpoint;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tspl_common::DeviceIdentity;

/// Printer the bridge drives unless configured otherwise
pub const DEFAULT_DEVICE: DeviceIdentity = DeviceIdentity::new(0x1fc9, 0x2016);
/// Path suffix of the print endpoint
pub const PRINT_ROUTE_SUFFIX: &str = "/tspl";
/// Media type a print job must declare
pub const TSPL_CONTENT_TYPE: &str = "application/tspl";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub printer: PrinterSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen address for the HTTP server
    pub bind_addr: String,
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:80".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Which printer to drive and which requests count as print jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterSettings {
    /// USB vendor/product id, e.g. "1fc9:2016"
    pub device: DeviceIdentity,
    /// Interface number to claim
    pub interface: u8,
    /// OUT endpoint address the payload is written to
    pub endpoint: u8,
    pub route_suffix: String,
    pub content_type: String,
    /// Hold a lock across claim, write and release so concurrent requests
    /// wait for each other instead of failing with "busy"
    pub serialize_access: bool,
    /// Largest request body accepted
    pub max_payload_bytes: usize,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE,
            interface: 0,
            endpoint: 1,
            route_suffix: PRINT_ROUTE_SUFFIX.to_string(),
            content_type: TSPL_CONTENT_TYPE.to_string(),
            serialize_access: false,
            max_payload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the specified path
    pub fn load(path: &Path) -> Result<Self> {
        let config_path = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load the first of `candidates` that exists
    ///
    /// Returns `Ok(None)` only when none exist. A file that exists but fails
    /// to read, parse or validate is an error, never skipped.
    pub fn load_first(candidates: &[PathBuf]) -> Result<Option<Self>> {
        match candidates.iter().find(|p| p.exists()) {
            Some(path) => Self::load(path).map(Some),
            None => Ok(None),
        }
    }

    /// Standard configuration locations, in lookup order
    pub fn candidate_paths() -> Vec<PathBuf> {
        vec![
            Self::default_path(),
            PathBuf::from("/etc/tspl-bridge/server.toml"),
        ]
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the standard locations, or return defaults if
    /// no file exists there
    pub fn load_or_default() -> Result<Self> {
        Ok(Self::load_first(&Self::candidate_paths())?.unwrap_or_default())
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("tspl-bridge").join("server.toml")
        } else {
            PathBuf::from(".config/tspl-bridge/server.toml")
        }
    }

    /// Parsed listen address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind_addr
            .parse()
            .with_context(|| format!("Invalid bind address '{}'", self.server.bind_addr))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.server.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.server.log_level,
                valid_levels.join(", ")
            ));
        }

        self.bind_addr()?;

        let printer = &self.printer;
        if !printer.route_suffix.starts_with('/') {
            return Err(anyhow!(
                "Invalid route suffix '{}', must start with '/'",
                printer.route_suffix
            ));
        }

        if printer.content_type.trim().is_empty() {
            return Err(anyhow!("Printer content type must not be empty"));
        }

        if !is_out_endpoint(printer.endpoint) {
            return Err(anyhow!(
                "Invalid endpoint {:#04x}, must be an OUT endpoint address (0x01-0x0f)",
                printer.endpoint
            ));
        }

        if printer.max_payload_bytes == 0 {
            return Err(anyhow!("max_payload_bytes must be greater than 0"));
        }

        Ok(())
    }
}
