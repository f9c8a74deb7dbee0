use crate::cli::args::OutputFormat;
use crate::core::session::{ConnectionState, ExchangeStatus};
use crate::core::transport::DeviceInfo;
use crate::domain::config::BridgeConfig;
use serde::Serialize;
use std::io;
use std::path::Path;
use tabled::{Table, Tabled};

/// Output writer trait for different formats
pub trait OutputWriter {
    fn write_devices(&self, devices: &[DeviceInfo]) -> Result<(), OutputError>;
    fn write_report(&self, report: &ExchangeReport) -> Result<(), OutputError>;
    fn write_config(&self, config: &BridgeConfig, source: Option<&Path>) -> Result<(), OutputError>;
    fn write_message(&self, message: &str) -> Result<(), OutputError>;
    fn write_error(&self, error: &str) -> Result<(), OutputError>;
}

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("TOML serialization error: {0}")]
    TomlError(#[from] toml::ser::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<OutputError> for crate::domain::error::BridgeError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

/// Snapshot of a session after a command ran
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeReport {
    pub command: String,
    pub state: ConnectionState,
    #[serde(flatten)]
    pub status: ExchangeStatus,
}

impl ExchangeReport {
    pub fn new(command: impl Into<String>, state: ConnectionState, status: ExchangeStatus) -> Self {
        Self {
            command: command.into(),
            state,
            status,
        }
    }
}

/// Console output writer
pub struct ConsoleWriter {
    format: OutputFormat,
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl OutputWriter for ConsoleWriter {
    fn write_devices(&self, devices: &[DeviceInfo]) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                if devices.is_empty() {
                    println!("No serial devices found");
                }
                for device in devices {
                    println!("{}", device);
                    if let Some(product) = &device.product {
                        println!("  Product: {}", product);
                    }
                    if let Some(manufacturer) = &device.manufacturer {
                        println!("  Manufacturer: {}", manufacturer);
                    }
                    if let Some(serial) = &device.serial_number {
                        println!("  Serial: {}", serial);
                    }
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(devices)?);
            }
            OutputFormat::Table => {
                if !devices.is_empty() {
                    let rows: Vec<DeviceTableRow> = devices.iter().map(DeviceTableRow::from).collect();
                    println!("{}", Table::new(rows));
                }
            }
        }
        Ok(())
    }

    fn write_report(&self, report: &ExchangeReport) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                println!("{}", report.status);
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(report)?);
            }
            OutputFormat::Table => {
                println!("{}", Table::new([ReportTableRow::from(report)]));
            }
        }
        Ok(())
    }

    fn write_config(&self, config: &BridgeConfig, source: Option<&Path>) -> Result<(), OutputError> {
        let source = source
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in defaults".to_string());
        match self.format {
            OutputFormat::Text => {
                println!("# Source: {}", source);
                print!("{}", toml::to_string_pretty(config)?);
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(config)?);
            }
            OutputFormat::Table => {
                let global = &config.global;
                let rows = vec![
                    ConfigTableRow::new("source", source),
                    ConfigTableRow::new("log_level", global.log_level.clone()),
                    ConfigTableRow::new("receive_timeout_ms", global.receive_timeout_ms),
                    ConfigTableRow::new("write_timeout_ms", global.write_timeout_ms),
                    ConfigTableRow::new("poll_interval_ms", global.poll_interval_ms),
                    ConfigTableRow::new("settle_delay_ms", global.settle_delay_ms),
                    ConfigTableRow::new("permission_timeout_ms", global.permission_timeout_ms),
                ];
                println!("{}", Table::new(rows));
            }
        }
        Ok(())
    }

    fn write_message(&self, message: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({ "message": message });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => println!("{}", message),
        }
        Ok(())
    }

    fn write_error(&self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({ "error": error });
                eprintln!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => eprintln!("Error: {}", error),
        }
        Ok(())
    }
}

#[derive(Tabled)]
struct DeviceTableRow {
    #[tabled(rename = "Port")]
    port: String,
    #[tabled(rename = "VID:PID")]
    ids: String,
    #[tabled(rename = "Manufacturer")]
    manufacturer: String,
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Serial")]
    serial: String,
}

impl From<&DeviceInfo> for DeviceTableRow {
    fn from(device: &DeviceInfo) -> Self {
        let ids = match (device.vid, device.pid) {
            (Some(vid), Some(pid)) => format!("{:04x}:{:04x}", vid, pid),
            _ => "-".to_string(),
        };
        Self {
            port: device.port_name.clone(),
            ids,
            manufacturer: device.manufacturer.clone().unwrap_or_else(|| "-".to_string()),
            product: device.product.clone().unwrap_or_else(|| "-".to_string()),
            serial: device.serial_number.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[derive(Tabled)]
struct ReportTableRow {
    #[tabled(rename = "Command")]
    command: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&ExchangeReport> for ReportTableRow {
    fn from(report: &ExchangeReport) -> Self {
        Self {
            command: report.command.clone(),
            state: report.state.to_string(),
            status: report.status.to_string(),
        }
    }
}

#[derive(Tabled)]
struct ConfigTableRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl ConfigTableRow {
    fn new(key: &str, value: impl ToString) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}
