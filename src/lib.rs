//! irbridge Library
//!
//! Line-protocol bridge to USB-serial infrared capture and replay devices:
//! device discovery, permission-gated connect, and one-at-a-time
//! RECEIVE/SEND exchanges with observable connection state.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use domain::error::{BridgeError, BridgeResult};
pub use domain::config::{BridgeConfig, LineSettings, SessionSettings};
pub use core::session::{ConnectOutcome, ConnectionState, ExchangeStatus, SerialSession};
pub use core::transport::{DeviceInfo, Transport, TransportLink};
pub use infrastructure::serial::SerialPortTransport;
pub use infrastructure::simulated::SimulatedTransport;
