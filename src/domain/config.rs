use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed line rate expected by the IR firmware.
pub const BAUD_RATE: u32 = 115_200;

/// irbridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Global configuration
    #[serde(default)]
    pub global: GlobalConfig,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Overall deadline for a RECEIVE exchange in milliseconds
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_ms: u64,
    /// Deadline for a single write in milliseconds
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
    /// Per-call read budget inside the receive loop in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Pause after opening before the link is declared connected
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    /// How long callers wait for a permission answer
    #[serde(default = "default_permission_timeout")]
    pub permission_timeout_ms: u64,
}

/// Serial line parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: ParityConfig,
}

/// Parity configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    None,
    Odd,
    Even,
}

/// Timing knobs used by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub receive_timeout: Duration,
    pub write_timeout: Duration,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_receive_timeout() -> u64 {
    5000
}

fn default_write_timeout() -> u64 {
    1000
}

fn default_poll_interval() -> u64 {
    50
}

fn default_settle_delay() -> u64 {
    50
}

fn default_permission_timeout() -> u64 {
    30_000
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            receive_timeout_ms: default_receive_timeout(),
            write_timeout_ms: default_write_timeout(),
            poll_interval_ms: default_poll_interval(),
            settle_delay_ms: default_settle_delay(),
            permission_timeout_ms: default_permission_timeout(),
        }
    }
}

impl GlobalConfig {
    pub fn permission_timeout(&self) -> Duration {
        Duration::from_millis(self.permission_timeout_ms)
    }
}

impl Default for LineSettings {
    /// 115200 8N1
    fn default() -> Self {
        Self {
            baud_rate: BAUD_RATE,
            data_bits: 8,
            stop_bits: 1,
            parity: ParityConfig::None,
        }
    }
}

impl Default for ParityConfig {
    fn default() -> Self {
        ParityConfig::None
    }
}

impl std::fmt::Display for LineSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parity = match self.parity {
            ParityConfig::None => 'N',
            ParityConfig::Odd => 'O',
            ParityConfig::Even => 'E',
        };
        write!(f, "{} {}{}{}", self.baud_rate, self.data_bits, parity, self.stop_bits)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&GlobalConfig::default())
    }
}

impl From<&GlobalConfig> for SessionSettings {
    fn from(global: &GlobalConfig) -> Self {
        Self {
            receive_timeout: Duration::from_millis(global.receive_timeout_ms),
            write_timeout: Duration::from_millis(global.write_timeout_ms),
            // A zero budget would turn the read loop into a hot spin.
            poll_interval: Duration::from_millis(global.poll_interval_ms.max(1)),
            settle_delay: Duration::from_millis(global.settle_delay_ms),
        }
    }
}
