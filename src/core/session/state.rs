use serde::Serialize;

/// Connection state published by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Nothing is open
    Disconnected,
    /// An access request is outstanding
    AwaitingPermission,
    /// The link is open and idle
    Connected,
    /// An exchange is running on the open link
    Busy,
}

impl ConnectionState {
    /// Whether a link is held
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Busy)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::AwaitingPermission => write!(f, "Awaiting permission"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Busy => write!(f, "Busy"),
        }
    }
}

/// Outcome of the most recent exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ExchangeStatus {
    /// No exchange has run yet
    Idle,
    /// The device is armed and a capture is awaited
    Waiting,
    /// A capture arrived
    Received(String),
    /// A payload was written to the device
    Sent,
    Error(String),
}

impl ExchangeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExchangeStatus::Idle | ExchangeStatus::Waiting)
    }

    /// Captured payload, if the last exchange produced one
    pub fn payload(&self) -> Option<&str> {
        match self {
            ExchangeStatus::Received(payload) => Some(payload),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeStatus::Idle => write!(f, "No signal received yet"),
            ExchangeStatus::Waiting => write!(f, "Waiting for signal..."),
            ExchangeStatus::Received(payload) => write!(f, "Received: {}", payload),
            ExchangeStatus::Sent => write!(f, "Signal sent"),
            ExchangeStatus::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}
