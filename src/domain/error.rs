use thiserror::Error;

/// irbridge unified error type
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("No serial device found")]
    NoDeviceFound,

    #[error("Access to device was denied")]
    AccessDenied,

    #[error("No compatible driver for device: {0}")]
    DriverMismatch(String),

    #[error("Device is no longer available: {0}")]
    DeviceUnavailable(String),

    #[error("I/O fault: {0}")]
    IoFault(String),

    #[error("Write timed out")]
    WriteTimeout,

    #[error("Timed out waiting for a signal")]
    Timeout,

    #[error("Unexpected response: {0}")]
    ProtocolMismatch(String),

    #[error("Another exchange is already in progress")]
    Busy,

    #[error("Device not connected")]
    NotConnected,

    #[error("Session closed")]
    Closed,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Output error: {0}")]
    Output(String),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Faults after which the link can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::IoFault(_)
                | BridgeError::DeviceUnavailable(_)
                | BridgeError::Serial(_)
                | BridgeError::Io(_)
        )
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(BridgeError::IoFault("unplugged".to_string()).is_fatal());
        assert!(BridgeError::DeviceUnavailable("/dev/ttyUSB0".to_string()).is_fatal());
        assert!(!BridgeError::Timeout.is_fatal());
        assert!(!BridgeError::WriteTimeout.is_fatal());
        assert!(!BridgeError::Busy.is_fatal());
        assert!(!BridgeError::AccessDenied.is_fatal());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(BridgeError::NoDeviceFound.to_string(), "No serial device found");
        assert_eq!(
            BridgeError::IoFault("broken pipe".to_string()).to_string(),
            "I/O fault: broken pipe"
        );
        assert!(BridgeError::Config { message: "bad key".to_string() }
            .to_string()
            .contains("bad key"));
    }
}
