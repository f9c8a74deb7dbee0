use crate::domain::error::BridgeResult;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

pub use crate::domain::config::LineSettings;

/// Identity used to key permission answers to a device
pub type DeviceId = String;

/// Descriptor of an attached serial device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub port_name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl DeviceInfo {
    /// Descriptor with no USB metadata; the port name doubles as the id.
    pub fn new(port_name: impl Into<String>) -> Self {
        let port_name = port_name.into();
        Self {
            id: port_name.clone(),
            port_name,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }

    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => write!(f, "{} [{:04x}:{:04x}]", self.port_name, vid, pid),
            _ => write!(f, "{}", self.port_name),
        }
    }
}

/// Answer to an access request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionEvent {
    pub device_id: DeviceId,
    pub granted: bool,
}

/// Delivery handle a transport uses to report a permission answer.
///
/// Answers are keyed by device identity. A session ignores answers for a
/// device it is not waiting on.
#[derive(Debug, Clone)]
pub struct PermissionNotifier {
    sender: mpsc::UnboundedSender<PermissionEvent>,
}

impl PermissionNotifier {
    pub fn new(sender: mpsc::UnboundedSender<PermissionEvent>) -> Self {
        Self { sender }
    }

    /// Returns false when nobody is listening any more.
    pub fn notify(&self, device_id: &str, granted: bool) -> bool {
        self.sender
            .send(PermissionEvent {
                device_id: device_id.to_string(),
                granted,
            })
            .is_ok()
    }

    pub fn grant(&self, device: &DeviceInfo) -> bool {
        self.notify(&device.id, true)
    }

    pub fn deny(&self, device: &DeviceInfo) -> bool {
        self.notify(&device.id, false)
    }
}

/// An open duplex byte channel to one device.
///
/// All calls block for at most their timeout, so callers run them on a
/// blocking worker rather than on the async executor.
pub trait TransportLink: Send {
    /// Read up to `buf.len()` bytes. `Ok(0)` means nothing arrived within `timeout`.
    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> BridgeResult<usize>;

    /// Write the whole buffer or fail with `IoFault` / `WriteTimeout`.
    fn write_bytes(&mut self, data: &[u8], timeout: Duration) -> BridgeResult<()>;

    /// Assert or release DTR and RTS.
    fn set_control_lines(&mut self, dtr: bool, rts: bool) -> BridgeResult<()>;

    /// Discard pending hardware buffers.
    fn purge(&mut self, input: bool, output: bool) -> BridgeResult<()>;

    /// Release the device. Idempotent; underlying errors are swallowed.
    fn close(&mut self);
}

/// Serial backend: device discovery, access control and opening
pub trait Transport: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Attached devices in preference order. An empty list is not an error.
    fn enumerate(&self) -> BridgeResult<Vec<DeviceInfo>>;

    /// Whether the device may be opened right now
    fn has_access(&self, device: &DeviceInfo) -> bool;

    /// Start an access request. Must not block; the answer arrives through `notifier`.
    fn request_access(&self, device: &DeviceInfo, notifier: PermissionNotifier);

    /// Open the device with the given line parameters
    fn open(&self, device: &DeviceInfo, settings: &LineSettings) -> BridgeResult<Box<dyn TransportLink>>;
}
