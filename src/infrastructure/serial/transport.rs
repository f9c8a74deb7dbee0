use crate::core::transport::{DeviceInfo, LineSettings, PermissionNotifier, Transport, TransportLink};
use crate::domain::config::ParityConfig;
use crate::domain::error::{BridgeError, BridgeResult};
use crate::infrastructure::serial::link::SerialPortLink;
use serialport::{SerialPortInfo, SerialPortType};
use std::io;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Initial read timeout; every read sets its own budget.
const OPEN_TIMEOUT: Duration = Duration::from_millis(100);

impl From<SerialPortInfo> for DeviceInfo {
    fn from(info: SerialPortInfo) -> Self {
        let device = DeviceInfo::new(info.port_name);
        match info.port_type {
            SerialPortType::UsbPort(usb) => DeviceInfo {
                manufacturer: usb.manufacturer,
                product: usb.product,
                serial_number: usb.serial_number,
                ..device.with_usb_ids(usb.vid, usb.pid)
            },
            _ => device,
        }
    }
}

/// Sort key: ttyACM* first, then ttyUSB*, each numerically, then the rest by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        return (0, rest.parse().unwrap_or(usize::MAX), basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        return (1, rest.parse().unwrap_or(usize::MAX), basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// Map an open failure onto the bridge taxonomy
fn classify_open_error(device: &DeviceInfo, err: serialport::Error) -> BridgeError {
    match err.kind() {
        serialport::ErrorKind::NoDevice => BridgeError::DeviceUnavailable(device.port_name.clone()),
        serialport::ErrorKind::InvalidInput => {
            BridgeError::DriverMismatch(format!("{}: {}", device.port_name, err))
        }
        serialport::ErrorKind::Io(io::ErrorKind::NotFound) => {
            BridgeError::DeviceUnavailable(device.port_name.clone())
        }
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => BridgeError::AccessDenied,
        _ => BridgeError::IoFault(format!("failed to open {}: {}", device.port_name, err)),
    }
}

fn data_bits(bits: u8) -> BridgeResult<serialport::DataBits> {
    match bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        _ => Err(BridgeError::InvalidInput(format!("Invalid data bits: {}", bits))),
    }
}

fn stop_bits(bits: u8) -> BridgeResult<serialport::StopBits> {
    match bits {
        1 => Ok(serialport::StopBits::One),
        2 => Ok(serialport::StopBits::Two),
        _ => Err(BridgeError::InvalidInput(format!("Invalid stop bits: {}", bits))),
    }
}

/// Transport over the host's serial ports.
///
/// Desktop hosts have no consent dialog: access means the device node can be
/// opened for reading and writing, and an access request re-checks that on
/// a worker thread and reports the outcome.
#[derive(Debug, Clone)]
pub struct SerialPortTransport {
    /// Only list USB serial adapters
    usb_only: bool,
}

impl SerialPortTransport {
    pub fn new() -> Self {
        Self { usb_only: true }
    }

    /// Also list non-USB ports (built-in UARTs, PTYs)
    pub fn include_all_ports(mut self) -> Self {
        self.usb_only = false;
        self
    }
}

impl Default for SerialPortTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Check read/write permission on the device node without opening it.
///
/// Opening a CDC-ACM node toggles DTR and resets many boards, so only the
/// permission bits are consulted here.
#[cfg(unix)]
fn probe_access(device: &DeviceInfo) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(path) = CString::new(std::path::Path::new(&device.port_name).as_os_str().as_bytes()) else {
        return true;
    };
    // SAFETY: `path` is a valid NUL-terminated string that outlives the call.
    if unsafe { libc::access(path.as_ptr(), libc::R_OK | libc::W_OK) } == 0 {
        return true;
    }
    // Missing or busy devices surface as open errors instead.
    io::Error::last_os_error().kind() != io::ErrorKind::PermissionDenied
}

#[cfg(not(unix))]
fn probe_access(_device: &DeviceInfo) -> bool {
    true
}

impl Transport for SerialPortTransport {
    fn name(&self) -> &str {
        "serial"
    }

    fn enumerate(&self) -> BridgeResult<Vec<DeviceInfo>> {
        let mut devices: Vec<DeviceInfo> = serialport::available_ports()?
            .into_iter()
            .filter(|info| !self.usb_only || matches!(info.port_type, SerialPortType::UsbPort(_)))
            .map(DeviceInfo::from)
            .collect();
        devices.sort_by_key(|d| port_sort_key(&d.port_name));
        debug!("Found {} serial device(s)", devices.len());
        Ok(devices)
    }

    fn has_access(&self, device: &DeviceInfo) -> bool {
        probe_access(device)
    }

    fn request_access(&self, device: &DeviceInfo, notifier: PermissionNotifier) {
        let device = device.clone();
        std::thread::spawn(move || {
            let granted = probe_access(&device);
            if !granted {
                warn!(
                    "No read/write permission on {}; add your user to the owning group (e.g. dialout)",
                    device.port_name
                );
            }
            if !notifier.notify(&device.id, granted) {
                debug!("Permission answer for {} had no listener", device.id);
            }
        });
    }

    fn open(&self, device: &DeviceInfo, settings: &LineSettings) -> BridgeResult<Box<dyn TransportLink>> {
        let parity = match settings.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Odd => serialport::Parity::Odd,
            ParityConfig::Even => serialport::Parity::Even,
        };

        let port = serialport::new(&device.port_name, settings.baud_rate)
            .data_bits(data_bits(settings.data_bits)?)
            .stop_bits(stop_bits(settings.stop_bits)?)
            .parity(parity)
            .flow_control(serialport::FlowControl::None)
            .timeout(OPEN_TIMEOUT)
            .open()
            .map_err(|e| classify_open_error(device, e))?;

        info!("Serial port {} opened at {}", device.port_name, settings);
        Ok(Box::new(SerialPortLink::new(port, device.port_name.clone())))
    }
}
