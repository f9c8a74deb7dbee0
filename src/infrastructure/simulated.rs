//! In-memory stand-in for an attached IR bridge.
//!
//! Used by `--simulate` to exercise the full stack without hardware, and by
//! tests to script exact byte sequences, faults and permission answers.

use crate::core::protocol::{PAYLOAD_PREFIX, WAITING_LINE};
use crate::core::transport::{DeviceInfo, LineSettings, PermissionNotifier, Transport, TransportLink};
use crate::domain::error::{BridgeError, BridgeResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// One scripted response to a `read_chunk` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStep {
    Bytes(Vec<u8>),
    /// Nothing arrives for this long
    Silence(Duration),
    Fault(String),
}

/// How `request_access` is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionPolicy {
    /// Granted immediately
    Grant,
    /// Denied immediately
    Deny,
    /// Held until `answer_permission` is called
    Manual,
}

/// Failure injected into `open`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    DeviceUnavailable,
    DriverMismatch,
    AccessDenied,
}

#[derive(Debug)]
struct Firmware {
    capture: String,
    capture_delay: Duration,
}

struct SimState {
    devices: Vec<DeviceInfo>,
    access_granted: bool,
    permission: PermissionPolicy,
    held_request: Option<(DeviceInfo, PermissionNotifier)>,
    open_failure: Option<OpenFailure>,
    open_delay: Duration,
    access_check_delay: Duration,
    setup_fails: bool,
    write_timeout: bool,
    firmware: Option<Firmware>,
    reads: VecDeque<ReadStep>,
    written: Vec<u8>,
    sent_payloads: Vec<String>,
    line_settings: Option<LineSettings>,
    control_lines: Option<(bool, bool)>,
    open_count: usize,
    close_count: usize,
    read_calls: usize,
    write_calls: usize,
    access_requests: usize,
}

/// Scripted transport with one device attached by default
#[derive(Clone)]
pub struct SimulatedTransport {
    state: Arc<Mutex<SimState>>,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl SimulatedTransport {
    pub const DEFAULT_PORT: &'static str = "/dev/ttySIM0";

    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                devices: vec![DeviceInfo::new(Self::DEFAULT_PORT).with_usb_ids(0x2341, 0x0043)],
                access_granted: true,
                permission: PermissionPolicy::Grant,
                held_request: None,
                open_failure: None,
                open_delay: Duration::ZERO,
                access_check_delay: Duration::ZERO,
                setup_fails: false,
                write_timeout: false,
                firmware: None,
                reads: VecDeque::new(),
                written: Vec::new(),
                sent_payloads: Vec::new(),
                line_settings: None,
                control_lines: None,
                open_count: 0,
                close_count: 0,
                read_calls: 0,
                write_calls: 0,
                access_requests: 0,
            })),
        }
    }

    /// A device that behaves like the IR firmware: `RECEIVE` is answered with
    /// the waiting line and, after `capture_delay`, the given capture.
    pub fn ir_device(capture: impl Into<String>, capture_delay: Duration) -> Self {
        let transport = Self::new();
        lock(&transport.state).firmware = Some(Firmware {
            capture: capture.into(),
            capture_delay,
        });
        transport
    }

    pub fn with_devices(self, devices: Vec<DeviceInfo>) -> Self {
        lock(&self.state).devices = devices;
        self
    }

    /// Start without access so `connect` goes through the permission flow.
    pub fn without_access(self, policy: PermissionPolicy) -> Self {
        {
            let mut state = lock(&self.state);
            state.access_granted = false;
            state.permission = policy;
        }
        self
    }

    pub fn fail_open(self, failure: OpenFailure) -> Self {
        lock(&self.state).open_failure = Some(failure);
        self
    }

    pub fn open_delay(self, delay: Duration) -> Self {
        lock(&self.state).open_delay = delay;
        self
    }

    /// `has_access` blocks for `delay`, like a slow device node check
    pub fn access_check_delay(self, delay: Duration) -> Self {
        lock(&self.state).access_check_delay = delay;
        self
    }

    /// DTR/RTS and purge calls fail
    pub fn fail_setup(self) -> Self {
        lock(&self.state).setup_fails = true;
        self
    }

    pub fn fail_writes_with_timeout(self) -> Self {
        lock(&self.state).write_timeout = true;
        self
    }

    pub fn push_read(&self, step: ReadStep) {
        lock(&self.state).reads.push_back(step);
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        self.push_read(ReadStep::Bytes(bytes.to_vec()));
    }

    /// Answer a request held under `PermissionPolicy::Manual`.
    /// Returns false if no request was outstanding.
    pub fn answer_permission(&self, granted: bool) -> bool {
        let held = {
            let mut state = lock(&self.state);
            if granted {
                state.access_granted = true;
            }
            state.held_request.take()
        };
        match held {
            Some((device, notifier)) => notifier.notify(&device.id, granted),
            None => false,
        }
    }

    /// Deliver an answer for an arbitrary device id
    pub fn answer_for(&self, device_id: &str, granted: bool) -> bool {
        let state = lock(&self.state);
        match &state.held_request {
            Some((_, notifier)) => notifier.notify(device_id, granted),
            None => false,
        }
    }

    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).written.clone()
    }

    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&lock(&self.state).written).to_string()
    }

    /// Payloads the firmware saw in `SEND:` commands
    pub fn sent_payloads(&self) -> Vec<String> {
        lock(&self.state).sent_payloads.clone()
    }

    pub fn line_settings(&self) -> Option<LineSettings> {
        lock(&self.state).line_settings
    }

    pub fn control_lines(&self) -> Option<(bool, bool)> {
        lock(&self.state).control_lines
    }

    pub fn open_count(&self) -> usize {
        lock(&self.state).open_count
    }

    pub fn close_count(&self) -> usize {
        lock(&self.state).close_count
    }

    pub fn read_calls(&self) -> usize {
        lock(&self.state).read_calls
    }

    pub fn write_calls(&self) -> usize {
        lock(&self.state).write_calls
    }

    pub fn access_requests(&self) -> usize {
        lock(&self.state).access_requests
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimulatedTransport {
    fn name(&self) -> &str {
        "simulated"
    }

    fn enumerate(&self) -> BridgeResult<Vec<DeviceInfo>> {
        Ok(lock(&self.state).devices.clone())
    }

    fn has_access(&self, _device: &DeviceInfo) -> bool {
        let delay = lock(&self.state).access_check_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        lock(&self.state).access_granted
    }

    fn request_access(&self, device: &DeviceInfo, notifier: PermissionNotifier) {
        let mut state = lock(&self.state);
        state.access_requests += 1;
        match state.permission {
            PermissionPolicy::Grant => {
                state.access_granted = true;
                notifier.grant(device);
            }
            PermissionPolicy::Deny => {
                notifier.deny(device);
            }
            PermissionPolicy::Manual => {
                state.held_request = Some((device.clone(), notifier));
            }
        }
    }

    fn open(&self, device: &DeviceInfo, settings: &LineSettings) -> BridgeResult<Box<dyn TransportLink>> {
        let delay = {
            let mut state = lock(&self.state);
            state.open_count += 1;
            state.open_delay
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = lock(&self.state);
        match state.open_failure {
            Some(OpenFailure::DeviceUnavailable) => {
                return Err(BridgeError::DeviceUnavailable(device.port_name.clone()))
            }
            Some(OpenFailure::DriverMismatch) => {
                return Err(BridgeError::DriverMismatch(device.port_name.clone()))
            }
            Some(OpenFailure::AccessDenied) => return Err(BridgeError::AccessDenied),
            None => {}
        }
        if !state.access_granted {
            return Err(BridgeError::AccessDenied);
        }
        if !state.devices.iter().any(|d| d.id == device.id) {
            return Err(BridgeError::DeviceUnavailable(device.port_name.clone()));
        }

        state.line_settings = Some(*settings);
        debug!("Simulated device {} opened at {}", device, settings);
        Ok(Box::new(SimLink {
            state: Arc::clone(&self.state),
            closed: false,
            pending_line: Vec::new(),
        }))
    }
}

struct SimLink {
    state: Arc<Mutex<SimState>>,
    closed: bool,
    pending_line: Vec<u8>,
}

impl SimLink {
    fn ensure_open(&self) -> BridgeResult<()> {
        if self.closed {
            return Err(BridgeError::IoFault("link closed".to_string()));
        }
        Ok(())
    }

    /// Emulate the firmware reacting to a complete command line.
    fn react(state: &mut SimState, line: &str) {
        let line = line.trim();
        if let Some(payload) = line.strip_prefix("SEND:") {
            state.sent_payloads.push(payload.to_string());
            return;
        }
        if line != "RECEIVE" {
            return;
        }
        if let Some(firmware) = &state.firmware {
            let waiting = format!("{}\r\n", WAITING_LINE).into_bytes();
            let capture = if firmware.capture.starts_with(PAYLOAD_PREFIX) {
                format!("{}\r\n", firmware.capture)
            } else {
                format!("{}{}\r\n", PAYLOAD_PREFIX, firmware.capture)
            };
            let delay = firmware.capture_delay;
            state.reads.push_back(ReadStep::Bytes(waiting));
            state.reads.push_back(ReadStep::Silence(delay));
            state.reads.push_back(ReadStep::Bytes(capture.into_bytes()));
        }
    }
}

impl TransportLink for SimLink {
    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> BridgeResult<usize> {
        self.ensure_open()?;
        let step = {
            let mut state = lock(&self.state);
            state.read_calls += 1;
            state.reads.pop_front()
        };

        match step {
            Some(ReadStep::Bytes(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    lock(&self.state)
                        .reads
                        .push_front(ReadStep::Bytes(bytes[n..].to_vec()));
                }
                Ok(n)
            }
            Some(ReadStep::Silence(duration)) => {
                let wait = duration.min(timeout);
                std::thread::sleep(wait);
                if duration > wait {
                    lock(&self.state)
                        .reads
                        .push_front(ReadStep::Silence(duration - wait));
                }
                Ok(0)
            }
            Some(ReadStep::Fault(message)) => Err(BridgeError::IoFault(message)),
            None => {
                std::thread::sleep(timeout);
                Ok(0)
            }
        }
    }

    fn write_bytes(&mut self, data: &[u8], _timeout: Duration) -> BridgeResult<()> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        state.write_calls += 1;
        if state.write_timeout {
            return Err(BridgeError::WriteTimeout);
        }
        state.written.extend_from_slice(data);

        self.pending_line.extend_from_slice(data);
        while let Some(end) = self.pending_line.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending_line.drain(..=end).collect();
            Self::react(&mut state, &String::from_utf8_lossy(&line));
        }
        Ok(())
    }

    fn set_control_lines(&mut self, dtr: bool, rts: bool) -> BridgeResult<()> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        if state.setup_fails {
            return Err(BridgeError::IoFault("control lines not supported".to_string()));
        }
        state.control_lines = Some((dtr, rts));
        Ok(())
    }

    fn purge(&mut self, _input: bool, _output: bool) -> BridgeResult<()> {
        self.ensure_open()?;
        if lock(&self.state).setup_fails {
            return Err(BridgeError::IoFault("purge not supported".to_string()));
        }
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            lock(&self.state).close_count += 1;
        }
    }
}
