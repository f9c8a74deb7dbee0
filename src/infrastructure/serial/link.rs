use crate::core::transport::TransportLink;
use crate::domain::error::{BridgeError, BridgeResult};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Open serial port handle
pub struct SerialPortLink {
    port: Option<Box<dyn SerialPort>>,
    port_name: String,
}

impl SerialPortLink {
    pub fn new(port: Box<dyn SerialPort>, port_name: String) -> Self {
        Self {
            port: Some(port),
            port_name,
        }
    }

    fn port(&mut self) -> BridgeResult<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| BridgeError::IoFault(format!("{} is closed", self.port_name)))
    }

    fn set_timeout(&mut self, timeout: Duration) -> BridgeResult<()> {
        self.port()?
            .set_timeout(timeout)
            .map_err(|e| BridgeError::IoFault(format!("failed to set timeout: {}", e)))
    }
}

impl TransportLink for SerialPortLink {
    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> BridgeResult<usize> {
        self.set_timeout(timeout)?;
        match self.port()?.read(buf) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => {
                warn!("Failed to read from {}: {}", self.port_name, e);
                Err(BridgeError::IoFault(e.to_string()))
            }
        }
    }

    fn write_bytes(&mut self, data: &[u8], timeout: Duration) -> BridgeResult<()> {
        self.set_timeout(timeout)?;
        let port = self.port()?;
        let written = port.write_all(data).and_then(|_| port.flush());
        match written {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Err(BridgeError::WriteTimeout),
            Err(e) => {
                warn!("Failed to write to {}: {}", self.port_name, e);
                Err(BridgeError::IoFault(e.to_string()))
            }
        }
    }

    fn set_control_lines(&mut self, dtr: bool, rts: bool) -> BridgeResult<()> {
        let port = self.port()?;
        port.write_data_terminal_ready(dtr)?;
        port.write_request_to_send(rts)?;
        Ok(())
    }

    fn purge(&mut self, input: bool, output: bool) -> BridgeResult<()> {
        let which = match (input, output) {
            (true, true) => ClearBuffer::All,
            (true, false) => ClearBuffer::Input,
            (false, true) => ClearBuffer::Output,
            (false, false) => return Ok(()),
        };
        self.port()?.clear(which)?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(port) = self.port.take() {
            // Dropping the handle releases the device; flush failures are irrelevant now.
            drop(port);
            info!("Serial port {} closed", self.port_name);
        } else {
            debug!("Serial port {} already closed", self.port_name);
        }
    }
}

impl Drop for SerialPortLink {
    fn drop(&mut self) {
        self.close();
    }
}
