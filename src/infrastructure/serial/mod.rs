// Serial module - Transport backed by the host's serial ports
pub mod link;
pub mod transport;

pub use link::SerialPortLink;
pub use transport::SerialPortTransport;
