// Protocol module - Line framing and command/response exchange
pub mod exchange;
pub mod frame;

pub use exchange::{receive_payload, write_command, ReceiveOptions};
pub use frame::{Command, Frame, LineBuffer, PAYLOAD_PREFIX, WAITING_LINE};
