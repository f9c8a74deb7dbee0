// Core module - Transport abstraction, line protocol and session state machine
pub mod protocol;
pub mod session;
pub mod transport;
