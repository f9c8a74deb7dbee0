// Session module - Connection lifecycle and exchanges
pub mod manager;
pub mod state;

pub use manager::{ConnectOutcome, SerialSession};
pub use state::{ConnectionState, ExchangeStatus};
