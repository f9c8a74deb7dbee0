// Infrastructure module - External dependencies and adapters
pub mod serial;
pub mod simulated;
pub mod logging;
pub mod config;
