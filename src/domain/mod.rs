// Domain module - Errors and configuration shared by every layer
pub mod config;
pub mod error;
