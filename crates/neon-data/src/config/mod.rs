//! Connection and file loading configuration

pub mod connection_config;
pub mod null_handling;

pub use connection_config::*;
pub use null_handling::*;
