//! Station-mode WiFi management for wifista
//!
//! This module provides the connection manager (driver lifecycle, connect
//! with bounded retry, scanning and ping diagnostics), the driver capability
//! it runs against, and the bundled driver implementations.

mod connection;
mod dispatcher;
pub mod driver;
mod lifecycle;
mod manager;
mod ping;
mod scanning;
mod signals;
pub mod sim;
mod types;
#[cfg(windows)]
pub mod windows;

// Re-export public API
pub use driver::{
    DriverEvent, PingConfig, PingEvent, PingSessionId, RawAccessPoint, ScanConfig, WifiDriver,
};
pub use manager::ConnectionManager;
pub use ping::{PingHandle, PingReport};
pub use types::{
    AccessPointRecord, AuthThreshold, ConnectState, ConnectionConfig, ConnectionOutcome,
    Passphrase, Ssid,
};
