//! Station-mode Wi-Fi connection manager.
//!
//! Brings up the radio, scans for access points, joins a network with
//! bounded automatic retry, and runs ping diagnostics, all driven by
//! asynchronous notifications from an underlying [`wifi::WifiDriver`].

pub mod config;
pub mod error;
pub mod wifi;

pub use config::ManagerConfig;
pub use error::{DriverError, WifiError, WifiResult};
pub use wifi::{AccessPointRecord, ConnectionManager, ConnectionOutcome, PingReport};
