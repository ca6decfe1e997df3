//! Capability boundary to the underlying radio/network driver.
//!
//! The connection manager never talks to hardware directly. Every radio, IP
//! and ICMP operation goes through [`WifiDriver`], and the driver reports
//! asynchronous conditions back over the channel returned by
//! [`WifiDriver::subscribe`].

use crate::error::DriverResult;
use crate::wifi::types::ConnectionConfig;
use std::net::IpAddr;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Notifications raised by the driver on its own execution context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    StationStarted,
    StationDisconnected { reason: u16 },
    GotIp { ip: IpAddr },
}

/// Parameters for a blocking scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    pub show_hidden: bool,
    pub active: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            show_hidden: true,
            active: true,
        }
    }
}

/// Access point as the driver reports it: fixed-width NUL padded name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAccessPoint {
    pub ssid: Vec<u8>,
    pub rssi: i8,
}

/// Identifier of a driver-owned echo session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PingSessionId(pub u32);

/// Echo session parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingConfig {
    pub target: IpAddr,
    pub count: u32,
    pub interval_ms: u32,
    pub timeout_ms: u32,
    pub payload_size: u16,
}

/// Per-session notifications, delivered on the driver's context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingEvent {
    Reply {
        seq: u16,
        ttl: u8,
        size: u32,
        addr: IpAddr,
        elapsed_ms: u32,
    },
    Timeout {
        seq: u16,
        addr: IpAddr,
    },
    End {
        transmitted: u32,
        received: u32,
        total_ms: u32,
    },
}

/// Station-mode radio and IP stack as seen by the connection manager.
///
/// Methods are synchronous and may block briefly (`scan` blocks until the
/// scan completes). Implementations must be callable from any thread.
pub trait WifiDriver: Send + Sync + 'static {
    /// Bring up the TCP/IP infrastructure. `AlreadyInitialized` if done before.
    fn init_network_stack(&self) -> DriverResult<()>;

    /// Create the default event loop. `AlreadyInitialized` if it exists.
    fn create_event_loop(&self) -> DriverResult<()>;

    /// Bind the default station network interface.
    fn create_station_interface(&self) -> DriverResult<()>;

    fn init_driver(&self) -> DriverResult<()>;

    fn deinit_driver(&self) -> DriverResult<()>;

    /// Register for radio and IP-acquisition events.
    fn subscribe(&self) -> DriverResult<UnboundedReceiver<DriverEvent>>;

    /// Drop the event registration; the subscription channel closes.
    fn unsubscribe(&self);

    fn set_station_mode(&self) -> DriverResult<()>;

    /// Start the radio. `AlreadyStarted` if running.
    fn start(&self) -> DriverResult<()>;

    /// Stop the radio. `NotInitialized` if the driver was never set up.
    fn stop(&self) -> DriverResult<()>;

    fn set_config(&self, config: &ConnectionConfig) -> DriverResult<()>;

    fn connect(&self) -> DriverResult<()>;

    /// Re-issue the connect request with the configuration already applied.
    fn reconnect(&self) -> DriverResult<()> {
        self.connect()
    }

    fn disconnect(&self) -> DriverResult<()>;

    /// Blocking scan; returns when results are available.
    fn scan(&self, config: &ScanConfig) -> DriverResult<()>;

    /// Number of access points found by the last scan.
    fn scan_ap_count(&self) -> DriverResult<u16>;

    /// Up to `max` records from the last scan, in driver order.
    fn scan_ap_records(&self, max: u16) -> DriverResult<Vec<RawAccessPoint>>;

    fn ping_new_session(
        &self,
        config: &PingConfig,
        events: UnboundedSender<PingEvent>,
    ) -> DriverResult<PingSessionId>;

    fn ping_start(&self, id: PingSessionId) -> DriverResult<()>;

    /// Release every resource held by the session.
    fn ping_delete_session(&self, id: PingSessionId) -> DriverResult<()>;
}
