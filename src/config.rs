/// Centralized configuration constants for wifista
use std::time::Duration;

use crate::wifi::AuthThreshold;

// Retry policy
pub const MAX_CONNECT_ATTEMPTS: u8 = 3;

// Timing
pub const SETTLE_DELAY_MS: u64 = 100;
pub const CONNECTION_TIMEOUT_SECS: u64 = 30;
pub const SCAN_DELAY_MS: u64 = 2000;

// Scan
pub const DEFAULT_SCAN_CAPACITY: u16 = 20;

// Ping
pub const DEFAULT_PING_COUNT: u32 = 4;
pub const PING_INTERVAL_MS: u32 = 1000;
pub const PING_TIMEOUT_MS: u32 = 1000;
pub const PING_PAYLOAD_SIZE: u16 = 64;

// Field bounds
pub const SSID_MAX_LEN: usize = 32;
pub const PASSWORD_MAX_LEN: usize = 64;

// Weakest authentication mode a station will join
pub const MIN_AUTH_THRESHOLD: AuthThreshold = AuthThreshold::Wpa2Personal;

/// Tunables for a [`ConnectionManager`](crate::wifi::ConnectionManager)
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub max_attempts: u8,
    pub settle_delay: Duration,
    pub connect_timeout: Duration,
    pub auth_threshold: AuthThreshold,
    pub ping_interval_ms: u32,
    pub ping_timeout_ms: u32,
    pub ping_payload_size: u16,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            max_attempts: MAX_CONNECT_ATTEMPTS,
            settle_delay: Duration::from_millis(SETTLE_DELAY_MS),
            connect_timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
            auth_threshold: MIN_AUTH_THRESHOLD,
            ping_interval_ms: PING_INTERVAL_MS,
            ping_timeout_ms: PING_TIMEOUT_MS,
            ping_payload_size: PING_PAYLOAD_SIZE,
        }
    }
}

impl ManagerConfig {
    pub fn with_max_attempts(mut self, max_attempts: u8) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}
