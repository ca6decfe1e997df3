/// Typed errors for wifista driver and connection-manager operations
use thiserror::Error;

/// Result type alias for connection-manager operations
pub type WifiResult<T> = Result<T, WifiError>;

/// Result type alias for raw driver calls
pub type DriverResult<T> = Result<T, DriverError>;

/// Conditions reported by the underlying radio/network driver
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    #[error("already initialized")]
    AlreadyInitialized,

    #[error("already started")]
    AlreadyStarted,

    #[error("not initialized")]
    NotInitialized,

    #[error("not started")]
    NotStarted,

    #[error("out of memory")]
    NoMemory,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("driver failure (code: {code})")]
    Failure { code: i32 },
}

impl DriverError {
    /// "Already in this state" conditions that setup treats as success
    pub fn is_already(&self) -> bool {
        matches!(self, DriverError::AlreadyInitialized | DriverError::AlreadyStarted)
    }

    /// "Never brought up" conditions that teardown treats as success
    pub fn is_not_ready(&self) -> bool {
        matches!(self, DriverError::NotInitialized | DriverError::NotStarted)
    }
}

/// Errors that can occur during connection-manager operations
#[derive(Error, Debug)]
pub enum WifiError {
    #[error("Failed to {op}: {source}")]
    Driver {
        op: &'static str,
        #[source]
        source: DriverError,
    },

    #[error("SSID must not be empty")]
    SsidEmpty,

    #[error("SSID is {len} bytes, the limit is {max}")]
    SsidTooLong { len: usize, max: usize },

    #[error("Password is {len} bytes, the limit is {max}")]
    PasswordTooLong { len: usize, max: usize },

    #[error("Invalid ping target '{0}': not a numeric IP address")]
    AddressParse(String),

    #[error("Failed to allocate buffer for {0} scan records")]
    Allocation(usize),

    #[error("No tokio runtime available to host the event dispatcher")]
    NoRuntime,

    #[error("Driver event channel closed")]
    EventChannelClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Attach an operation name to a raw driver result
pub trait DriverResultExt<T> {
    /// Surface any driver error verbatim
    fn during(self, op: &'static str) -> WifiResult<T>;
}

impl<T> DriverResultExt<T> for DriverResult<T> {
    fn during(self, op: &'static str) -> WifiResult<T> {
        self.map_err(|source| WifiError::Driver { op, source })
    }
}

/// Absorb "already" conditions during setup
pub fn tolerate_already(result: DriverResult<()>, op: &'static str) -> WifiResult<()> {
    match result {
        Err(e) if e.is_already() => {
            tracing::debug!("{op}: {e}, continuing");
            Ok(())
        }
        other => other.during(op),
    }
}

/// Absorb "not initialized / not started" conditions during teardown
pub fn tolerate_not_ready(result: DriverResult<()>, op: &'static str) -> WifiResult<()> {
    match result {
        Err(e) if e.is_not_ready() => {
            tracing::debug!("{op}: {e}, nothing to do");
            Ok(())
        }
        other => other.during(op),
    }
}

/// Reason codes carried by a station-disconnected event
pub mod reason {
    pub const UNSPECIFIED: u16 = 1;
    pub const AUTH_EXPIRE: u16 = 2;
    pub const AUTH_LEAVE: u16 = 3;
    pub const ASSOC_EXPIRE: u16 = 4;
    pub const ASSOC_TOOMANY: u16 = 5;
    pub const NOT_AUTHED: u16 = 6;
    pub const NOT_ASSOCED: u16 = 7;
    pub const ASSOC_LEAVE: u16 = 8;
    pub const ASSOC_NOT_AUTHED: u16 = 9;
    pub const MIC_FAILURE: u16 = 14;
    pub const FOURWAY_HANDSHAKE_TIMEOUT: u16 = 15;
    pub const GROUP_KEY_UPDATE_TIMEOUT: u16 = 16;
    pub const IE_IN_4WAY_DIFFERS: u16 = 17;
    pub const BEACON_TIMEOUT: u16 = 200;
    pub const NO_AP_FOUND: u16 = 201;
    pub const AUTH_FAIL: u16 = 202;
    pub const ASSOC_FAIL: u16 = 203;
    pub const HANDSHAKE_TIMEOUT: u16 = 204;
    pub const CONNECTION_FAIL: u16 = 205;
}

/// Convert a disconnect reason code to a human-readable string
pub fn disconnect_reason_to_str(code: u16) -> String {
    match code {
        reason::UNSPECIFIED => "Unspecified".to_string(),
        reason::AUTH_EXPIRE => "Authentication Expired".to_string(),
        reason::AUTH_LEAVE => "Deauthenticated (AP Leaving)".to_string(),
        reason::ASSOC_EXPIRE => "Association Expired (Inactivity)".to_string(),
        reason::ASSOC_TOOMANY => "AP Has Too Many Stations".to_string(),
        reason::NOT_AUTHED => "Frame From Unauthenticated Station".to_string(),
        reason::NOT_ASSOCED => "Frame From Unassociated Station".to_string(),
        reason::ASSOC_LEAVE => "Disassociated (Station Leaving)".to_string(),
        reason::ASSOC_NOT_AUTHED => "Association Before Authentication".to_string(),
        reason::MIC_FAILURE => "Message Integrity Check Failure".to_string(),
        reason::FOURWAY_HANDSHAKE_TIMEOUT => {
            "4-Way Handshake Timeout (Possible Wrong Password)".to_string()
        }
        reason::GROUP_KEY_UPDATE_TIMEOUT => "Group Key Update Timeout".to_string(),
        reason::IE_IN_4WAY_DIFFERS => "Handshake IE Mismatch".to_string(),
        reason::BEACON_TIMEOUT => "Beacon Timeout (AP Lost)".to_string(),
        reason::NO_AP_FOUND => "No AP Found".to_string(),
        reason::AUTH_FAIL => "Authentication Failed (Possible Wrong Password)".to_string(),
        reason::ASSOC_FAIL => "Association Failed".to_string(),
        reason::HANDSHAKE_TIMEOUT => "Handshake Timeout (Possible Wrong Password)".to_string(),
        reason::CONNECTION_FAIL => "Connection Failed".to_string(),
        _ => format!("Unknown Reason (Code: {code}, 0x{code:X})"),
    }
}

/// Reasons that point at credentials or key exchange rather than radio conditions
pub fn is_auth_failure(code: u16) -> bool {
    matches!(
        code,
        reason::AUTH_EXPIRE
            | reason::MIC_FAILURE
            | reason::FOURWAY_HANDSHAKE_TIMEOUT
            | reason::GROUP_KEY_UPDATE_TIMEOUT
            | reason::IE_IN_4WAY_DIFFERS
            | reason::AUTH_FAIL
            | reason::HANDSHAKE_TIMEOUT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_conditions_are_absorbed_during_setup() {
        assert!(tolerate_already(Err(DriverError::AlreadyInitialized), "init").is_ok());
        assert!(tolerate_already(Err(DriverError::AlreadyStarted), "start").is_ok());

        let err = tolerate_already(Err(DriverError::NoMemory), "init driver").unwrap_err();
        assert!(matches!(
            err,
            WifiError::Driver {
                op: "init driver",
                source: DriverError::NoMemory
            }
        ));
    }

    #[test]
    fn not_ready_conditions_are_absorbed_during_teardown() {
        assert!(tolerate_not_ready(Err(DriverError::NotInitialized), "stop").is_ok());
        assert!(tolerate_not_ready(Err(DriverError::NotStarted), "stop").is_ok());
        assert!(tolerate_not_ready(Err(DriverError::AlreadyStarted), "stop").is_err());
    }

    #[test]
    fn handshake_timeout_is_flagged_as_auth_failure() {
        assert!(is_auth_failure(reason::FOURWAY_HANDSHAKE_TIMEOUT));
        assert!(is_auth_failure(reason::AUTH_FAIL));
        assert!(!is_auth_failure(reason::BEACON_TIMEOUT));
        assert!(!is_auth_failure(reason::NO_AP_FOUND));
        assert!(disconnect_reason_to_str(15).starts_with("4-Way Handshake Timeout"));
        assert_eq!(disconnect_reason_to_str(999), "Unknown Reason (Code: 999, 0x3E7)");
    }
}
