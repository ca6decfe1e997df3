use crate::config::{PASSWORD_MAX_LEN, SSID_MAX_LEN};
use crate::error::{WifiError, WifiResult};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Network name, 1 to 32 bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ssid(String);

impl Ssid {
    pub fn new(ssid: &str) -> WifiResult<Self> {
        if ssid.is_empty() {
            return Err(WifiError::SsidEmpty);
        }
        if ssid.len() > SSID_MAX_LEN {
            return Err(WifiError::SsidTooLong {
                len: ssid.len(),
                max: SSID_MAX_LEN,
            });
        }
        Ok(Self(ssid.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pre-shared key, at most 64 bytes. Empty for open networks.
#[derive(Clone)]
pub struct Passphrase(SecretString);

impl Passphrase {
    pub fn new(password: &str) -> WifiResult<Self> {
        if password.len() > PASSWORD_MAX_LEN {
            return Err(WifiError::PasswordTooLong {
                len: password.len(),
                max: PASSWORD_MAX_LEN,
            });
        }
        Ok(Self(SecretString::from(password.to_string())))
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase([REDACTED])")
    }
}

/// Weakest authentication mode the station accepts from an AP
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum AuthThreshold {
    Open,
    Wep,
    WpaPersonal,
    #[default]
    Wpa2Personal,
    Wpa3Personal,
}

/// Station configuration applied to the driver for one connect attempt
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub ssid: Ssid,
    pub password: Passphrase,
    pub auth_threshold: AuthThreshold,
}

/// One network discovered by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointRecord {
    pub ssid: String,
    pub rssi: i8,
}

impl AccessPointRecord {
    /// Build from a raw driver name, cutting it at the first NUL and at the field width.
    ///
    /// The width is counted in driver bytes; invalid bytes decode to U+FFFD
    /// after the cut, so they never push real characters out of the name.
    pub fn from_raw(raw_ssid: &[u8], rssi: i8) -> Self {
        let end = raw_ssid
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(raw_ssid.len());
        let name = &raw_ssid[..end];

        let mut cut = name.len().min(SSID_MAX_LEN);
        // Back off a multi-byte character the field width splits
        if cut < name.len()
            && let Some(last) = name[..cut].utf8_chunks().last()
            && !last.invalid().is_empty()
        {
            let start = cut - last.invalid().len();
            let splits_char = match std::str::from_utf8(&name[start..]) {
                Ok(_) => true,
                Err(e) => e.valid_up_to() > 0,
            };
            if splits_char {
                cut = start;
            }
        }

        Self {
            ssid: String::from_utf8_lossy(&name[..cut]).into_owned(),
            rssi,
        }
    }
}

/// Terminal result of one `connect` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Connected,
    Failed,
    TimedOut,
}

/// Observable position in the connect lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectState {
    Idle = 0,
    Disconnecting = 1,
    Configuring = 2,
    AwaitingOutcome = 3,
    Connected = 4,
    Failed = 5,
}

impl ConnectState {
    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Disconnecting,
            2 => Self::Configuring,
            3 => Self::AwaitingOutcome,
            4 => Self::Connected,
            5 => Self::Failed,
            _ => Self::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversize_credentials_are_rejected() {
        assert!(Ssid::new(&"a".repeat(32)).is_ok());
        assert!(matches!(
            Ssid::new(&"a".repeat(33)),
            Err(WifiError::SsidTooLong { len: 33, max: 32 })
        ));
        assert!(matches!(Ssid::new(""), Err(WifiError::SsidEmpty)));

        assert!(Passphrase::new(&"p".repeat(64)).is_ok());
        assert!(matches!(
            Passphrase::new(&"p".repeat(65)),
            Err(WifiError::PasswordTooLong { len: 65, max: 64 })
        ));
        assert!(Passphrase::new("").unwrap().is_empty());
    }

    #[test]
    fn passphrase_debug_is_redacted() {
        let pass = Passphrase::new("hunter22").unwrap();
        assert_eq!(format!("{pass:?}"), "Passphrase([REDACTED])");
        assert_eq!(pass.expose(), "hunter22");
    }

    #[test]
    fn raw_ssid_is_cut_at_nul_and_field_width() {
        let record = AccessPointRecord::from_raw(b"HomeNet\0garbage", -40);
        assert_eq!(record.ssid, "HomeNet");
        assert_eq!(record.rssi, -40);

        let long = AccessPointRecord::from_raw("x".repeat(40).as_bytes(), -90);
        assert_eq!(long.ssid.len(), 32);

        // 31 ASCII bytes followed by a two-byte character straddling the limit
        let mut straddle = "y".repeat(31);
        straddle.push('é');
        let record = AccessPointRecord::from_raw(straddle.as_bytes(), -70);
        assert_eq!(record.ssid, "y".repeat(31));
    }

    #[test]
    fn invalid_bytes_do_not_push_out_the_tail() {
        let mut raw = b"Office-".to_vec();
        raw.extend_from_slice(&[0xff; 5]);
        raw.extend_from_slice(b"-Guest-Network-2G!!!");
        assert_eq!(raw.len(), 32);

        let record = AccessPointRecord::from_raw(&raw, -60);
        assert_eq!(record.ssid, "Office-\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}-Guest-Network-2G!!!");

        // Garbage past the field width is still cut
        raw.extend_from_slice(&[0xfe; 4]);
        let record = AccessPointRecord::from_raw(&raw, -60);
        assert!(record.ssid.ends_with("-2G!!!"));
    }
}
