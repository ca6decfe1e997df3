use crate::error::{DriverError, DriverResult, reason};
use crate::wifi::driver::DriverEvent;
use crate::wifi::windows::handle::WlanHandle;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use windows::Win32::{Foundation::ERROR_SUCCESS, NetworkManagement::WiFi::*};

/// Registered ACM notification sink; unregisters on drop
#[derive(Debug)]
pub struct WlanListener {
    handle: WlanHandle,
    context: *mut std::ffi::c_void,
}

unsafe impl Send for WlanListener {}
unsafe impl Sync for WlanListener {}

impl Drop for WlanListener {
    fn drop(&mut self) {
        unsafe {
            let _ = WlanRegisterNotification(
                self.handle.as_raw(),
                WLAN_NOTIFICATION_SOURCE_NONE,
                true,
                None,
                None,
                None,
                None,
            );
            let _ = Box::from_raw(self.context as *mut UnboundedSender<DriverEvent>);
        }
    }
}

unsafe extern "system" fn notification_callback(
    data: *mut L2_NOTIFICATION_DATA,
    context: *mut std::ffi::c_void,
) {
    if data.is_null() || context.is_null() {
        return;
    }

    // SAFETY: both checked for null; the context is the boxed sender created in `listen`
    let (data, sender) = unsafe {
        (
            &*data,
            &*(context as *const UnboundedSender<DriverEvent>),
        )
    };

    if data.NotificationSource != WLAN_NOTIFICATION_SOURCE_ACM {
        return;
    }

    let code = data.NotificationCode;
    let is_complete = code == wlan_notification_acm_connection_complete.0 as u32;
    let is_failure = code == wlan_notification_acm_connection_attempt_fail.0 as u32
        || code == wlan_notification_acm_disconnected.0 as u32;
    if !is_complete && !is_failure {
        return;
    }
    if data.dwDataSize < std::mem::size_of::<WLAN_CONNECTION_NOTIFICATION_DATA>() as u32 {
        return;
    }

    // SAFETY: pData is WLAN_CONNECTION_NOTIFICATION_DATA for these codes; size checked above
    let conn_data = unsafe { &*(data.pData as *const WLAN_CONNECTION_NOTIFICATION_DATA) };
    let wlan_reason = conn_data.wlanReasonCode;

    if is_complete && wlan_reason == 0 {
        let _ = sender.send(DriverEvent::GotIp { ip: local_address() });
    } else {
        debug!(
            "wlan notification {code}: {}",
            wlan_reason_to_string(wlan_reason)
        );
        let _ = sender.send(DriverEvent::StationDisconnected {
            reason: station_reason(wlan_reason),
        });
    }
}

/// Register for ACM notifications, forwarding translated events to `sender`
pub fn listen(sender: UnboundedSender<DriverEvent>) -> DriverResult<WlanListener> {
    let wlan_handle = WlanHandle::open()?;
    let handle = wlan_handle.as_raw();

    let context = Box::into_raw(Box::new(sender));

    unsafe {
        let result = WlanRegisterNotification(
            handle,
            WLAN_NOTIFICATION_SOURCE_ACM,
            false,
            Some(notification_callback),
            Some(context as *mut std::ffi::c_void),
            None,
            None,
        );

        if result != ERROR_SUCCESS.0 {
            let _ = Box::from_raw(context as *mut UnboundedSender<DriverEvent>);
            return Err(DriverError::Failure {
                code: result as i32,
            });
        }
    }

    Ok(WlanListener {
        handle: wlan_handle,
        context: context as *mut std::ffi::c_void,
    })
}

/// Source address the routing table picks for outbound traffic.
///
/// Connecting a UDP socket sends nothing; it only resolves the route.
fn local_address() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Collapse a WLAN_REASON_CODE into the station disconnect reason space
pub fn station_reason(code: u32) -> u16 {
    match code {
        0x00028003 => reason::ASSOC_EXPIRE,
        0x00028002 | 0x00028008 => reason::ASSOC_FAIL,
        0x00028004..=0x00028006 | 0x00028009 | 0x0002800A => reason::AUTH_FAIL,
        0x00028007 | 0x00048005 | 0x00048014 => reason::HANDSHAKE_TIMEOUT,
        0x0002800B | 0x00050004 => reason::FOURWAY_HANDSHAKE_TIMEOUT,
        0x00038002 => reason::NO_AP_FOUND,
        0x00038003 | 0x00038006 | 0x00038014 | 0x00010001 | 0x00010002 => {
            reason::CONNECTION_FAIL
        }
        0 => reason::ASSOC_LEAVE,
        _ => reason::UNSPECIFIED,
    }
}

/// Convert WLAN reason code to human-readable error message
pub fn wlan_reason_to_string(code: u32) -> String {
    match code {
        0 => "Success".to_string(),
        0x00010001 => "Network Not Compatible".to_string(),
        0x00010002 => "Profile Not Compatible".to_string(),
        0x00028002 => "Association Failed".to_string(),
        0x00028003 => "Association Timeout".to_string(),
        0x00028004 => "Pre-Security Failure".to_string(),
        0x00028005 => "Start Security Failure".to_string(),
        0x00028006 => "Security Failure".to_string(),
        0x00028007 => "Security Timeout".to_string(),
        0x00028008 => "Roaming Failure".to_string(),
        0x0002800B => "Driver Disconnected (Possible Wrong Password)".to_string(),
        0x00038002 => "Network Not Available".to_string(),
        0x00038003 => "Profile Not Found".to_string(),
        0x00050004 => "Incorrect Password".to_string(),
        0x00048005 => "Key Exchange Timeout".to_string(),
        _ => format!("Unknown Error (Code: {code}, 0x{code:X})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_auth_failure;

    #[test]
    fn wrong_password_codes_map_to_auth_failures() {
        for code in [0x0002800B, 0x00050004, 0x00048005, 0x00028006] {
            assert!(is_auth_failure(station_reason(code)), "0x{code:X}");
        }
        assert_eq!(station_reason(0x00038002), reason::NO_AP_FOUND);
        assert_eq!(station_reason(0xDEAD), reason::UNSPECIFIED);
    }
}
