use crate::error::{DriverError, DriverResult};
use windows::{
    Win32::{
        Foundation::{ERROR_SUCCESS, HANDLE},
        NetworkManagement::WiFi::*,
    },
    core::GUID,
};

/// ERROR_NOT_FOUND, reported when the machine has no WLAN interface
const ERROR_NOT_FOUND: i32 = 1168;

/// Safe wrapper around WLAN handle that automatically closes on drop
#[derive(Debug)]
pub struct WlanHandle {
    handle: HANDLE,
}

// SAFETY: a WLAN client handle is not tied to the thread that opened it; the
// Native Wifi API serializes calls made on the same handle.
unsafe impl Send for WlanHandle {}
unsafe impl Sync for WlanHandle {}

impl WlanHandle {
    /// Open a new WLAN handle
    pub fn open() -> DriverResult<Self> {
        let mut negotiated_version = 0;
        let mut handle = HANDLE::default();
        unsafe {
            let result = WlanOpenHandle(2, None, &mut negotiated_version, &mut handle);
            check(result)?;
        }
        Ok(Self { handle })
    }

    /// Get the raw handle for API calls
    pub fn as_raw(&self) -> HANDLE {
        self.handle
    }

    /// Get the first interface GUID
    pub fn get_interface_guid(&self) -> DriverResult<GUID> {
        unsafe {
            let mut interface_list: *mut WLAN_INTERFACE_INFO_LIST = std::ptr::null_mut();
            let result = WlanEnumInterfaces(self.handle, None, &mut interface_list);
            check(result)?;

            if (*interface_list).dwNumberOfItems == 0 {
                WlanFreeMemory(interface_list as *mut _);
                return Err(DriverError::Failure {
                    code: ERROR_NOT_FOUND,
                });
            }

            let interface_info = &(*interface_list).InterfaceInfo[0];
            let guid = interface_info.InterfaceGuid;
            WlanFreeMemory(interface_list as *mut _);
            Ok(guid)
        }
    }
}

impl Drop for WlanHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = WlanCloseHandle(self.handle, None);
        }
    }
}

/// Map a Win32 status code onto the driver error space
pub fn check(code: u32) -> DriverResult<()> {
    const ERROR_INVALID_PARAMETER: u32 = 87;
    const ERROR_NOT_ENOUGH_MEMORY: u32 = 8;
    const ERROR_INVALID_STATE: u32 = 5023;

    match code {
        c if c == ERROR_SUCCESS.0 => Ok(()),
        ERROR_INVALID_PARAMETER => Err(DriverError::InvalidArgument),
        ERROR_NOT_ENOUGH_MEMORY => Err(DriverError::NoMemory),
        ERROR_INVALID_STATE => Err(DriverError::NotStarted),
        other => Err(DriverError::Failure { code: other as i32 }),
    }
}
