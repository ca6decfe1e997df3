//! Native Wifi (wlanapi) backend for Windows hosts.
//!
//! Windows owns the IP stack and the notification thread pool, so the
//! infrastructure steps only open the client handle. Radio start and stop
//! are tracked locally; the ACM keeps the adapter powered.

mod handle;
mod icmp;
mod listener;
mod profile;

use crate::config;
use crate::error::{DriverError, DriverResult};
use crate::wifi::driver::{
    DriverEvent, PingConfig, PingEvent, PingSessionId, RawAccessPoint, ScanConfig, WifiDriver,
};
use crate::wifi::types::ConnectionConfig;
use handle::{WlanHandle, check};
use listener::WlanListener;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};
use windows::{Win32::NetworkManagement::WiFi::*, core::GUID};

#[derive(Default)]
struct Inner {
    handle: Option<WlanHandle>,
    guid: Option<GUID>,
    driver_ready: bool,
    started: bool,
    listener: Option<WlanListener>,
    events: Option<UnboundedSender<DriverEvent>>,
    profile: Option<String>,
    last_scan: Vec<RawAccessPoint>,
    next_ping: u32,
    pings: HashMap<PingSessionId, (PingConfig, UnboundedSender<PingEvent>)>,
}

/// [`WifiDriver`] over the first WLAN interface of the machine
#[derive(Default)]
pub struct WlanDriver {
    inner: Mutex<Inner>,
}

impl WlanDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    fn ready(&self) -> DriverResult<(&WlanHandle, &GUID)> {
        match (&self.handle, &self.guid, self.driver_ready) {
            (Some(handle), Some(guid), true) => Ok((handle, guid)),
            _ => Err(DriverError::NotInitialized),
        }
    }

    fn running(&self) -> DriverResult<(&WlanHandle, &GUID)> {
        let ready = self.ready()?;
        if !self.started {
            return Err(DriverError::NotStarted);
        }
        Ok(ready)
    }
}

impl WifiDriver for WlanDriver {
    fn init_network_stack(&self) -> DriverResult<()> {
        Ok(())
    }

    fn create_event_loop(&self) -> DriverResult<()> {
        Ok(())
    }

    fn create_station_interface(&self) -> DriverResult<()> {
        let mut inner = self.inner();
        if inner.handle.is_some() {
            return Ok(());
        }
        let handle = WlanHandle::open()?;
        let guid = handle.get_interface_guid()?;
        debug!("using wlan interface {guid:?}");
        inner.handle = Some(handle);
        inner.guid = Some(guid);
        Ok(())
    }

    fn init_driver(&self) -> DriverResult<()> {
        let mut inner = self.inner();
        if inner.handle.is_none() {
            return Err(DriverError::NotInitialized);
        }
        if inner.driver_ready {
            return Err(DriverError::AlreadyInitialized);
        }
        inner.driver_ready = true;
        Ok(())
    }

    fn deinit_driver(&self) -> DriverResult<()> {
        let mut inner = self.inner();
        if !inner.driver_ready {
            return Err(DriverError::NotInitialized);
        }
        inner.driver_ready = false;
        inner.started = false;
        inner.profile = None;
        inner.last_scan.clear();
        Ok(())
    }

    fn subscribe(&self) -> DriverResult<UnboundedReceiver<DriverEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = listener::listen(tx.clone())?;
        let mut inner = self.inner();
        inner.listener = Some(listener);
        inner.events = Some(tx);
        Ok(rx)
    }

    fn unsubscribe(&self) {
        let mut inner = self.inner();
        inner.listener = None;
        inner.events = None;
    }

    fn set_station_mode(&self) -> DriverResult<()> {
        self.inner().ready().map(|_| ())
    }

    fn start(&self) -> DriverResult<()> {
        let mut inner = self.inner();
        inner.ready()?;
        if inner.started {
            return Err(DriverError::AlreadyStarted);
        }
        inner.started = true;
        if let Some(events) = &inner.events {
            let _ = events.send(DriverEvent::StationStarted);
        }
        Ok(())
    }

    fn stop(&self) -> DriverResult<()> {
        let mut inner = self.inner();
        let (handle, guid) = inner.ready()?;
        if inner.started {
            unsafe {
                let _ = WlanDisconnect(handle.as_raw(), guid, None);
            }
        }
        inner.started = false;
        Ok(())
    }

    fn set_config(&self, config: &ConnectionConfig) -> DriverResult<()> {
        let xml = profile::create_profile_xml(config).map_err(|e| {
            warn!("{e}");
            DriverError::InvalidArgument
        })?;
        let mut inner = self.inner();
        let (handle, guid) = inner.ready()?;
        profile::set_profile(handle, guid, &xml)?;
        inner.profile = Some(config.ssid.as_str().to_string());
        Ok(())
    }

    fn connect(&self) -> DriverResult<()> {
        let inner = self.inner();
        let (handle, guid) = inner.running()?;
        let ssid = inner.profile.as_deref().ok_or(DriverError::InvalidArgument)?;
        profile::connect_profile(handle, guid, ssid)
    }

    fn disconnect(&self) -> DriverResult<()> {
        let inner = self.inner();
        let (handle, guid) = inner.running()?;
        unsafe { check(WlanDisconnect(handle.as_raw(), guid, None)) }
    }

    fn scan(&self, _config: &ScanConfig) -> DriverResult<()> {
        {
            let inner = self.inner();
            let (handle, guid) = inner.running()?;
            unsafe { check(WlanScan(handle.as_raw(), guid, None, None, None))? };
        }

        // WlanScan returns immediately; results settle within a few seconds
        std::thread::sleep(Duration::from_millis(config::SCAN_DELAY_MS));

        let mut inner = self.inner();
        let records = {
            let (handle, guid) = inner.running()?;
            bss_list(handle, guid)?
        };
        inner.last_scan = records;
        Ok(())
    }

    fn scan_ap_count(&self) -> DriverResult<u16> {
        let count = self.inner().last_scan.len();
        Ok(u16::try_from(count).unwrap_or(u16::MAX))
    }

    fn scan_ap_records(&self, max: u16) -> DriverResult<Vec<RawAccessPoint>> {
        let mut inner = self.inner();
        let taken = inner.last_scan.len().min(usize::from(max));
        Ok(inner.last_scan.drain(..taken).collect())
    }

    fn ping_new_session(
        &self,
        config: &PingConfig,
        events: UnboundedSender<PingEvent>,
    ) -> DriverResult<PingSessionId> {
        icmp::ipv4_target(config)?;
        let mut inner = self.inner();
        inner.next_ping += 1;
        let id = PingSessionId(inner.next_ping);
        inner.pings.insert(id, (*config, events));
        Ok(id)
    }

    fn ping_start(&self, id: PingSessionId) -> DriverResult<()> {
        let (config, events) = self
            .inner()
            .pings
            .get(&id)
            .cloned()
            .ok_or(DriverError::InvalidArgument)?;
        std::thread::Builder::new()
            .name(format!("ping-{}", id.0))
            .spawn(move || icmp::run_session(config, events))
            .map(|_| ())
            .map_err(|_| DriverError::NoMemory)
    }

    fn ping_delete_session(&self, id: PingSessionId) -> DriverResult<()> {
        self.inner()
            .pings
            .remove(&id)
            .map(|_| ())
            .ok_or(DriverError::InvalidArgument)
    }
}

/// Per-BSS scan results in the order the driver reports them
fn bss_list(handle: &WlanHandle, guid: &GUID) -> DriverResult<Vec<RawAccessPoint>> {
    unsafe {
        let mut bss_list: *mut WLAN_BSS_LIST = std::ptr::null_mut();
        check(WlanGetNetworkBssList(
            handle.as_raw(),
            guid,
            None,
            dot11_BSS_type_any,
            false,
            None,
            &mut bss_list,
        ))?;
        if bss_list.is_null() {
            return Ok(Vec::new());
        }

        let num_bss = (*bss_list).dwNumberOfItems;
        let entries =
            std::slice::from_raw_parts((*bss_list).wlanBssEntries.as_ptr(), num_bss as usize);
        let records = entries
            .iter()
            .map(|bss| {
                let ssid_len = (bss.dot11Ssid.uSSIDLength as usize).min(bss.dot11Ssid.ucSSID.len());
                RawAccessPoint {
                    ssid: bss.dot11Ssid.ucSSID[..ssid_len].to_vec(),
                    rssi: bss.lRssi.clamp(i8::MIN.into(), i8::MAX.into()) as i8,
                }
            })
            .collect();
        WlanFreeMemory(bss_list as *mut _);
        Ok(records)
    }
}
