use crate::error::{DriverResultExt, WifiError, WifiResult};
use crate::wifi::driver::{ScanConfig, WifiDriver};
use crate::wifi::manager::ConnectionManager;
use crate::wifi::types::{AccessPointRecord, ConnectState};
use tracing::{debug, info, warn};

impl<D: WifiDriver> ConnectionManager<D> {
    /// Run a blocking active scan and return at most `capacity` networks.
    ///
    /// Any existing session is disconnected first and stays down afterwards;
    /// reconnecting is up to the caller. Records come back in driver order.
    /// A scan that fails to start yields an empty list, not an error.
    pub async fn scan(&self, capacity: u16) -> WifiResult<Vec<AccessPointRecord>> {
        let shared = &self.shared;
        shared.allow_reconnect(false);
        if let Err(e) = self.driver.disconnect() {
            debug!("disconnect before scan: {e}");
        }
        shared.set_state(ConnectState::Idle);
        tokio::time::sleep(self.config.settle_delay).await;

        let driver = self.driver.clone();
        let started =
            match tokio::task::spawn_blocking(move || driver.scan(&ScanConfig::default())).await {
                Ok(started) => started,
                Err(e) => {
                    shared.allow_reconnect(true);
                    return Err(WifiError::Internal(e.to_string()));
                }
            };
        if let Err(e) = started {
            warn!("scan start failed: {e}");
            shared.allow_reconnect(true);
            return Ok(Vec::new());
        }

        let discovered = self.driver.scan_ap_count().during("read scan count")?;
        let wanted = discovered.min(capacity);

        let mut records = Vec::new();
        records
            .try_reserve_exact(usize::from(wanted))
            .map_err(|_| WifiError::Allocation(usize::from(wanted)))?;

        let raw = self
            .driver
            .scan_ap_records(wanted)
            .during("read scan records")?;
        records.extend(
            raw.iter()
                .take(usize::from(wanted))
                .map(|ap| AccessPointRecord::from_raw(&ap.ssid, ap.rssi)),
        );

        info!("total APs scanned = {discovered}, returned = {}", records.len());
        for ap in &records {
            debug!("SSID {:<32} RSSI {}", ap.ssid, ap.rssi);
        }
        Ok(records)
    }
}
