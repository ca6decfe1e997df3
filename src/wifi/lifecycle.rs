use crate::error::{DriverResultExt, WifiError, WifiResult, tolerate_already, tolerate_not_ready};
use crate::wifi::dispatcher;
use crate::wifi::driver::WifiDriver;
use crate::wifi::manager::ConnectionManager;
use crate::wifi::types::ConnectState;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

impl<D: WifiDriver> ConnectionManager<D> {
    /// Bring up the network stack, the driver and the radio.
    ///
    /// Safe to call repeatedly: system and driver setup run once, and a
    /// radio that is already started counts as success. The event dispatcher
    /// runs on the current tokio runtime; without one this fails with
    /// [`WifiError::NoRuntime`] before the driver is touched.
    pub fn initialize(&self) -> WifiResult<()> {
        let shared = &self.shared;

        if !shared.system_initialized.load(Ordering::Acquire) {
            tolerate_already(self.driver.init_network_stack(), "initialize network stack")?;
            tolerate_already(self.driver.create_event_loop(), "create event loop")?;
            self.driver
                .create_station_interface()
                .during("create station interface")?;
            shared.system_initialized.store(true, Ordering::Release);
            debug!("network infrastructure ready");
        }

        if !shared.driver_initialized.load(Ordering::Acquire) {
            let runtime =
                tokio::runtime::Handle::try_current().map_err(|_| WifiError::NoRuntime)?;
            self.driver.init_driver().during("initialize driver")?;
            let events = self.driver.subscribe().during("register event handlers")?;
            let task = runtime.spawn(dispatcher::run(
                shared.clone(),
                self.driver.clone(),
                events,
            ));
            if let Ok(mut slot) = self.dispatcher.lock()
                && let Some(stale) = slot.replace(task)
            {
                stale.abort();
            }
            self.driver.set_station_mode().during("set station mode")?;
            shared.driver_initialized.store(true, Ordering::Release);
            debug!("driver initialized in station mode");
        }

        tolerate_already(self.driver.start(), "start radio")?;
        shared.allow_reconnect(true);
        info!("wifi station started");
        Ok(())
    }

    /// Disconnect, stop the radio and release driver resources.
    ///
    /// Automatic retry is suppressed first so the disconnect this causes is
    /// not treated as a failed attempt. Succeeds when never initialized.
    pub fn deactivate(&self) -> WifiResult<()> {
        let shared = &self.shared;
        shared.allow_reconnect(false);

        if let Err(e) = self.driver.disconnect() {
            if e.is_not_ready() {
                debug!("disconnect: {e}");
            } else {
                warn!("disconnect during deactivate failed: {e}");
            }
        }

        tolerate_not_ready(self.driver.stop(), "stop radio")?;

        self.driver.unsubscribe();
        if let Ok(mut slot) = self.dispatcher.lock()
            && let Some(task) = slot.take()
        {
            task.abort();
        }

        tolerate_not_ready(self.driver.deinit_driver(), "deinitialize driver")?;
        shared.driver_initialized.store(false, Ordering::Release);
        shared.set_ip(None);
        shared.set_state(ConnectState::Idle);
        info!("wifi station deactivated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ManagerConfig;
    use crate::error::{DriverError, WifiError};
    use crate::wifi::manager::ConnectionManager;
    use crate::wifi::sim::{DriverCall, LinkOutcome, SimulatedDriver};
    use crate::wifi::types::{ConnectState, ConnectionOutcome};
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let manager = ConnectionManager::new(SimulatedDriver::new(), ManagerConfig::default());

        manager.initialize().unwrap();
        manager.initialize().unwrap();
        manager.initialize().unwrap();

        let driver = manager.driver();
        assert_eq!(driver.count_calls(DriverCall::InitNetworkStack), 1);
        assert_eq!(driver.count_calls(DriverCall::CreateEventLoop), 1);
        assert_eq!(driver.count_calls(DriverCall::CreateStationInterface), 1);
        assert_eq!(driver.count_calls(DriverCall::InitDriver), 1);
        assert_eq!(driver.count_calls(DriverCall::Subscribe), 1);
        assert_eq!(driver.count_calls(DriverCall::SetStationMode), 1);
        // Radio start is attempted every time; "already started" is success
        assert_eq!(driver.count_calls(DriverCall::Start), 3);
        assert!(manager.is_initialized());
        assert!(manager.reconnect_allowed());
    }

    #[tokio::test]
    async fn already_created_infrastructure_is_not_an_error() {
        let driver = SimulatedDriver::new();
        driver.fail_next(DriverCall::InitNetworkStack, DriverError::AlreadyInitialized);
        driver.fail_next(DriverCall::CreateEventLoop, DriverError::AlreadyInitialized);
        let manager = ConnectionManager::new(driver, ManagerConfig::default());

        manager.initialize().unwrap();
        assert!(manager.is_initialized());
    }

    #[tokio::test]
    async fn mandatory_setup_failure_is_surfaced_verbatim() {
        let driver = SimulatedDriver::new();
        driver.fail_next(DriverCall::InitDriver, DriverError::NoMemory);
        let manager = ConnectionManager::new(driver, ManagerConfig::default());

        let err = manager.initialize().unwrap_err();
        assert!(matches!(
            err,
            WifiError::Driver {
                op: "initialize driver",
                source: DriverError::NoMemory
            }
        ));
        assert!(!manager.is_initialized());
        assert!(!manager.reconnect_allowed());

        // A later call retries only the step that failed
        manager.initialize().unwrap();
        assert_eq!(manager.driver().count_calls(DriverCall::InitNetworkStack), 1);
        assert_eq!(manager.driver().count_calls(DriverCall::InitDriver), 2);
    }

    #[tokio::test]
    async fn radio_start_failure_propagates() {
        let driver = SimulatedDriver::new();
        driver.fail_next(DriverCall::Start, DriverError::Failure { code: 0x3001 });
        let manager = ConnectionManager::new(driver, ManagerConfig::default());

        let err = manager.initialize().unwrap_err();
        assert!(matches!(
            err,
            WifiError::Driver {
                op: "start radio",
                source: DriverError::Failure { code: 0x3001 }
            }
        ));
        assert!(!manager.reconnect_allowed());
    }

    #[tokio::test]
    async fn deactivate_when_never_initialized_succeeds() {
        let manager = ConnectionManager::new(SimulatedDriver::new(), ManagerConfig::default());
        manager.deactivate().unwrap();
        assert!(!manager.reconnect_allowed());
    }

    #[tokio::test]
    async fn deactivate_releases_driver_and_allows_reinitialize() {
        let manager = ConnectionManager::new(SimulatedDriver::new(), ManagerConfig::default());
        manager.initialize().unwrap();
        manager.deactivate().unwrap();

        assert!(!manager.is_initialized());
        assert!(!manager.reconnect_allowed());
        assert!(!manager.driver().is_started());
        assert_eq!(manager.driver().count_calls(DriverCall::DeinitDriver), 1);

        manager.initialize().unwrap();
        // System infrastructure survives deactivation; only the driver is rebuilt
        assert_eq!(manager.driver().count_calls(DriverCall::InitNetworkStack), 1);
        assert_eq!(manager.driver().count_calls(DriverCall::InitDriver), 2);
        assert!(manager.driver().is_started());
    }

    #[test]
    fn initialize_without_runtime_fails_before_driver_setup() {
        let manager = ConnectionManager::new(SimulatedDriver::new(), ManagerConfig::default());

        let err = manager.initialize().unwrap_err();
        assert!(matches!(err, WifiError::NoRuntime));
        assert_eq!(manager.driver().count_calls(DriverCall::InitDriver), 0);
        assert_eq!(manager.driver().count_calls(DriverCall::Subscribe), 0);
        assert!(!manager.is_initialized());
        assert!(!manager.reconnect_allowed());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async { manager.initialize() }).unwrap();
        assert!(manager.is_initialized());
        assert_eq!(manager.driver().count_calls(DriverCall::InitDriver), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deactivating_a_connected_station_is_not_a_failed_attempt() {
        let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 4, 20));
        let driver = SimulatedDriver::new().with_link_outcomes([LinkOutcome::Associate(ip)]);
        let manager = ConnectionManager::new(driver, ManagerConfig::default());
        manager.initialize().unwrap();
        let outcome = manager
            .connect("HomeNet", "pw123456", Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(outcome, ConnectionOutcome::Connected);

        manager.deactivate().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(manager.attempt_count(), 0);
        assert!(!manager.shared.signals.snapshot().failed);
        assert_eq!(manager.driver().count_calls(DriverCall::Reconnect), 0);
        assert_eq!(manager.state(), ConnectState::Idle);
        assert_eq!(manager.ip_address(), None);
        assert!(!manager.driver().is_associated());
    }
}
