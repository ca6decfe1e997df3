use crate::error::{DriverResultExt, WifiResult};
use crate::wifi::driver::WifiDriver;
use crate::wifi::manager::ConnectionManager;
use crate::wifi::types::{ConnectState, ConnectionConfig, ConnectionOutcome, Passphrase, Ssid};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, info, warn};

impl<D: WifiDriver> ConnectionManager<D> {
    /// Join `ssid`, retrying on disconnect up to the configured budget.
    ///
    /// Returns once the dispatcher latches an outcome or `timeout` elapses.
    /// Only invalid credentials and driver faults while configuring or
    /// issuing the connect request are errors; exhausting retries is
    /// [`ConnectionOutcome::Failed`]. Automatic retry stays enabled
    /// afterwards, and a new call resets all retry state.
    pub async fn connect(
        &self,
        ssid: &str,
        password: &str,
        timeout: Duration,
    ) -> WifiResult<ConnectionOutcome> {
        let config = ConnectionConfig {
            ssid: Ssid::new(ssid)?,
            password: Passphrase::new(password)?,
            auth_threshold: self.config.auth_threshold,
        };
        let shared = &self.shared;

        shared.set_state(ConnectState::Disconnecting);
        shared.attempt_count.store(0, Ordering::Release);
        shared.allow_reconnect(false);
        if let Err(e) = self.driver.disconnect() {
            debug!("disconnect before connect: {e}");
        }
        // Let events from the previous session drain while retry is suppressed
        tokio::time::sleep(self.config.settle_delay).await;

        shared.set_state(ConnectState::Configuring);
        if let Err(e) = self.driver.set_config(&config).during("set station config") {
            shared.set_state(ConnectState::Failed);
            return Err(e);
        }

        shared.signals.clear();
        shared.allow_reconnect(true);
        shared.set_state(ConnectState::AwaitingOutcome);
        info!("connecting to '{}'", config.ssid);
        if let Err(e) = self.driver.connect().during("connect") {
            shared.set_state(ConnectState::Failed);
            return Err(e);
        }

        let outcome = match shared.signals.wait_any(timeout).await {
            Some(latch) if latch.connected => ConnectionOutcome::Connected,
            Some(_) => ConnectionOutcome::Failed,
            None => ConnectionOutcome::TimedOut,
        };

        match outcome {
            ConnectionOutcome::Connected => {
                shared.set_state(ConnectState::Connected);
                info!("connected to ap SSID: {}", config.ssid);
            }
            ConnectionOutcome::Failed => {
                shared.set_state(ConnectState::Failed);
                warn!("failed to connect to SSID: {}", config.ssid);
            }
            ConnectionOutcome::TimedOut => {
                warn!(
                    "no outcome for SSID '{}' after {}s",
                    config.ssid,
                    timeout.as_secs()
                );
                shared.set_state(ConnectState::Failed);
            }
        }
        Ok(outcome)
    }

    /// [`connect`](Self::connect) with the configured default timeout
    pub async fn connect_with_default_timeout(
        &self,
        ssid: &str,
        password: &str,
    ) -> WifiResult<ConnectionOutcome> {
        self.connect(ssid, password, self.config.connect_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ManagerConfig;
    use crate::error::{DriverError, WifiError, reason};
    use crate::wifi::manager::ConnectionManager;
    use crate::wifi::sim::{DriverCall, LinkOutcome, SimulatedDriver};
    use crate::wifi::types::{ConnectState, ConnectionOutcome};
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(30);
    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));

    fn manager(driver: SimulatedDriver, max_attempts: u8) -> ConnectionManager<SimulatedDriver> {
        let manager = ConnectionManager::new(
            driver,
            ManagerConfig::default().with_max_attempts(max_attempts),
        );
        manager.initialize().unwrap();
        manager
    }

    #[tokio::test(start_paused = true)]
    async fn connects_on_first_attempt() {
        let driver = SimulatedDriver::new().with_link_outcomes([LinkOutcome::Associate(IP)]);
        let manager = manager(driver, 3);

        let outcome = manager.connect("HomeNet", "correct horse", TIMEOUT).await.unwrap();

        assert_eq!(outcome, ConnectionOutcome::Connected);
        assert_eq!(manager.state(), ConnectState::Connected);
        assert_eq!(manager.ip_address(), Some(IP));
        assert_eq!(manager.attempt_count(), 0);
        assert!(manager.reconnect_allowed());
        let applied = manager.driver().applied_config().unwrap();
        assert_eq!(applied.ssid.as_str(), "HomeNet");
        assert_eq!(applied.password.expose(), "correct horse");
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_disconnects() {
        let driver = SimulatedDriver::new().with_link_outcomes([
            LinkOutcome::Reject(reason::BEACON_TIMEOUT),
            LinkOutcome::Reject(reason::NO_AP_FOUND),
            LinkOutcome::Associate(IP),
        ]);
        let manager = manager(driver, 3);

        let outcome = manager.connect("HomeNet", "pw123456", TIMEOUT).await.unwrap();

        assert_eq!(outcome, ConnectionOutcome::Connected);
        assert_eq!(manager.driver().count_calls(DriverCall::Reconnect), 2);
        assert_eq!(manager.attempt_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_budget_exhaustion_fails() {
        for max in [1u8, 3, 4] {
            let driver = SimulatedDriver::new()
                .with_default_link_outcome(LinkOutcome::Reject(reason::NO_AP_FOUND));
            let manager = manager(driver, max);

            let outcome = manager.connect("Missing", "", TIMEOUT).await.unwrap();

            assert_eq!(outcome, ConnectionOutcome::Failed);
            assert_eq!(manager.attempt_count(), max);
            assert_eq!(manager.driver().count_calls(DriverCall::Connect), 1);
            assert_eq!(manager.driver().count_calls(DriverCall::Reconnect), max as usize);
            assert_eq!(manager.state(), ConnectState::Failed);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_handshake_timeouts_fail_and_keep_retry_enabled() {
        let driver = SimulatedDriver::new()
            .with_default_link_outcome(LinkOutcome::Reject(reason::FOURWAY_HANDSHAKE_TIMEOUT));
        let manager = manager(driver, 3);

        let outcome = manager.connect("HomeNet", "wrong-password", TIMEOUT).await.unwrap();

        assert_eq!(outcome, ConnectionOutcome::Failed);
        assert_eq!(manager.attempt_count(), 3);
        assert!(manager.reconnect_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_again_after_failure_resets_retry_state() {
        let driver = SimulatedDriver::new().with_link_outcomes([
            LinkOutcome::Reject(reason::AUTH_FAIL),
            LinkOutcome::Reject(reason::AUTH_FAIL),
            LinkOutcome::Associate(IP),
        ]);
        let manager = manager(driver, 1);

        let first = manager.connect("HomeNet", "typo", TIMEOUT).await.unwrap();
        assert_eq!(first, ConnectionOutcome::Failed);
        assert_eq!(manager.attempt_count(), 1);

        let second = manager.connect("HomeNet", "fixed", TIMEOUT).await.unwrap();
        assert_eq!(second, ConnectionOutcome::Connected);
        assert_eq!(manager.attempt_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_driver_times_out() {
        let driver = SimulatedDriver::new().with_default_link_outcome(LinkOutcome::Silent);
        let manager = manager(driver, 3);

        let outcome = manager
            .connect("HomeNet", "pw123456", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome, ConnectionOutcome::TimedOut);
        assert!(manager.reconnect_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_disconnect_from_forced_disconnect_is_not_counted() {
        let driver = SimulatedDriver::new().with_link_outcomes([
            LinkOutcome::Associate(IP),
            LinkOutcome::Associate(IP),
        ]);
        let manager = manager(driver, 3);
        manager.connect("First", "pw123456", TIMEOUT).await.unwrap();

        // Switching networks tears down the live link first
        let outcome = manager.connect("Second", "pw123456", TIMEOUT).await.unwrap();

        assert_eq!(outcome, ConnectionOutcome::Connected);
        assert_eq!(manager.driver().count_calls(DriverCall::Reconnect), 0);
        assert_eq!(manager.driver().applied_config().unwrap().ssid.as_str(), "Second");
    }

    #[tokio::test(start_paused = true)]
    async fn lost_link_is_retried_automatically() {
        let driver = SimulatedDriver::new()
            .with_link_outcomes([LinkOutcome::Associate(IP), LinkOutcome::Associate(IP)]);
        let manager = manager(driver, 3);
        manager.connect("HomeNet", "pw123456", TIMEOUT).await.unwrap();

        manager.driver().lose_link(reason::BEACON_TIMEOUT);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(manager.driver().count_calls(DriverCall::Reconnect), 1);
        assert_eq!(manager.state(), ConnectState::Connected);
        assert_eq!(manager.attempt_count(), 0);
        assert_eq!(manager.ip_address(), Some(IP));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_precedes_configuration() {
        let driver = SimulatedDriver::new().with_link_outcomes([LinkOutcome::Associate(IP)]);
        let manager = manager(driver, 3);
        manager.driver().clear_calls();

        manager.connect("HomeNet", "pw123456", TIMEOUT).await.unwrap();

        assert_eq!(
            manager.driver().calls(),
            vec![DriverCall::Disconnect, DriverCall::SetConfig, DriverCall::Connect]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn oversize_credentials_fail_before_touching_the_driver() {
        let manager = manager(SimulatedDriver::new(), 3);
        manager.driver().clear_calls();

        let err = manager
            .connect(&"s".repeat(33), "pw", TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, WifiError::SsidTooLong { len: 33, .. }));

        let err = manager
            .connect("HomeNet", &"p".repeat(65), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, WifiError::PasswordTooLong { len: 65, .. }));

        assert!(manager.driver().calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn config_rejection_is_fatal() {
        let driver = SimulatedDriver::new();
        driver.fail_next(DriverCall::SetConfig, DriverError::InvalidArgument);
        let manager = manager(driver, 3);

        let err = manager.connect("HomeNet", "pw123456", TIMEOUT).await.unwrap_err();

        assert!(matches!(
            err,
            WifiError::Driver {
                op: "set station config",
                source: DriverError::InvalidArgument
            }
        ));
        assert_eq!(manager.driver().count_calls(DriverCall::Connect), 0);
    }
}
