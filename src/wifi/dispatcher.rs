use crate::error::{disconnect_reason_to_str, is_auth_failure};
use crate::wifi::driver::{DriverEvent, WifiDriver};
use crate::wifi::manager::Shared;
use crate::wifi::types::ConnectState;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// Drain the driver subscription until it closes
pub(crate) async fn run<D: WifiDriver>(
    shared: Arc<Shared>,
    driver: Arc<D>,
    mut events: UnboundedReceiver<DriverEvent>,
) {
    while let Some(event) = events.recv().await {
        handle_event(&shared, driver.as_ref(), event);
    }
    debug!("driver event subscription closed, dispatcher exiting");
}

/// Translate one driver event into retry bookkeeping and outcome signals
pub(crate) fn handle_event<D: WifiDriver + ?Sized>(shared: &Shared, driver: &D, event: DriverEvent) {
    match event {
        DriverEvent::StationStarted => {
            debug!("station started");
        }
        DriverEvent::StationDisconnected { reason } => {
            shared.set_ip(None);
            on_disconnected(shared, driver, reason);
        }
        DriverEvent::GotIp { ip } => {
            shared.attempt_count.store(0, Ordering::Release);
            shared.set_ip(Some(ip));
            shared.set_state(ConnectState::Connected);
            info!("got ip: {ip}");
            shared.signals.raise_connected();
        }
    }
}

fn on_disconnected<D: WifiDriver + ?Sized>(shared: &Shared, driver: &D, reason: u16) {
    let description = disconnect_reason_to_str(reason);

    if !shared.reconnect_allowed() {
        debug!("disconnected ({reason}: {description}) while retry is suppressed, ignoring");
        return;
    }

    if is_auth_failure(reason) {
        warn!("disconnected: authentication/handshake failure ({reason}: {description})");
    } else {
        info!("disconnected ({reason}: {description})");
    }

    let attempts = shared.attempt_count();
    if attempts < shared.max_attempts {
        if let Err(e) = driver.reconnect() {
            warn!("reconnect request failed: {e}");
        }
        shared.attempt_count.store(attempts + 1, Ordering::Release);
        info!("retry to connect to the AP ({}/{})", attempts + 1, shared.max_attempts);
    } else {
        warn!("connect to the AP failed after {attempts} retries");
        shared.set_state(ConnectState::Failed);
        shared.signals.raise_failed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::reason;
    use crate::wifi::sim::{DriverCall, SimulatedDriver};
    use std::net::{IpAddr, Ipv4Addr};

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 4, 2));

    fn disconnected(reason: u16) -> DriverEvent {
        DriverEvent::StationDisconnected { reason }
    }

    #[test]
    fn disconnect_while_suppressed_is_ignored() {
        let shared = Shared::new(3);
        let driver = SimulatedDriver::new();
        shared.allow_reconnect(false);

        for _ in 0..10 {
            handle_event(&shared, &driver, disconnected(reason::ASSOC_LEAVE));
        }

        assert_eq!(shared.attempt_count(), 0);
        assert!(!shared.signals.snapshot().failed);
        assert_eq!(driver.count_calls(DriverCall::Reconnect), 0);
    }

    #[test]
    fn retries_are_bounded_then_failure_is_latched() {
        for max in [0u8, 1, 3, 5] {
            let shared = Shared::new(max);
            let driver = SimulatedDriver::new();
            shared.allow_reconnect(true);

            for n in 0..max {
                handle_event(&shared, &driver, disconnected(reason::FOURWAY_HANDSHAKE_TIMEOUT));
                assert_eq!(shared.attempt_count(), n + 1);
                assert!(!shared.signals.snapshot().failed);
            }

            handle_event(&shared, &driver, disconnected(reason::FOURWAY_HANDSHAKE_TIMEOUT));
            assert_eq!(shared.attempt_count(), max);
            assert!(shared.signals.snapshot().failed);
            assert_eq!(shared.state(), ConnectState::Failed);
            assert_eq!(driver.count_calls(DriverCall::Reconnect), max as usize);
        }
    }

    #[test]
    fn got_ip_resets_attempts_and_latches_connected() {
        let shared = Shared::new(3);
        let driver = SimulatedDriver::new();
        shared.allow_reconnect(true);
        handle_event(&shared, &driver, disconnected(reason::BEACON_TIMEOUT));
        handle_event(&shared, &driver, disconnected(reason::BEACON_TIMEOUT));
        assert_eq!(shared.attempt_count(), 2);

        handle_event(&shared, &driver, DriverEvent::GotIp { ip: IP });

        assert_eq!(shared.attempt_count(), 0);
        assert!(shared.signals.snapshot().connected);
        assert_eq!(shared.ip(), Some(IP));
        assert_eq!(shared.state(), ConnectState::Connected);
    }

    #[test]
    fn dispatcher_never_clears_signals() {
        let shared = Shared::new(0);
        let driver = SimulatedDriver::new();
        shared.allow_reconnect(true);

        handle_event(&shared, &driver, DriverEvent::GotIp { ip: IP });
        handle_event(&shared, &driver, disconnected(reason::BEACON_TIMEOUT));
        handle_event(&shared, &driver, DriverEvent::StationStarted);

        let latch = shared.signals.snapshot();
        assert!(latch.connected);
        assert!(latch.failed);
        assert_eq!(shared.ip(), None);
    }
}
