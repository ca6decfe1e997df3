use crate::config::ManagerConfig;
use crate::wifi::driver::WifiDriver;
use crate::wifi::signals::OutcomeSignals;
use crate::wifi::types::ConnectState;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// State shared between the caller's context and the event dispatcher task.
///
/// `attempt_count` is written by `connect` before an attempt starts and by
/// the dispatcher while it runs; the two never write concurrently.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) max_attempts: u8,
    pub(crate) attempt_count: AtomicU8,
    pub(crate) reconnect_allowed: AtomicBool,
    pub(crate) system_initialized: AtomicBool,
    pub(crate) driver_initialized: AtomicBool,
    pub(crate) signals: OutcomeSignals,
    state: AtomicU8,
    ip: Mutex<Option<IpAddr>>,
}

impl Shared {
    pub(crate) fn new(max_attempts: u8) -> Self {
        Self {
            max_attempts,
            attempt_count: AtomicU8::new(0),
            reconnect_allowed: AtomicBool::new(false),
            system_initialized: AtomicBool::new(false),
            driver_initialized: AtomicBool::new(false),
            signals: OutcomeSignals::new(),
            state: AtomicU8::new(ConnectState::Idle as u8),
            ip: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> ConnectState {
        ConnectState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, next: ConnectState) {
        let prev = self.state.swap(next as u8, Ordering::AcqRel);
        if prev != next as u8 {
            tracing::debug!("state {:?} -> {:?}", ConnectState::from_raw(prev), next);
        }
    }

    pub(crate) fn allow_reconnect(&self, allowed: bool) {
        self.reconnect_allowed.store(allowed, Ordering::Release);
    }

    pub(crate) fn reconnect_allowed(&self) -> bool {
        self.reconnect_allowed.load(Ordering::Acquire)
    }

    pub(crate) fn attempt_count(&self) -> u8 {
        self.attempt_count.load(Ordering::Acquire)
    }

    pub(crate) fn set_ip(&self, ip: Option<IpAddr>) {
        if let Ok(mut slot) = self.ip.lock() {
            *slot = ip;
        }
    }

    pub(crate) fn ip(&self) -> Option<IpAddr> {
        self.ip.lock().ok().and_then(|slot| *slot)
    }
}

/// Station-mode connection manager.
///
/// Owns the retry bookkeeping, readiness flags and outcome signals, plus the
/// handle of the task that dispatches driver events into them. Lifecycle,
/// connect, scan and ping operations are implemented in their own modules.
pub struct ConnectionManager<D: WifiDriver> {
    pub(crate) driver: Arc<D>,
    pub(crate) shared: Arc<Shared>,
    pub(crate) config: ManagerConfig,
    pub(crate) dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl<D: WifiDriver> ConnectionManager<D> {
    pub fn new(driver: D, config: ManagerConfig) -> Self {
        Self::with_shared_driver(Arc::new(driver), config)
    }

    /// Build a manager around a driver the caller keeps a handle to
    pub fn with_shared_driver(driver: Arc<D>, config: ManagerConfig) -> Self {
        Self {
            driver,
            shared: Arc::new(Shared::new(config.max_attempts)),
            config,
            dispatcher: Mutex::new(None),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectState {
        self.shared.state()
    }

    /// Address acquired by the current session, if any
    pub fn ip_address(&self) -> Option<IpAddr> {
        self.shared.ip()
    }

    pub fn attempt_count(&self) -> u8 {
        self.shared.attempt_count()
    }

    pub fn reconnect_allowed(&self) -> bool {
        self.shared.reconnect_allowed()
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.system_initialized.load(Ordering::Acquire)
            && self.shared.driver_initialized.load(Ordering::Acquire)
    }
}

impl<D: WifiDriver> Drop for ConnectionManager<D> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.dispatcher.lock()
            && let Some(task) = slot.take()
        {
            task.abort();
        }
    }
}
