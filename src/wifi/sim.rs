//! Scriptable in-process driver.
//!
//! Behaves like a station-mode radio closely enough to exercise the whole
//! connection manager without hardware: it enforces init/start ordering,
//! raises events the way a real driver does, and records every call so
//! tests can assert on the sequence the manager issued.

use crate::error::{DriverError, DriverResult, reason};
use crate::wifi::driver::{
    DriverEvent, PingConfig, PingEvent, PingSessionId, RawAccessPoint, ScanConfig, WifiDriver,
};
use crate::wifi::types::ConnectionConfig;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Driver entry points, as recorded by [`SimulatedDriver::calls`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverCall {
    InitNetworkStack,
    CreateEventLoop,
    CreateStationInterface,
    InitDriver,
    DeinitDriver,
    Subscribe,
    Unsubscribe,
    SetStationMode,
    Start,
    Stop,
    SetConfig,
    Connect,
    Reconnect,
    Disconnect,
    Scan,
    ScanApCount,
    ScanApRecords,
    PingNewSession,
    PingStart,
    PingDeleteSession,
}

/// What the simulated AP does with one connect or reconnect request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Associate and hand out this address
    Associate(IpAddr),
    /// Drop the station with this reason code
    Reject(u16),
    /// Never answer
    Silent,
}

/// What happens to one echo request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoOutcome {
    Reply { elapsed_ms: u32 },
    Lost,
}

const NOT_STOPPED: i32 = 0x3004;
const DEFAULT_TTL: u8 = 64;

struct PingSlot {
    config: PingConfig,
    events: UnboundedSender<PingEvent>,
}

struct Inner {
    calls: Vec<DriverCall>,
    failures: HashMap<DriverCall, VecDeque<DriverError>>,
    event_loop_ready: bool,
    driver_ready: bool,
    started: bool,
    associated: bool,
    config: Option<ConnectionConfig>,
    events: Option<UnboundedSender<DriverEvent>>,
    link_script: VecDeque<LinkOutcome>,
    default_link: LinkOutcome,
    networks: Vec<RawAccessPoint>,
    last_scan: Vec<RawAccessPoint>,
    scan_panics: bool,
    pings: HashMap<u32, PingSlot>,
    next_ping_id: u32,
    echo_script: VecDeque<EchoOutcome>,
    default_echo: EchoOutcome,
}

impl Inner {
    /// Record the call and pop an injected failure for it, if any
    fn enter(&mut self, call: DriverCall) -> DriverResult<()> {
        self.calls.push(call);
        match self.failures.get_mut(&call).and_then(VecDeque::pop_front) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn emit(&self, event: DriverEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn require_driver(&self) -> DriverResult<()> {
        if self.driver_ready {
            Ok(())
        } else {
            Err(DriverError::NotInitialized)
        }
    }

    fn require_started(&self) -> DriverResult<()> {
        self.require_driver()?;
        if self.started {
            Ok(())
        } else {
            Err(DriverError::NotStarted)
        }
    }

    fn attempt_link(&mut self) {
        let outcome = self.link_script.pop_front().unwrap_or(self.default_link);
        match outcome {
            LinkOutcome::Associate(ip) => {
                self.associated = true;
                self.emit(DriverEvent::GotIp { ip });
            }
            LinkOutcome::Reject(reason) => {
                self.associated = false;
                self.emit(DriverEvent::StationDisconnected { reason });
            }
            LinkOutcome::Silent => {}
        }
    }

    fn drop_link(&mut self) {
        if self.associated {
            self.associated = false;
            self.emit(DriverEvent::StationDisconnected {
                reason: reason::ASSOC_LEAVE,
            });
        }
    }
}

/// In-process [`WifiDriver`] with scripted AP and echo behaviour
pub struct SimulatedDriver {
    inner: Mutex<Inner>,
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                calls: Vec::new(),
                failures: HashMap::new(),
                event_loop_ready: false,
                driver_ready: false,
                started: false,
                associated: false,
                config: None,
                events: None,
                link_script: VecDeque::new(),
                default_link: LinkOutcome::Associate(IpAddr::V4(Ipv4Addr::new(192, 168, 4, 2))),
                networks: Vec::new(),
                last_scan: Vec::new(),
                scan_panics: false,
                pings: HashMap::new(),
                next_ping_id: 1,
                echo_script: VecDeque::new(),
                default_echo: EchoOutcome::Reply { elapsed_ms: 10 },
            }),
        }
    }

    /// A small neighbourhood of networks that accepts any credentials
    pub fn demo() -> Self {
        let networks = [
            ("HomeNet", -42),
            ("CoffeeShop_Guest", -67),
            ("", -71),
            ("Printer-5G", -80),
        ]
        .into_iter()
        .map(|(ssid, rssi)| RawAccessPoint {
            ssid: ssid.as_bytes().to_vec(),
            rssi,
        })
        .collect();
        Self::new().with_networks(networks)
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_networks(self, networks: Vec<RawAccessPoint>) -> Self {
        self.inner().networks = networks;
        self
    }

    /// Outcomes for successive connect/reconnect requests
    pub fn with_link_outcomes(self, outcomes: impl IntoIterator<Item = LinkOutcome>) -> Self {
        self.inner().link_script.extend(outcomes);
        self
    }

    /// Outcome once the scripted ones are used up
    pub fn with_default_link_outcome(self, outcome: LinkOutcome) -> Self {
        self.inner().default_link = outcome;
        self
    }

    pub fn with_echo_outcomes(self, outcomes: impl IntoIterator<Item = EchoOutcome>) -> Self {
        self.inner().echo_script.extend(outcomes);
        self
    }

    pub fn with_default_echo_outcome(self, outcome: EchoOutcome) -> Self {
        self.inner().default_echo = outcome;
        self
    }

    /// Make every scan panic, as a crashing vendor driver would
    pub fn with_scan_panic(self) -> Self {
        self.inner().scan_panics = true;
        self
    }

    /// Make the next call to `call` fail with `error`
    pub fn fail_next(&self, call: DriverCall, error: DriverError) {
        self.inner()
            .failures
            .entry(call)
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.inner().calls.clone()
    }

    pub fn count_calls(&self, call: DriverCall) -> usize {
        self.inner().calls.iter().filter(|&&c| c == call).count()
    }

    pub fn clear_calls(&self) {
        self.inner().calls.clear();
    }

    pub fn applied_config(&self) -> Option<ConnectionConfig> {
        self.inner().config.clone()
    }

    pub fn is_started(&self) -> bool {
        self.inner().started
    }

    pub fn is_associated(&self) -> bool {
        self.inner().associated
    }

    pub fn live_ping_sessions(&self) -> usize {
        self.inner().pings.len()
    }

    /// Drop the link as if the AP went away
    pub fn lose_link(&self, reason: u16) {
        let mut inner = self.inner();
        inner.associated = false;
        inner.emit(DriverEvent::StationDisconnected { reason });
    }
}

impl WifiDriver for SimulatedDriver {
    fn init_network_stack(&self) -> DriverResult<()> {
        self.inner().enter(DriverCall::InitNetworkStack)
    }

    fn create_event_loop(&self) -> DriverResult<()> {
        let mut inner = self.inner();
        inner.enter(DriverCall::CreateEventLoop)?;
        if inner.event_loop_ready {
            return Err(DriverError::AlreadyInitialized);
        }
        inner.event_loop_ready = true;
        Ok(())
    }

    fn create_station_interface(&self) -> DriverResult<()> {
        self.inner().enter(DriverCall::CreateStationInterface)
    }

    fn init_driver(&self) -> DriverResult<()> {
        let mut inner = self.inner();
        inner.enter(DriverCall::InitDriver)?;
        inner.driver_ready = true;
        Ok(())
    }

    fn deinit_driver(&self) -> DriverResult<()> {
        let mut inner = self.inner();
        inner.enter(DriverCall::DeinitDriver)?;
        inner.require_driver()?;
        if inner.started {
            return Err(DriverError::Failure { code: NOT_STOPPED });
        }
        inner.driver_ready = false;
        inner.config = None;
        Ok(())
    }

    fn subscribe(&self) -> DriverResult<UnboundedReceiver<DriverEvent>> {
        let mut inner = self.inner();
        inner.enter(DriverCall::Subscribe)?;
        let (tx, rx) = mpsc::unbounded_channel();
        inner.events = Some(tx);
        Ok(rx)
    }

    fn unsubscribe(&self) {
        let mut inner = self.inner();
        inner.calls.push(DriverCall::Unsubscribe);
        inner.events = None;
    }

    fn set_station_mode(&self) -> DriverResult<()> {
        let mut inner = self.inner();
        inner.enter(DriverCall::SetStationMode)?;
        inner.require_driver()
    }

    fn start(&self) -> DriverResult<()> {
        let mut inner = self.inner();
        inner.enter(DriverCall::Start)?;
        inner.require_driver()?;
        if inner.started {
            return Err(DriverError::AlreadyStarted);
        }
        inner.started = true;
        inner.emit(DriverEvent::StationStarted);
        Ok(())
    }

    fn stop(&self) -> DriverResult<()> {
        let mut inner = self.inner();
        inner.enter(DriverCall::Stop)?;
        inner.require_driver()?;
        inner.drop_link();
        inner.started = false;
        Ok(())
    }

    fn set_config(&self, config: &ConnectionConfig) -> DriverResult<()> {
        let mut inner = self.inner();
        inner.enter(DriverCall::SetConfig)?;
        inner.require_driver()?;
        inner.config = Some(config.clone());
        Ok(())
    }

    fn connect(&self) -> DriverResult<()> {
        let mut inner = self.inner();
        inner.enter(DriverCall::Connect)?;
        inner.require_started()?;
        if inner.config.is_none() {
            return Err(DriverError::InvalidArgument);
        }
        inner.attempt_link();
        Ok(())
    }

    fn reconnect(&self) -> DriverResult<()> {
        let mut inner = self.inner();
        inner.enter(DriverCall::Reconnect)?;
        inner.require_started()?;
        inner.attempt_link();
        Ok(())
    }

    fn disconnect(&self) -> DriverResult<()> {
        let mut inner = self.inner();
        inner.enter(DriverCall::Disconnect)?;
        inner.require_started()?;
        inner.drop_link();
        Ok(())
    }

    fn scan(&self, _config: &ScanConfig) -> DriverResult<()> {
        let mut inner = self.inner();
        inner.enter(DriverCall::Scan)?;
        inner.require_started()?;
        if inner.scan_panics {
            drop(inner);
            panic!("simulated driver fault during scan");
        }
        inner.last_scan = inner.networks.clone();
        Ok(())
    }

    fn scan_ap_count(&self) -> DriverResult<u16> {
        let mut inner = self.inner();
        inner.enter(DriverCall::ScanApCount)?;
        Ok(u16::try_from(inner.last_scan.len()).unwrap_or(u16::MAX))
    }

    fn scan_ap_records(&self, max: u16) -> DriverResult<Vec<RawAccessPoint>> {
        let mut inner = self.inner();
        inner.enter(DriverCall::ScanApRecords)?;
        Ok(inner
            .last_scan
            .iter()
            .take(usize::from(max))
            .cloned()
            .collect())
    }

    fn ping_new_session(
        &self,
        config: &PingConfig,
        events: UnboundedSender<PingEvent>,
    ) -> DriverResult<PingSessionId> {
        let mut inner = self.inner();
        inner.enter(DriverCall::PingNewSession)?;
        let id = inner.next_ping_id;
        inner.next_ping_id += 1;
        inner.pings.insert(
            id,
            PingSlot {
                config: *config,
                events,
            },
        );
        Ok(PingSessionId(id))
    }

    fn ping_start(&self, id: PingSessionId) -> DriverResult<()> {
        let mut inner = self.inner();
        inner.enter(DriverCall::PingStart)?;
        let Some(slot) = inner.pings.get(&id.0) else {
            return Err(DriverError::InvalidArgument);
        };
        let config = slot.config;
        let events = slot.events.clone();

        let mut received = 0;
        let mut total_ms = 0;
        for n in 0..config.count {
            let seq = u16::try_from(n + 1).unwrap_or(u16::MAX);
            let outcome = inner.echo_script.pop_front().unwrap_or(inner.default_echo);
            let event = match outcome {
                EchoOutcome::Reply { elapsed_ms } => {
                    received += 1;
                    total_ms += elapsed_ms;
                    PingEvent::Reply {
                        seq,
                        ttl: DEFAULT_TTL,
                        size: u32::from(config.payload_size),
                        addr: config.target,
                        elapsed_ms,
                    }
                }
                EchoOutcome::Lost => {
                    total_ms += config.timeout_ms;
                    PingEvent::Timeout {
                        seq,
                        addr: config.target,
                    }
                }
            };
            let _ = events.send(event);
        }
        let _ = events.send(PingEvent::End {
            transmitted: config.count,
            received,
            total_ms,
        });
        Ok(())
    }

    fn ping_delete_session(&self, id: PingSessionId) -> DriverResult<()> {
        let mut inner = self.inner();
        inner.enter(DriverCall::PingDeleteSession)?;
        match inner.pings.remove(&id.0) {
            Some(_) => Ok(()),
            None => Err(DriverError::InvalidArgument),
        }
    }
}
