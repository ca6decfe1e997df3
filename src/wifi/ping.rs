use crate::error::{DriverResultExt, WifiError, WifiResult};
use crate::wifi::driver::{PingConfig, PingEvent, PingSessionId, WifiDriver};
use crate::wifi::manager::ConnectionManager;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// End-of-session statistics for one echo session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingReport {
    pub target: IpAddr,
    pub transmitted: u32,
    pub received: u32,
    pub elapsed_ms: u32,
}

impl PingReport {
    pub fn loss_percent(&self) -> u32 {
        if self.transmitted == 0 {
            return 0;
        }
        let lost = self.transmitted - self.received.min(self.transmitted);
        (u64::from(lost) * 100 / u64::from(self.transmitted)) as u32
    }
}

/// A running echo session. Dropping the handle does not stop the session.
#[derive(Debug)]
pub struct PingHandle {
    id: PingSessionId,
    target: IpAddr,
    report: oneshot::Receiver<PingReport>,
}

impl PingHandle {
    pub fn id(&self) -> PingSessionId {
        self.id
    }

    pub fn target(&self) -> IpAddr {
        self.target
    }

    /// Wait for the end-of-session summary
    pub async fn wait(self) -> WifiResult<PingReport> {
        self.report.await.map_err(|_| WifiError::EventChannelClosed)
    }
}

impl<D: WifiDriver> ConnectionManager<D> {
    /// Start an asynchronous echo session of `count` requests to `target`.
    ///
    /// `target` must be a numeric IPv4 or IPv6 address; anything else fails
    /// before a session exists. Lost replies are reported as timeouts, not
    /// errors. The session is released once, when it ends.
    pub fn ping(&self, target: &str, count: u32) -> WifiResult<PingHandle> {
        let addr: IpAddr = target
            .trim()
            .parse()
            .map_err(|_| WifiError::AddressParse(target.to_string()))?;

        let config = PingConfig {
            target: addr,
            count,
            interval_ms: self.config.ping_interval_ms,
            timeout_ms: self.config.ping_timeout_ms,
            payload_size: self.config.ping_payload_size,
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let id = self
            .driver
            .ping_new_session(&config, events_tx)
            .during("create ping session")?;

        let (report_tx, report_rx) = oneshot::channel();
        tokio::spawn(supervise(self.driver.clone(), id, addr, events_rx, report_tx));

        if let Err(e) = self.driver.ping_start(id) {
            // The supervisor only deletes on End, which a failed start never sends
            if let Err(del) = self.driver.ping_delete_session(id) {
                warn!("failed to delete ping session {}: {del}", id.0);
            }
            return Err(WifiError::Driver {
                op: "start ping session",
                source: e,
            });
        }
        info!("ping {addr}: {count} requests");

        Ok(PingHandle {
            id,
            target: addr,
            report: report_rx,
        })
    }
}

async fn supervise<D: WifiDriver>(
    driver: Arc<D>,
    id: PingSessionId,
    target: IpAddr,
    mut events: mpsc::UnboundedReceiver<PingEvent>,
    report: oneshot::Sender<PingReport>,
) {
    while let Some(event) = events.recv().await {
        match event {
            PingEvent::Reply {
                seq,
                ttl,
                size,
                addr,
                elapsed_ms,
            } => {
                info!("{size} bytes from {addr} icmp_seq={seq} ttl={ttl} time={elapsed_ms} ms");
            }
            PingEvent::Timeout { seq, addr } => {
                info!("From {addr} icmp_seq={seq} timeout");
            }
            PingEvent::End {
                transmitted,
                received,
                total_ms,
            } => {
                let summary = PingReport {
                    target,
                    transmitted,
                    received,
                    elapsed_ms: total_ms,
                };
                info!(
                    "{transmitted} packets transmitted, {received} received, {}% packet loss, time {total_ms}ms",
                    summary.loss_percent()
                );
                if let Err(e) = driver.ping_delete_session(id) {
                    warn!("failed to delete ping session {}: {e}", id.0);
                }
                let _ = report.send(summary);
                return;
            }
        }
    }
    debug!("ping session {} closed without an end event", id.0);
}
