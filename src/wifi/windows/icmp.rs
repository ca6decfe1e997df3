use crate::error::{DriverError, DriverResult};
use crate::wifi::driver::{PingConfig, PingEvent};
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use windows::Win32::{
    Foundation::HANDLE,
    NetworkManagement::IpHelper::{ICMP_ECHO_REPLY, IcmpCloseHandle, IcmpCreateFile, IcmpSendEcho},
};

/// IP_SUCCESS in ICMP_ECHO_REPLY.Status
const IP_SUCCESS: u32 = 0;

/// ICMP handle that closes on drop
struct IcmpHandle(HANDLE);

impl IcmpHandle {
    fn open() -> DriverResult<Self> {
        unsafe { IcmpCreateFile() }
            .map(Self)
            .map_err(|e| DriverError::Failure { code: e.code().0 })
    }
}

impl Drop for IcmpHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = IcmpCloseHandle(self.0);
        }
    }
}

/// Only IPv4 echo is supported by this backend
pub fn ipv4_target(config: &PingConfig) -> DriverResult<Ipv4Addr> {
    match config.target {
        IpAddr::V4(addr) => Ok(addr),
        IpAddr::V6(_) => Err(DriverError::InvalidArgument),
    }
}

/// ICMP sequence field for the `n`th request; saturates past the field width
fn sequence_number(n: u32) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}

/// Run one echo session to completion, reporting every request and a final `End`
pub fn run_session(config: PingConfig, events: UnboundedSender<PingEvent>) {
    let started = Instant::now();
    let mut transmitted = 0u32;
    let mut received = 0u32;

    let handle = match (ipv4_target(&config), IcmpHandle::open()) {
        (Ok(addr), Ok(handle)) => Some((addr, handle)),
        _ => None,
    };

    if let Some((addr, handle)) = handle {
        let payload = vec![0x61u8; usize::from(config.payload_size)];
        let reply_len = std::mem::size_of::<ICMP_ECHO_REPLY>() + payload.len() + 8;
        let mut reply = vec![0u8; reply_len];

        for seq in 1..=config.count {
            let seq = sequence_number(seq);
            if seq > 1 {
                std::thread::sleep(Duration::from_millis(u64::from(config.interval_ms)));
            }
            transmitted += 1;

            let replies = unsafe {
                IcmpSendEcho(
                    handle.0,
                    u32::from_ne_bytes(addr.octets()),
                    payload.as_ptr().cast(),
                    config.payload_size,
                    None,
                    reply.as_mut_ptr().cast(),
                    reply_len as u32,
                    config.timeout_ms,
                )
            };

            // SAFETY: the buffer is at least one ICMP_ECHO_REPLY long
            let echo = unsafe { std::ptr::read_unaligned(reply.as_ptr() as *const ICMP_ECHO_REPLY) };
            let event = if replies > 0 && echo.Status == IP_SUCCESS {
                received += 1;
                PingEvent::Reply {
                    seq,
                    ttl: echo.Options.Ttl,
                    size: u32::from(echo.DataSize),
                    addr: IpAddr::V4(Ipv4Addr::from(echo.Address.to_ne_bytes())),
                    elapsed_ms: echo.RoundTripTime,
                }
            } else {
                PingEvent::Timeout {
                    seq,
                    addr: IpAddr::V4(addr),
                }
            };
            if events.send(event).is_err() {
                break;
            }
        }
    }

    let _ = events.send(PingEvent::End {
        transmitted,
        received,
        total_ms: started.elapsed().as_millis() as u32,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_saturates_instead_of_wrapping() {
        assert_eq!(sequence_number(1), 1);
        assert_eq!(sequence_number(65_535), u16::MAX);
        assert_eq!(sequence_number(65_536), u16::MAX);
        assert_eq!(sequence_number(u32::MAX), u16::MAX);
    }
}
