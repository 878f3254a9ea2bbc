//! Half-open SYN engine
//!
//! One raw socket is shared by a send loop and a receive loop. Probes are
//! fire-and-forget; any SYN+ACK arriving on the socket is taken as
//! evidence that the responding host:port is open. Responses are not
//! correlated against probe source ports, so unrelated on-box TCP traffic
//! can in principle register as a hit.

use crate::config::ScanConfig;
use crate::network::packet::{build_syn_probe, parse_reply};
use crate::network::socket::{ensure_privileged, source_address, RawSocket};
use crate::output::{Progress, ResultSink};
use crate::scanner::ScanRecord;
use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};

/// Receive buffer sized for any Ethernet-delivered datagram
const RECV_BUF_LEN: usize = 1500;

pub async fn run(
    config: Arc<ScanConfig>,
    targets: Vec<Ipv4Addr>,
    ports: Vec<u16>,
    sink: Arc<ResultSink>,
    mut shutdown: watch::Receiver<bool>,
) -> crate::Result<()> {
    ensure_privileged()?;
    let src_ip = source_address()?;

    // The socket closes when this function returns, on every path.
    let socket = Arc::new(RawSocket::open()?);
    socket.set_read_timeout(config.timeout_duration())?;

    let stop_receiving = Arc::new(AtomicBool::new(false));
    let (record_tx, mut record_rx) = mpsc::channel::<ScanRecord>(config.concurrency);

    // Receiver: blocking reads bounded by the per-op timeout. Dropping
    // record_tx when this thread exits is what ends the collector.
    let receiver = {
        let socket = Arc::clone(&socket);
        let stop = Arc::clone(&stop_receiving);
        tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; RECV_BUF_LEN];
            loop {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                match socket.recv(&mut buf) {
                    Ok(n) => {
                        if let Some(record) = open_port_record(&buf[..n]) {
                            if record_tx.blocking_send(record).is_err() {
                                break;
                            }
                        }
                    }
                    // A timed-out read just means nothing arrived yet;
                    // the platform reports it as WouldBlock or TimedOut.
                    Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                    Err(e) => log::debug!("raw receive failed: {}", e),
                }
            }
        })
    };

    let collector = {
        let sink = Arc::clone(&sink);
        tokio::spawn(async move {
            while let Some(record) = record_rx.recv().await {
                sink.record(record);
            }
        })
    };

    // Send loop: one probe per (ip, port), fire-and-forget. Send errors
    // are recorded in the log and the sweep continues.
    let progress = Progress::new(targets.len() * ports.len());
    let mut aborted = false;
    'sweep: for &ip in &targets {
        for &port in &ports {
            if *shutdown.borrow() {
                aborted = true;
                break 'sweep;
            }
            let probe = build_syn_probe(src_ip, ip, ephemeral_port(), port, clock_seq(), clock_ip_id());
            if let Err(e) = socket.send_to(&probe, ip) {
                log::warn!("{}", e);
            }
            progress.tick();
        }
    }
    progress.finish();

    // Give stragglers one extra timeout interval before tearing down.
    if !aborted {
        tokio::select! {
            _ = tokio::time::sleep(config.timeout_duration()) => {}
            _ = shutdown.changed() => {}
        }
    }

    stop_receiving.store(true, Ordering::Release);
    let _ = receiver.await;
    let _ = collector.await;
    Ok(())
}

/// Receive-side filter: only a SYN+ACK reply produces a record. RST
/// answers mean closed and are logged but never recorded; anything else
/// is dropped silently.
fn open_port_record(datagram: &[u8]) -> Option<ScanRecord> {
    let reply = parse_reply(datagram)?;
    if reply.header.is_syn_ack() {
        return Some(ScanRecord::open(reply.source, reply.header.src_port));
    }
    if reply.header.is_rst() {
        log::debug!("{}:{} answered RST", reply.source, reply.header.src_port);
    }
    None
}

fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

/// Ephemeral source port in [1024, 65534], fresh per probe
fn ephemeral_port() -> u16 {
    1024 + (now_nanos() % 64511) as u16
}

/// Initial sequence number from the low bits of the clock
fn clock_seq() -> u32 {
    now_nanos() as u32
}

/// IP identification field; varies monotonically with the clock
fn clock_ip_id() -> u16 {
    now_nanos() as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::packet::{build_syn_probe, IP_HEADER_LEN};
    use crate::network::{FLAG_ACK, FLAG_RST, FLAG_SYN};

    fn reply_with_flags(flags: u8) -> Vec<u8> {
        let responder = Ipv4Addr::new(10, 0, 0, 1);
        let scanner = Ipv4Addr::new(192, 168, 1, 10);
        let mut datagram = build_syn_probe(responder, scanner, 443, 40123, 1, 1);
        datagram[IP_HEADER_LEN + 13] = flags;
        datagram
    }

    #[test]
    fn syn_ack_becomes_an_open_record() {
        let record = open_port_record(&reply_with_flags(FLAG_SYN | FLAG_ACK)).unwrap();
        assert_eq!(record.ip, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(record.port, 443);
        assert!(record.is_open);
    }

    #[test]
    fn rst_and_other_replies_are_ignored() {
        assert!(open_port_record(&reply_with_flags(FLAG_RST | FLAG_ACK)).is_none());
        assert!(open_port_record(&reply_with_flags(FLAG_ACK)).is_none());
        assert!(open_port_record(&reply_with_flags(FLAG_SYN)).is_none());
    }

    #[test]
    fn truncated_datagrams_are_ignored() {
        let datagram = reply_with_flags(FLAG_SYN | FLAG_ACK);
        assert!(open_port_record(&datagram[..IP_HEADER_LEN + 10]).is_none());
        assert!(open_port_record(&[]).is_none());
    }

    #[test]
    fn ephemeral_ports_stay_in_range() {
        for _ in 0..1000 {
            let port = ephemeral_port();
            assert!((1024..=65534).contains(&port));
        }
    }

    #[test]
    fn clock_fields_vary() {
        let a = (clock_seq(), clock_ip_id());
        std::thread::sleep(std::time::Duration::from_micros(10));
        let b = (clock_seq(), clock_ip_id());
        assert_ne!(a, b);
    }
}
