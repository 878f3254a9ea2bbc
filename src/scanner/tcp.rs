//! TCP connect engine
//!
//! A fixed pool of workers consumes a bounded task channel; the channel
//! capacity equals the pool size, so the producer blocks while every
//! worker is busy. Open ports flow over a second channel to a single
//! collector, which is the only writer to the sink.

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::output::{Progress, ResultSink};
use crate::scanner::{ScanRecord, ScanTask};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::timeout;

/// Cap on banner bytes read from an open connection
const BANNER_CAP: usize = 1024;

/// Request sent to ports 80/443 when HTTP banner probing is enabled
const HTTP_HEAD_PROBE: &[u8] = b"HEAD / HTTP/1.0\r\n\r\n";

pub async fn run(
    config: Arc<ScanConfig>,
    targets: Vec<Ipv4Addr>,
    ports: Vec<u16>,
    sink: Arc<ResultSink>,
    shutdown: watch::Receiver<bool>,
) -> crate::Result<()> {
    let total = targets.len() * ports.len();
    let progress = Arc::new(Progress::new(total));

    let (task_tx, task_rx) = mpsc::channel::<ScanTask>(config.concurrency);
    let task_rx = Arc::new(Mutex::new(task_rx));
    let (record_tx, mut record_rx) = mpsc::channel::<ScanRecord>(config.concurrency);

    let collector = {
        let sink = Arc::clone(&sink);
        tokio::spawn(async move {
            while let Some(record) = record_rx.recv().await {
                sink.record(record);
            }
        })
    };

    let mut workers = Vec::with_capacity(config.concurrency);
    for _ in 0..config.concurrency {
        let config = Arc::clone(&config);
        let task_rx = Arc::clone(&task_rx);
        let record_tx = record_tx.clone();
        let progress = Arc::clone(&progress);
        let mut shutdown = shutdown.clone();
        workers.push(tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                // Holding the lock only serializes task pickup; probes
                // themselves run concurrently.
                let task = {
                    let mut rx = task_rx.lock().await;
                    tokio::select! {
                        task = rx.recv() => task,
                        _ = shutdown.changed() => None,
                    }
                };
                let Some(task) = task else { break };

                if let Some(record) = probe(&config, task).await {
                    if record_tx.send(record).await.is_err() {
                        break;
                    }
                }
                progress.tick();
            }
        }));
    }
    drop(record_tx);

    // Producer: row-major over (ip, port). Dropping the sender closes the
    // channel, which is what lets idle workers finish.
    let mut producer_shutdown = shutdown.clone();
    let producer = tokio::spawn(async move {
        'submit: for ip in targets {
            for &port in &ports {
                if *producer_shutdown.borrow() {
                    break 'submit;
                }
                let task = ScanTask { ip, port };
                tokio::select! {
                    sent = task_tx.send(task) => {
                        if sent.is_err() {
                            break 'submit;
                        }
                    }
                    _ = producer_shutdown.changed() => break 'submit,
                }
            }
        }
    });

    let _ = producer.await;
    for worker in workers {
        let _ = worker.await;
    }
    let _ = collector.await;
    progress.finish();
    Ok(())
}

/// Dial one target; Some only when the port accepted the handshake
/// within the deadline.
async fn probe(config: &ScanConfig, task: ScanTask) -> Option<ScanRecord> {
    let addr = SocketAddr::from((task.ip, task.port));
    let mut stream = match dial(addr, config.timeout_duration()).await {
        Ok(stream) => stream,
        Err(e) => {
            log::debug!("{}", e);
            return None;
        }
    };

    let mut record = ScanRecord::open(task.ip, task.port);
    if config.grab_banner {
        let deadline = config.timeout_duration();
        let grabbed = if config.http_banner && (task.port == 80 || task.port == 443) {
            http_banner(&mut stream, deadline).await
        } else {
            service_banner(&mut stream, deadline).await
        };
        match grabbed {
            Ok(banner) => record = record.with_banner(banner),
            // The port is open either way; an unreadable banner stays empty.
            Err(e) => record = record.with_error(e.to_string()),
        }
    }
    Some(record)
}

async fn dial(addr: SocketAddr, deadline: Duration) -> crate::Result<TcpStream> {
    match timeout(deadline, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(_)) | Err(_) => Err(ScanError::ConnectFailed(addr)),
    }
}

/// Read whatever the service volunteers, up to the cap.
async fn service_banner(stream: &mut TcpStream, deadline: Duration) -> crate::Result<String> {
    let mut buf = [0u8; BANNER_CAP];
    let n = timeout(deadline, stream.read(&mut buf))
        .await
        .map_err(|_| ScanError::ReadTimeout)??;
    Ok(String::from_utf8_lossy(&buf[..n]).trim().to_string())
}

/// Send an HTTP HEAD request and pull the Server header out of the
/// response. Port 443 gets the same plaintext probe; TLS is not
/// negotiated, which limits this to servers that answer in the clear.
async fn http_banner(stream: &mut TcpStream, deadline: Duration) -> crate::Result<String> {
    stream.write_all(HTTP_HEAD_PROBE).await?;
    let mut buf = [0u8; BANNER_CAP];
    let n = timeout(deadline, stream.read(&mut buf))
        .await
        .map_err(|_| ScanError::ReadTimeout)??;
    Ok(server_header(&String::from_utf8_lossy(&buf[..n])))
}

/// Value of the first case-insensitive `Server:` header, trimmed; empty
/// when the response carries none.
fn server_header(response: &str) -> String {
    for line in response.split("\r\n") {
        if line.to_ascii_lowercase().starts_with("server:") {
            return line["server:".len()..].trim().to_string();
        }
    }
    String::new()
}
