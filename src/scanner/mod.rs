//! Scan orchestration: task and record types, engine selection, shutdown

pub mod syn;
pub mod tcp;

use crate::config::{ScanConfig, ScanMode};
use crate::error::ScanError;
use crate::output::ResultSink;
use crate::target::{expand_ports, expand_targets};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::watch;

/// One (address, port) probe, consumed by exactly one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTask {
    pub ip: Ipv4Addr,
    pub port: u16,
}

/// An open port, as published to the sink
#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub is_open: bool,
    pub banner: String,
    pub timestamp: DateTime<Utc>,
    pub error: String,
}

impl ScanRecord {
    pub fn open(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            ip,
            port,
            is_open: true,
            banner: String::new(),
            timestamp: Utc::now(),
            error: String::new(),
        }
    }

    pub fn with_banner(mut self, banner: String) -> Self {
        self.banner = banner;
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = error;
        self
    }
}

/// Owns the shutdown signal and runs the configured engine to completion.
pub struct Scanner {
    config: Arc<ScanConfig>,
    sink: Arc<ResultSink>,
    shutdown: watch::Sender<bool>,
}

impl Scanner {
    /// Validate the configuration and prepare a scanner with a default
    /// sink (stdout plus `Result.txt` when persistence is on).
    pub fn new(config: ScanConfig) -> crate::Result<Self> {
        Self::with_sink(config, Arc::new(ResultSink::new()))
    }

    /// Same, with a caller-supplied sink.
    pub fn with_sink(config: ScanConfig, sink: Arc<ResultSink>) -> crate::Result<Self> {
        config.validate()?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            config: Arc::new(config),
            sink,
            shutdown,
        })
    }

    /// Broadcast shutdown to the producer, every worker and the SYN
    /// receiver. Work already completed keeps its results. Takes effect
    /// even before `run` has subscribed any watchers.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Records collected so far; open ports only.
    pub fn results(&self) -> Vec<ScanRecord> {
        self.sink.records()
    }

    /// Run the scan to completion, then persist if configured.
    pub async fn run(&self) -> crate::Result<()> {
        let targets = expand_targets(&self.config.start_ip, self.config.end_ip.as_deref())?;
        if targets.is_empty() {
            return Err(ScanError::InvalidTarget(
                "address range is empty".to_string(),
            ));
        }
        let ports = expand_ports(&self.config.ports)?;

        log::info!(
            "{} scan: {} hosts x {} ports with {} workers",
            self.config.mode,
            targets.len(),
            ports.len(),
            self.config.concurrency
        );

        let shutdown = self.shutdown.subscribe();
        match self.config.mode {
            ScanMode::Connect => {
                tcp::run(
                    Arc::clone(&self.config),
                    targets,
                    ports,
                    Arc::clone(&self.sink),
                    shutdown,
                )
                .await?
            }
            ScanMode::Syn => {
                syn::run(
                    Arc::clone(&self.config),
                    targets,
                    ports,
                    Arc::clone(&self.sink),
                    shutdown,
                )
                .await?
            }
        }

        if self.config.persist {
            // Persistence failures are reported but never undo the scan.
            if let Err(e) = self.sink.persist(&self.config) {
                log::warn!("{}", e);
                eprintln!("Warning: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inverted_range_is_reported_not_panicked() {
        let config = ScanConfig::new(ScanMode::Connect, "10.0.0.9")
            .with_end_ip("10.0.0.1")
            .with_ports("80");
        let scanner = Scanner::new(config).unwrap();
        assert!(matches!(
            scanner.run().await,
            Err(ScanError::InvalidTarget(_))
        ));
    }

    #[tokio::test]
    async fn invalid_ports_fail_before_scanning() {
        let config = ScanConfig::new(ScanMode::Connect, "127.0.0.1").with_ports("90-80");
        let scanner = Scanner::new(config).unwrap();
        assert!(matches!(
            scanner.run().await,
            Err(ScanError::InvalidPorts(_))
        ));
    }

    #[test]
    fn config_round_trips_through_the_scanner() {
        let config = ScanConfig::new(ScanMode::Syn, "10.0.0.0/30")
            .with_ports("80,443")
            .with_concurrency(16);
        let scanner = Scanner::new(config).unwrap();
        assert_eq!(scanner.config().mode, ScanMode::Syn);
        assert_eq!(scanner.config().start_ip, "10.0.0.0/30");
        assert_eq!(scanner.config().ports, "80,443");
        assert_eq!(scanner.config().concurrency, 16);
    }

    #[test]
    fn record_builders() {
        let record = ScanRecord::open(Ipv4Addr::LOCALHOST, 80)
            .with_banner("nginx".to_string())
            .with_error(String::new());
        assert!(record.is_open);
        assert_eq!(record.banner, "nginx");
        assert!(record.error.is_empty());
    }
}
