//! Configuration for scanning operations

use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default number of concurrent workers
pub const DEFAULT_CONCURRENCY: usize = 512;

/// Default per-operation timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 3;

/// Probe modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    /// Full three-way handshake via connect()
    Connect,
    /// Half-open scan with raw SYN probes
    Syn,
}

impl ScanMode {
    pub fn name(&self) -> &'static str {
        match self {
            ScanMode::Connect => "TCP",
            ScanMode::Syn => "SYN",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScanMode {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Ok(ScanMode::Connect),
            "SYN" => Ok(ScanMode::Syn),
            other => Err(ScanError::InvalidArgs(format!(
                "scan type must be TCP or SYN, got {:?}",
                other
            ))),
        }
    }
}

/// Main configuration structure, immutable once a scan starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Probe modality
    pub mode: ScanMode,

    /// First address to scan, dotted quad or CIDR (`a.b.c.d/n`)
    pub start_ip: String,

    /// Last address of an inclusive range; absent for single-address and
    /// CIDR targets
    pub end_ip: Option<String>,

    /// Port specification: comma-separated ports and `a-b` ranges
    pub ports: String,

    /// Number of concurrent workers
    pub concurrency: usize,

    /// Timeout for each connect/read operation in seconds
    pub timeout_secs: u64,

    /// Append open ports to Result.txt on completion
    pub persist: bool,

    /// Read a service banner from each open port (connect mode only)
    pub grab_banner: bool,

    /// Probe ports 80/443 with an HTTP HEAD request and report the
    /// Server header; implies `grab_banner`
    pub http_banner: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: ScanMode::Connect,
            start_ip: "127.0.0.1".to_string(),
            end_ip: None,
            ports: "1-1024".to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            persist: false,
            grab_banner: false,
            http_banner: false,
        }
    }
}

impl ScanConfig {
    /// Create a configuration for the given mode and start address
    pub fn new(mode: ScanMode, start_ip: impl Into<String>) -> Self {
        Self {
            mode,
            start_ip: start_ip.into(),
            ..Default::default()
        }
    }

    /// Set the end of the address range
    pub fn with_end_ip(mut self, end_ip: impl Into<String>) -> Self {
        self.end_ip = Some(end_ip.into());
        self
    }

    /// Set the port specification
    pub fn with_ports(mut self, ports: impl Into<String>) -> Self {
        self.ports = ports.into();
        self
    }

    /// Set the worker count
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the per-operation timeout in seconds
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Enable banner capture; `http` additionally switches ports 80/443
    /// to an HTTP HEAD probe
    pub fn with_banner(mut self, http: bool) -> Self {
        self.grab_banner = true;
        self.http_banner = http;
        self
    }

    /// Persist results on completion
    pub fn with_persist(mut self) -> Self {
        self.persist = true;
        self
    }

    /// Per-operation timeout as a Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.start_ip.is_empty() {
            return Err(ScanError::InvalidTarget("no target given".to_string()));
        }
        if self.start_ip.contains('/') && self.end_ip.is_some() {
            return Err(ScanError::InvalidTarget(
                "a CIDR target cannot be combined with an end address".to_string(),
            ));
        }
        if self.ports.is_empty() {
            return Err(ScanError::InvalidPorts("no ports specified".to_string()));
        }
        if self.concurrency == 0 {
            return Err(ScanError::InvalidArgs(
                "worker count must be greater than 0".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ScanError::InvalidArgs(
                "timeout must be greater than 0".to_string(),
            ));
        }
        if self.http_banner && !self.grab_banner {
            return Err(ScanError::InvalidArgs(
                "HTTP banner probing requires banner capture".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("tcp".parse::<ScanMode>().unwrap(), ScanMode::Connect);
        assert_eq!("TCP".parse::<ScanMode>().unwrap(), ScanMode::Connect);
        assert_eq!("Syn".parse::<ScanMode>().unwrap(), ScanMode::Syn);
        assert!("UDP".parse::<ScanMode>().is_err());
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ScanConfig::default().validate().is_ok());
    }

    #[test]
    fn cidr_with_end_ip_is_rejected() {
        let config = ScanConfig::new(ScanMode::Connect, "10.0.0.0/24").with_end_ip("10.0.0.9");
        assert!(matches!(
            config.validate(),
            Err(ScanError::InvalidTarget(_))
        ));
    }

    #[test]
    fn zero_workers_rejected() {
        let config = ScanConfig::default().with_concurrency(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = ScanConfig::default().with_timeout_secs(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_ports_rejected() {
        let config = ScanConfig::default().with_ports("");
        assert!(matches!(config.validate(), Err(ScanError::InvalidPorts(_))));
    }
}
