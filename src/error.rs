//! Error handling for the portsweep scanner

use thiserror::Error;

/// Main error type for scanning operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid ports: {0}")]
    InvalidPorts(String),

    #[error("SYN scan requires root privileges")]
    PrivilegeRequired,

    #[error("failed to open raw socket: {0}")]
    SocketOpenFailed(std::io::Error),

    #[error("no usable source address on any interface")]
    NoSourceAddress,

    #[error("connect to {0} failed")]
    ConnectFailed(std::net::SocketAddr),

    #[error("read timed out")]
    ReadTimeout,

    #[error("raw send to {0} failed: {1}")]
    SendFailed(std::net::Ipv4Addr, std::io::Error),

    #[error("segment shorter than a TCP header")]
    ShortSegment,

    #[error("failed to persist results: {0}")]
    PersistError(std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Per-task errors are recovered where they occur and never abort a scan.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ScanError::ConnectFailed(_)
                | ScanError::ReadTimeout
                | ScanError::SendFailed(..)
                | ScanError::ShortSegment
                | ScanError::PersistError(_)
        )
    }
}
