//! portsweep - a concurrent IPv4 port scanner
//!
//! Full-connect TCP scanning with optional banner capture, and half-open
//! SYN scanning over a shared raw socket.

pub mod cli;
pub mod config;
pub mod error;
pub mod network;
pub mod output;
pub mod scanner;
pub mod target;

// Re-export commonly used types
pub use config::{ScanConfig, ScanMode};
pub use error::ScanError;
pub use output::ResultSink;
pub use scanner::{ScanRecord, ScanTask, Scanner};

pub type Result<T> = std::result::Result<T, ScanError>;
