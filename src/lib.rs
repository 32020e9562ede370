//! Library crate for host-recon: port probing, follow-up HTTP/TLS checks, and risk scoring.
pub mod analyzer;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod ports;
pub mod probe;
pub mod report;
pub mod scanner;
pub mod scope;
pub mod screenshot;
pub mod target;
pub mod tls;
pub mod types;

pub use error::ScanError;
pub use scanner::{ScanRequest, Scanner};
pub use types::ScanReport;
