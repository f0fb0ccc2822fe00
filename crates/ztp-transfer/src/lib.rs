//! ZTP transfer server access
//!
//! Switches fetch firmware and configs from a boot server during ZTP. The
//! workflow reads two things from it: the access log, to see what a device
//! has downloaded, and full-config command files to push after reboot.
//!
//! - [`TransferServer`]: list and download seam
//! - [`FtpTransferServer`]: passive-mode FTP client over tokio
//! - [`MemoryTransferServer`]: in-memory files for tests and dry runs
//! - [`access_log`]: request-line parsing and artifact detection

pub mod access_log;
pub mod error;
pub mod ftp;
pub mod server;

pub use access_log::{scan, ArtifactMarkers, ArtifactsRequested, FileRequest};
pub use error::{Result, TransferError};
pub use ftp::{FtpConfig, FtpTransferServer, DEFAULT_FTP_PORT};
pub use server::{MemoryTransferServer, TransferServer};
