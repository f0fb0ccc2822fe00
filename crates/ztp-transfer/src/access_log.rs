//! Transfer server access log scanning
//!
//! The boot server appends one line per file request, e.g.
//!
//! ```text
//! Jun 12 10:03:55 tftpd[812]: 10.0.0.5 filename firmwares/des-3200-r4.had
//! ```
//!
//! A device's progress is read off which areas it has fetched from. Lines
//! are never consumed, so the result only ever grows for a given device.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

static REQUEST_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}) filename (\S+)")
        .expect("request line pattern compiles")
});

/// Path fragments identifying firmware and config downloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMarkers {
    pub firmware: String,
    pub config: String,
}

impl Default for ArtifactMarkers {
    fn default() -> Self {
        Self {
            firmware: "firmwares".to_string(),
            config: "configs".to_string(),
        }
    }
}

/// Which artifacts a device has requested so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtifactsRequested {
    pub firmware: bool,
    pub config: bool,
}

impl ArtifactsRequested {
    pub fn both(&self) -> bool {
        self.firmware && self.config
    }
}

/// One parsed request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    pub client: Ipv4Addr,
    pub path: String,
}

/// Every well-formed request line in `log`, in order
pub fn parse_requests(log: &str) -> Vec<FileRequest> {
    log.lines()
        .filter_map(|line| {
            let caps = REQUEST_LINE.captures(line)?;
            let client = caps[1].parse().ok()?;
            Some(FileRequest {
                client,
                path: caps[2].to_string(),
            })
        })
        .collect()
}

/// Scan `log` for requests made by `device`
pub fn scan(log: &str, device: Ipv4Addr, markers: &ArtifactMarkers) -> ArtifactsRequested {
    parse_requests(log)
        .into_iter()
        .filter(|req| req.client == device)
        .fold(ArtifactsRequested::default(), |mut seen, req| {
            seen.firmware |= req.path.contains(&markers.firmware);
            seen.config |= req.path.contains(&markers.config);
            seen
        })
}
