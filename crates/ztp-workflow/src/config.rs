//! Engine configuration
//!
//! Settings are passed into the engine at construction. Nothing reads
//! global state at run time.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use ztp_transfer::ArtifactMarkers;

use crate::error::{Result, WorkflowError};

/// Default interval between readiness checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of consecutive transient check errors tolerated
pub const DEFAULT_PROBE_ERROR_BUDGET: u32 = 5;

/// Default location of the boot server's access log
pub const DEFAULT_ACCESS_LOG_PATH: &str = "/tftp/test.log";

/// Default directory holding full-config command files
pub const DEFAULT_FULL_CONFIG_DIR: &str = "/configs/full";

/// How long a wait may last
///
/// Written as a number of seconds or the word `forever`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WaitLimitRepr", into = "WaitLimitRepr")]
pub enum WaitLimit {
    Forever,
    Seconds(u64),
}

impl WaitLimit {
    /// Limit as a duration, `None` for [`WaitLimit::Forever`]
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            WaitLimit::Forever => None,
            WaitLimit::Seconds(secs) => Some(Duration::from_secs(*secs)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WaitLimitRepr {
    Seconds(u64),
    Keyword(String),
}

impl TryFrom<WaitLimitRepr> for WaitLimit {
    type Error = String;

    fn try_from(repr: WaitLimitRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            WaitLimitRepr::Seconds(secs) => Ok(WaitLimit::Seconds(secs)),
            WaitLimitRepr::Keyword(word) if word == "forever" => Ok(WaitLimit::Forever),
            WaitLimitRepr::Keyword(word) => Err(format!(
                "invalid wait limit {word:?}, expected seconds or \"forever\""
            )),
        }
    }
}

impl From<WaitLimit> for WaitLimitRepr {
    fn from(limit: WaitLimit) -> Self {
        match limit {
            WaitLimit::Forever => WaitLimitRepr::Keyword("forever".to_string()),
            WaitLimit::Seconds(secs) => WaitLimitRepr::Seconds(secs),
        }
    }
}

/// Limits for the three device waits; all must be given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitLimits {
    /// Device first answering probes
    pub up: WaitLimit,
    /// Device fetching firmware and config, then dropping off
    pub download: WaitLimit,
    /// Device answering probes again after reboot
    pub rebooted: WaitLimit,
}

impl WaitLimits {
    /// Same limit for every wait
    pub fn uniform(limit: WaitLimit) -> Self {
        Self {
            up: limit,
            download: limit,
            rebooted: limit,
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_probe_error_budget() -> u32 {
    DEFAULT_PROBE_ERROR_BUDGET
}

fn default_access_log_path() -> String {
    DEFAULT_ACCESS_LOG_PATH.to_string()
}

fn default_full_config_dir() -> String {
    DEFAULT_FULL_CONFIG_DIR.to_string()
}

fn default_preamble() -> Vec<String> {
    vec!["disable syslog".to_string(), "disable clipaging".to_string()]
}

fn default_epilogue() -> Vec<String> {
    vec!["enable clipaging".to_string(), "enable syslog".to_string()]
}

/// Provisioning engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between readiness checks, in seconds
    #[serde(default = "default_poll_interval", with = "secs")]
    pub poll_interval: Duration,

    pub waits: WaitLimits,

    /// Consecutive transient check errors tolerated before a wait fails
    #[serde(default = "default_probe_error_budget")]
    pub probe_error_budget: u32,

    #[serde(default = "default_access_log_path")]
    pub access_log_path: String,

    #[serde(default)]
    pub markers: ArtifactMarkers,

    #[serde(default = "default_full_config_dir")]
    pub full_config_dir: String,

    /// Commands sent before a full-config batch
    #[serde(default = "default_preamble")]
    pub command_preamble: Vec<String>,

    /// Commands sent after a full-config batch
    #[serde(default = "default_epilogue")]
    pub command_epilogue: Vec<String>,

    /// Chat ids that receive progress messages
    #[serde(default)]
    pub recipients: Vec<String>,

    /// Management VLAN used when a start request names none
    #[serde(default)]
    pub management_vlan: Option<u16>,
}

impl EngineConfig {
    pub fn new(waits: WaitLimits) -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            waits,
            probe_error_budget: DEFAULT_PROBE_ERROR_BUDGET,
            access_log_path: default_access_log_path(),
            markers: ArtifactMarkers::default(),
            full_config_dir: default_full_config_dir(),
            command_preamble: default_preamble(),
            command_epilogue: default_epilogue(),
            recipients: Vec::new(),
            management_vlan: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_probe_error_budget(mut self, budget: u32) -> Self {
        self.probe_error_budget = budget;
        self
    }

    pub fn with_access_log_path(mut self, path: impl Into<String>) -> Self {
        self.access_log_path = path.into();
        self
    }

    pub fn with_markers(mut self, markers: ArtifactMarkers) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_full_config_dir(mut self, dir: impl Into<String>) -> Self {
        self.full_config_dir = dir.into();
        self
    }

    pub fn with_recipients(mut self, recipients: Vec<String>) -> Self {
        self.recipients = recipients;
        self
    }

    pub fn with_management_vlan(mut self, vlan: u16) -> Self {
        self.management_vlan = Some(vlan);
        self
    }

    /// Reject settings that would make the engine misbehave
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(WorkflowError::InvalidConfiguration(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.markers.firmware.is_empty() || self.markers.config.is_empty() {
            return Err(WorkflowError::InvalidConfiguration(
                "artifact markers must not be empty".to_string(),
            ));
        }
        if matches!(self.management_vlan, Some(vlan) if vlan == 0 || vlan > 4094) {
            return Err(WorkflowError::InvalidConfiguration(format!(
                "management_vlan {:?} is outside 1-4094",
                self.management_vlan
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new(WaitLimits::uniform(WaitLimit::Seconds(600)));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.access_log_path, "/tftp/test.log");
        assert_eq!(config.markers.firmware, "firmwares");
        assert_eq!(config.command_preamble, vec!["disable syslog", "disable clipaging"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_with_required_waits() {
        let yaml = r#"
waits:
  up: 600
  download: forever
  rebooted: 900
poll_interval: 2.5
recipients: ["-1001", "-1002"]
"#;
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.waits.up, WaitLimit::Seconds(600));
        assert_eq!(config.waits.download, WaitLimit::Forever);
        assert_eq!(config.poll_interval, Duration::from_millis(2500));
        assert_eq!(config.recipients.len(), 2);
        assert_eq!(config.probe_error_budget, DEFAULT_PROBE_ERROR_BUDGET);
    }

    #[test]
    fn test_waits_are_required() {
        let yaml = "poll_interval: 1\n";
        assert!(serde_yaml::from_str::<EngineConfig>(yaml).is_err());

        let yaml = "waits:\n  up: 10\n  download: 10\n";
        assert!(serde_yaml::from_str::<EngineConfig>(yaml).is_err());
    }

    #[test]
    fn test_wait_limit_keyword() {
        let bad = "waits:\n  up: never\n  download: 1\n  rebooted: 1\n";
        assert!(serde_yaml::from_str::<EngineConfig>(bad).is_err());

        assert_eq!(WaitLimit::Forever.as_duration(), None);
        assert_eq!(
            WaitLimit::Seconds(3).as_duration(),
            Some(Duration::from_secs(3))
        );
    }

    #[test]
    fn test_validate() {
        let base = EngineConfig::new(WaitLimits::uniform(WaitLimit::Forever));
        assert!(base
            .clone()
            .with_poll_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(base.clone().with_management_vlan(4095).validate().is_err());
        assert!(base.with_management_vlan(100).validate().is_ok());
    }
}
