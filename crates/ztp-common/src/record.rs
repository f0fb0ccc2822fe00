//! Provisioning record model
//!
//! One record exists per switch being onboarded. The record API owns
//! creation and listing; this workspace only reads records and patches their
//! lifecycle fields.

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Lifecycle status of a provisioning record
///
/// WAITING → IN_PROGRESS → DONE. A cancelled run moves the record back to
/// WAITING so it can be started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Waiting,
    InProgress,
    Done,
}

impl RecordStatus {
    /// Wire representation used by the record API
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Waiting => "WAITING",
            RecordStatus::InProgress => "IN_PROGRESS",
            RecordStatus::Done => "DONE",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(RecordStatus::Waiting),
            "IN_PROGRESS" => Ok(RecordStatus::InProgress),
            "DONE" => Ok(RecordStatus::Done),
            other => Err(Error::UnknownStatus(other.to_string())),
        }
    }
}

/// A switch awaiting (or undergoing) zero-touch provisioning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningRecord {
    pub id: i64,
    pub status: RecordStatus,
    /// Address assigned to the new switch
    pub ip_address: Ipv4Addr,
    /// Switch the new device hangs off
    #[serde(default, rename = "parent_switch", alias = "upstream_switch")]
    pub upstream_switch: Option<Ipv4Addr>,
    /// Port on the upstream switch facing the new device
    #[serde(default, rename = "parent_port", alias = "upstream_port")]
    pub upstream_port: Option<u16>,
    #[serde(default)]
    pub autochange_vlans: bool,
    /// Handle of the run currently driving this record
    #[serde(default, rename = "celery_id", alias = "task_handle")]
    pub task_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    /// Not part of every API response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProvisioningRecord {
    /// Create a fresh WAITING record
    pub fn new(id: i64, ip_address: Ipv4Addr) -> Self {
        Self {
            id,
            status: RecordStatus::Waiting,
            ip_address,
            upstream_switch: None,
            upstream_port: None,
            autochange_vlans: false,
            task_handle: None,
            serial_number: None,
            mac_address: None,
            created_at: Some(Utc::now()),
            started_at: None,
            finished_at: None,
        }
    }

    /// Attach the upstream switch and port
    pub fn with_upstream(mut self, switch: Ipv4Addr, port: u16) -> Self {
        self.upstream_switch = Some(switch);
        self.upstream_port = Some(port);
        self
    }

    /// Enable automatic VLAN handling on the upstream port
    pub fn with_autochange_vlans(mut self, enabled: bool) -> Self {
        self.autochange_vlans = enabled;
        self
    }

    /// Upstream switch and port, when both are known
    pub fn upstream(&self) -> Option<(Ipv4Addr, u16)> {
        match (self.upstream_switch, self.upstream_port) {
            (Some(switch), Some(port)) => Some((switch, port)),
            _ => None,
        }
    }

    /// Check the record's structural invariants
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |reason: &str| Error::InvalidRecord {
            id: self.id,
            reason: reason.to_string(),
        };

        let running = self.status == RecordStatus::InProgress;
        if running != self.task_handle.is_some() {
            return Err(invalid(
                "task handle must be present exactly while IN_PROGRESS",
            ));
        }
        if self.finished_at.is_some() && self.status != RecordStatus::Done {
            return Err(invalid("finish time set on an unfinished record"));
        }
        if self.upstream_switch.is_some() != self.upstream_port.is_some() {
            return Err(invalid("upstream switch and port must be set together"));
        }
        Ok(())
    }

    /// Apply a patch in place
    pub fn apply(&mut self, patch: &RecordPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(handle) = &patch.task_handle {
            self.task_handle = handle.clone();
        }
        if let Some(started) = &patch.started_at {
            self.started_at = *started;
        }
        if let Some(finished) = &patch.finished_at {
            self.finished_at = *finished;
        }
    }
}

/// Partial update of a record's lifecycle fields
///
/// Each field is tri-state: `None` leaves it untouched, `Some(None)` clears it
/// and `Some(Some(v))` sets it. Serialized as a JSON merge patch using the
/// record API's field names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordStatus>,
    #[serde(rename = "celery_id", skip_serializing_if = "Option::is_none")]
    pub task_handle: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Option<DateTime<Utc>>>,
}

impl RecordPatch {
    /// Run launched: IN_PROGRESS with the run's handle attached
    pub fn started(handle: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(RecordStatus::InProgress),
            task_handle: Some(Some(handle.into())),
            started_at: Some(Some(at)),
            finished_at: None,
        }
    }

    /// Run completed: DONE, handle cleared, finish time stamped
    pub fn finished(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(RecordStatus::Done),
            task_handle: Some(None),
            started_at: None,
            finished_at: Some(Some(at)),
        }
    }

    /// Run cancelled: back to WAITING with the handle cleared
    pub fn cancelled() -> Self {
        Self {
            status: Some(RecordStatus::Waiting),
            task_handle: Some(None),
            started_at: Some(None),
            finished_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.task_handle.is_none()
            && self.started_at.is_none()
            && self.finished_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ProvisioningRecord {
        ProvisioningRecord::new(1, Ipv4Addr::new(10, 0, 0, 5))
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&RecordStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
        assert_eq!(
            "DONE".parse::<RecordStatus>().unwrap(),
            RecordStatus::Done
        );
        assert!("done".parse::<RecordStatus>().is_err());
    }

    #[test]
    fn test_new_record_is_valid() {
        let rec = record();
        assert_eq!(rec.status, RecordStatus::Waiting);
        assert!(rec.validate().is_ok());
        assert!(rec.upstream().is_none());
    }

    #[test]
    fn test_lifecycle_patches_keep_invariants() {
        let mut rec = record().with_upstream(Ipv4Addr::new(10, 0, 0, 1), 24);

        rec.apply(&RecordPatch::started("run-1", Utc::now()));
        assert_eq!(rec.status, RecordStatus::InProgress);
        assert_eq!(rec.task_handle.as_deref(), Some("run-1"));
        assert!(rec.validate().is_ok());

        rec.apply(&RecordPatch::finished(Utc::now()));
        assert_eq!(rec.status, RecordStatus::Done);
        assert!(rec.task_handle.is_none());
        assert!(rec.finished_at.is_some());
        assert!(rec.validate().is_ok());
    }

    #[test]
    fn test_cancel_patch_returns_to_waiting() {
        let mut rec = record();
        rec.apply(&RecordPatch::started("run-1", Utc::now()));
        rec.apply(&RecordPatch::cancelled());
        assert_eq!(rec.status, RecordStatus::Waiting);
        assert!(rec.task_handle.is_none());
        assert!(rec.started_at.is_none());
        assert!(rec.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_broken_records() {
        let mut rec = record();
        rec.status = RecordStatus::InProgress;
        assert!(rec.validate().is_err());

        let mut rec = record();
        rec.finished_at = Some(Utc::now());
        assert!(rec.validate().is_err());

        let mut rec = record();
        rec.upstream_port = Some(3);
        assert!(rec.validate().is_err());
    }

    #[test]
    fn test_patch_serializes_cleared_fields_as_null() {
        let json = serde_json::to_value(RecordPatch::cancelled()).unwrap();
        assert_eq!(json["status"], "WAITING");
        assert!(json["celery_id"].is_null());
        assert!(json.get("task_handle").is_none());
        assert!(json.get("finished_at").is_none());

        assert!(RecordPatch::default().is_empty());
        assert!(!RecordPatch::finished(Utc::now()).is_empty());
    }

    #[test]
    fn test_record_deserializes_with_missing_optionals() {
        let json = r#"{
            "id": 3,
            "status": "WAITING",
            "ip_address": "10.0.0.9",
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let rec: ProvisioningRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.id, 3);
        assert!(!rec.autochange_vlans);
        assert!(rec.task_handle.is_none());
        assert!(rec.created_at.is_some());
    }

    #[test]
    fn test_record_reads_record_api_entry() {
        let json = r#"{
            "id": 12,
            "status": "IN_PROGRESS",
            "celery_id": "5b1e0c1a-8f4e-4f0e-9d51-2f7f3f4c8a10",
            "employee_id": 4,
            "node_id": 81,
            "serial_number": "RZ1K1A7000123",
            "model_id": 2,
            "mac_address": "00:ad:24:11:22:33",
            "ip_address": "10.90.0.5",
            "task_id": null,
            "parent_switch": "10.90.0.1",
            "parent_port": 24,
            "autochange_vlans": true,
            "original_port_settings": null,
            "vlan_settings": null
        }"#;
        let rec: ProvisioningRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.status, RecordStatus::InProgress);
        assert_eq!(
            rec.task_handle.as_deref(),
            Some("5b1e0c1a-8f4e-4f0e-9d51-2f7f3f4c8a10")
        );
        assert_eq!(rec.upstream(), Some((Ipv4Addr::new(10, 90, 0, 1), 24)));
        assert!(rec.autochange_vlans);
        assert!(rec.created_at.is_none());
        assert!(rec.validate().is_ok());

        let back = serde_json::to_value(&rec).unwrap();
        assert_eq!(back["parent_switch"], "10.90.0.1");
        assert_eq!(back["celery_id"], "5b1e0c1a-8f4e-4f0e-9d51-2f7f3f4c8a10");
    }
}
