//! Run inputs and run handles

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use uuid::Uuid;
use ztp_common::ProvisioningRecord;

use crate::error::{Result, WorkflowError};

/// Everything one provisioning run needs to know
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    /// Address of the switch being provisioned
    pub device: Ipv4Addr,
    pub autochange_vlans: bool,
    pub upstream_switch: Option<Ipv4Addr>,
    pub upstream_port: Option<u16>,
    /// VLAN the upstream port carries untagged while the device boots
    pub management_vlan: Option<u16>,
    pub push_full_config: bool,
    #[serde(default)]
    pub full_config_commands: Vec<String>,
    /// Command file in the transfer server's full-config directory
    #[serde(default)]
    pub full_config_filename: Option<String>,
}

impl ProvisioningRequest {
    pub fn new(device: Ipv4Addr) -> Self {
        Self {
            device,
            autochange_vlans: false,
            upstream_switch: None,
            upstream_port: None,
            management_vlan: None,
            push_full_config: false,
            full_config_commands: Vec::new(),
            full_config_filename: None,
        }
    }

    /// Build a request for a stored record
    pub fn from_record(record: &ProvisioningRecord, options: &StartOptions) -> Self {
        Self {
            device: record.ip_address,
            autochange_vlans: record.autochange_vlans,
            upstream_switch: record.upstream_switch,
            upstream_port: record.upstream_port,
            management_vlan: options.management_vlan,
            push_full_config: options.push_full_config,
            full_config_commands: options.full_config_commands.clone(),
            full_config_filename: options.full_config_filename.clone(),
        }
    }

    /// Move the upstream port to `management_vlan` while the device boots
    pub fn with_auto_vlans(mut self, switch: Ipv4Addr, port: u16, management_vlan: u16) -> Self {
        self.autochange_vlans = true;
        self.upstream_switch = Some(switch);
        self.upstream_port = Some(port);
        self.management_vlan = Some(management_vlan);
        self
    }

    /// Push a command file and/or extra commands once the device is back
    pub fn with_full_config(mut self, filename: Option<String>, commands: Vec<String>) -> Self {
        self.push_full_config = true;
        self.full_config_filename = filename;
        self.full_config_commands = commands;
        self
    }

    /// Upstream switch and port, when both are known
    pub fn upstream(&self) -> Option<(Ipv4Addr, u16)> {
        self.upstream_switch.zip(self.upstream_port)
    }

    /// Reject requests that cannot run, before any side effect
    pub fn validate(&self) -> Result<()> {
        if self.upstream_switch.is_some() != self.upstream_port.is_some() {
            return Err(WorkflowError::InvalidRequest(
                "upstream switch and port must be given together".to_string(),
            ));
        }
        if self.autochange_vlans {
            if self.upstream().is_none() {
                return Err(WorkflowError::InvalidRequest(
                    "automatic VLAN change needs an upstream switch and port".to_string(),
                ));
            }
            match self.management_vlan {
                None => {
                    return Err(WorkflowError::InvalidRequest(
                        "automatic VLAN change needs a management VLAN".to_string(),
                    ))
                }
                Some(vlan) if vlan == 0 || vlan > 4094 => {
                    return Err(WorkflowError::InvalidRequest(format!(
                        "management VLAN {vlan} is outside 1-4094"
                    )))
                }
                Some(_) => {}
            }
            if self.upstream_port == Some(0) {
                return Err(WorkflowError::InvalidRequest(
                    "upstream port numbers start at 1".to_string(),
                ));
            }
        }
        if let Some(name) = &self.full_config_filename {
            if name.is_empty() || name.contains("..") || name.contains('/') {
                return Err(WorkflowError::InvalidRequest(format!(
                    "invalid full config file name {name:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Operator choices made when starting a stored record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOptions {
    /// Falls back to the engine's configured management VLAN
    pub management_vlan: Option<u16>,
    pub push_full_config: bool,
    pub full_config_commands: Vec<String>,
    pub full_config_filename: Option<String>,
}

/// Identifies one dispatched run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunHandle(Uuid);

impl RunHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunHandle {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(RunHandle)
            .map_err(|_| WorkflowError::UnknownRun(s.to_string()))
    }
}
