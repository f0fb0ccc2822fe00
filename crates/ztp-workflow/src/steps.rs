//! Ordered steps of a provisioning run

use serde::Serialize;
use std::fmt;

use crate::request::ProvisioningRequest;

/// One step of a provisioning run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    /// Announce the run
    Start,
    /// Detach the upstream port's untagged VLANs, attach the management VLAN
    AutoVlanPrep,
    /// Wait for the device to answer probes
    WaitUp,
    /// Wait for firmware and config downloads followed by a reboot
    WaitDownloadComplete,
    /// Tag the management VLAN and re-attach the detached VLANs
    AutoVlanRestore,
    /// Wait for the device to come back after reboot
    WaitRebooted,
    /// Send the full-config command batch
    PushConfig,
    /// Mark the record done
    Done,
}

impl WorkflowStep {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowStep::Start => "start",
            WorkflowStep::AutoVlanPrep => "auto_vlan_prep",
            WorkflowStep::WaitUp => "wait_up",
            WorkflowStep::WaitDownloadComplete => "wait_download_complete",
            WorkflowStep::AutoVlanRestore => "auto_vlan_restore",
            WorkflowStep::WaitRebooted => "wait_rebooted",
            WorkflowStep::PushConfig => "push_config",
            WorkflowStep::Done => "done",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Steps `request` will run, in order
pub fn plan(request: &ProvisioningRequest) -> Vec<WorkflowStep> {
    let mut steps = vec![WorkflowStep::Start];
    if request.autochange_vlans {
        steps.push(WorkflowStep::AutoVlanPrep);
    }
    steps.push(WorkflowStep::WaitUp);
    steps.push(WorkflowStep::WaitDownloadComplete);
    if request.autochange_vlans {
        steps.push(WorkflowStep::AutoVlanRestore);
    }
    steps.push(WorkflowStep::WaitRebooted);
    if request.push_full_config {
        steps.push(WorkflowStep::PushConfig);
    }
    steps.push(WorkflowStep::Done);
    steps
}
