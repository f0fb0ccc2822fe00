//! Provisioning engine
//!
//! This module provides the ProvisioningEngine that drives one device
//! through the step list built from its request.

use chrono::Utc;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use ztp_common::RecordStatus;
use ztp_gateway::DeviceGateway;
use ztp_notify::Notifier;
use ztp_transfer::TransferServer;
use ztp_vlan::{modify_port_vlan, port_vlans, PortMode, VlanChange};

use crate::config::EngineConfig;
use crate::error::{Result, WorkflowError};
use crate::poller::ReadinessPoller;
use crate::progress::{Milestone, ProgressParams, ProgressReporter};
use crate::push::push_full_config;
use crate::request::{ProvisioningRequest, RunHandle};
use crate::steps::{plan, WorkflowStep};
use crate::store::RecordStore;
use ztp_common::RecordPatch;

/// Event emitted during a run
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Run started
    Started { run: RunHandle, device: Ipv4Addr },
    /// Step started
    StepStarted { run: RunHandle, step: WorkflowStep },
    /// Step completed
    StepCompleted { run: RunHandle, step: WorkflowStep },
    /// Run completed and the record is DONE
    Completed { run: RunHandle },
    /// Run aborted by an error
    Failed { run: RunHandle, error: String },
    /// Run stopped by cancellation
    Cancelled { run: RunHandle },
}

/// State carried between the steps of one run
struct RunState {
    run: RunHandle,
    device: Ipv4Addr,
    /// Untagged VLANs detached from the upstream port, to be restored
    detached_vlans: Vec<u16>,
    progress: ProgressReporter,
}

/// Provisioning engine
///
/// Runs one request at a time per call to [`run`](Self::run):
/// 1. Build the ordered step list from the request
/// 2. Execute each step in sequence, checking cancellation between steps
/// 3. Publish checklist progress to the configured recipients
/// 4. Mark the device's record DONE at the end
pub struct ProvisioningEngine {
    gateway: Arc<dyn DeviceGateway>,
    transfer: Arc<dyn TransferServer>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn RecordStore>,
    poller: ReadinessPoller,
    config: EngineConfig,
    event_sender: broadcast::Sender<RunEvent>,
}

impl ProvisioningEngine {
    /// Create an engine over the given collaborators
    pub fn new(
        gateway: Arc<dyn DeviceGateway>,
        transfer: Arc<dyn TransferServer>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn RecordStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let poller = ReadinessPoller::new(gateway.clone(), transfer.clone(), &config);
        let (event_sender, _) = broadcast::channel(1024);
        Ok(Self {
            gateway,
            transfer,
            notifier,
            store,
            poller,
            config,
            event_sender,
        })
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.event_sender.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    fn emit(&self, event: RunEvent) {
        // no subscribers is fine
        let _ = self.event_sender.send(event);
    }

    /// Drive `request` to completion
    ///
    /// The request is validated before any side effect. Returns
    /// [`WorkflowError::Cancelled`] when `cancel` fires; nothing is rolled
    /// back in that case.
    pub async fn run(
        &self,
        run: RunHandle,
        request: &ProvisioningRequest,
        cancel: CancellationToken,
    ) -> Result<()> {
        request.validate()?;

        let steps = plan(request);
        info!(run = %run, device = %request.device, steps = steps.len(), "Starting provisioning run");
        self.emit(RunEvent::Started {
            run,
            device: request.device,
        });

        let mut state = RunState {
            run,
            device: request.device,
            detached_vlans: Vec::new(),
            progress: ProgressReporter::new(
                self.notifier.clone(),
                self.config.recipients.clone(),
                ProgressParams::from(request),
                cancel.clone(),
            ),
        };

        let result = self.run_steps(&steps, request, &mut state, &cancel).await;
        match &result {
            Ok(()) => {
                info!(run = %run, device = %request.device, "Provisioning run completed");
                self.emit(RunEvent::Completed { run });
            }
            Err(WorkflowError::Cancelled) => {
                info!(run = %run, device = %request.device, "Provisioning run cancelled");
                self.emit(RunEvent::Cancelled { run });
            }
            Err(e) => {
                error!(run = %run, device = %request.device, error = %e, "Provisioning run failed");
                self.emit(RunEvent::Failed {
                    run,
                    error: e.to_string(),
                });
            }
        }
        result
    }

    async fn run_steps(
        &self,
        steps: &[WorkflowStep],
        request: &ProvisioningRequest,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for step in steps {
            if cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }
            debug!(run = %state.run, device = %state.device, step = %step, "Step started");
            self.emit(RunEvent::StepStarted {
                run: state.run,
                step: *step,
            });

            self.run_step(*step, request, state, cancel).await?;

            debug!(run = %state.run, device = %state.device, step = %step, "Step completed");
            self.emit(RunEvent::StepCompleted {
                run: state.run,
                step: *step,
            });
        }
        Ok(())
    }

    async fn run_step(
        &self,
        step: WorkflowStep,
        request: &ProvisioningRequest,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let device = state.device;
        let waits = &self.config.waits;

        match step {
            WorkflowStep::Start => {
                state.progress.publish(Milestone::Started).await;
            }
            WorkflowStep::AutoVlanPrep => {
                let (switch, port, mgmt) = auto_vlan_target(request)?;
                self.detach_upstream_vlans(state, switch, port, mgmt, cancel)
                    .await?;
            }
            WorkflowStep::WaitUp => {
                state.progress.publish(Milestone::WaitingForDevice).await;
                self.poller
                    .wait_until_reachable(device, waits.up, cancel)
                    .await?;
                state.progress.publish(Milestone::WaitingForDownload).await;
            }
            WorkflowStep::WaitDownloadComplete => {
                self.poller
                    .wait_until_download_complete(device, waits.download, cancel)
                    .await?;
            }
            WorkflowStep::AutoVlanRestore => {
                let (switch, port, mgmt) = auto_vlan_target(request)?;
                self.restore_upstream_vlans(state, switch, port, mgmt, cancel)
                    .await?;
            }
            WorkflowStep::WaitRebooted => {
                state.progress.publish(Milestone::WaitingAfterReboot).await;
                self.poller
                    .wait_until_reachable(device, waits.rebooted, cancel)
                    .await?;
                state.progress.publish(Milestone::Finishing).await;
            }
            WorkflowStep::PushConfig => {
                push_full_config(
                    self.gateway.as_ref(),
                    self.transfer.as_ref(),
                    &self.config,
                    device,
                    request,
                )
                .await?;
            }
            WorkflowStep::Done => {
                self.mark_done(state).await?;
            }
        }
        Ok(())
    }

    /// Take the upstream port off its untagged VLANs and onto the management VLAN
    async fn detach_upstream_vlans(
        &self,
        state: &mut RunState,
        switch: Ipv4Addr,
        port: u16,
        mgmt: u16,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let gateway = self.gateway.as_ref();

        match gateway.get_port_description(switch, port).await {
            Ok(Some(description)) => {
                info!(switch = %switch, port, description = %description, "Upstream port")
            }
            Ok(None) => {}
            Err(e) => warn!(switch = %switch, port, error = %e, "Could not read port description"),
        }

        let vlans = port_vlans(gateway, switch, port).await?;
        state.detached_vlans = vlans.untagged.into_iter().filter(|v| *v != mgmt).collect();
        info!(
            switch = %switch,
            port,
            vlans = ?state.detached_vlans,
            "Detaching untagged VLANs from upstream port"
        );

        for vlan in &state.detached_vlans {
            check_cancelled(cancel)?;
            modify_port_vlan(gateway, switch, port, *vlan, VlanChange::Delete).await?;
        }
        state.progress.publish(Milestone::VlansDetached).await;

        check_cancelled(cancel)?;
        modify_port_vlan(gateway, switch, port, mgmt, VlanChange::Add(PortMode::Untagged)).await?;
        state.progress.publish(Milestone::ManagementVlanAttached).await;
        Ok(())
    }

    /// Tag the management VLAN on the upstream port and re-attach detached VLANs
    async fn restore_upstream_vlans(
        &self,
        state: &mut RunState,
        switch: Ipv4Addr,
        port: u16,
        mgmt: u16,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let gateway = self.gateway.as_ref();

        modify_port_vlan(gateway, switch, port, mgmt, VlanChange::Delete).await?;
        check_cancelled(cancel)?;
        modify_port_vlan(gateway, switch, port, mgmt, VlanChange::Add(PortMode::Tagged)).await?;

        for vlan in &state.detached_vlans {
            check_cancelled(cancel)?;
            modify_port_vlan(gateway, switch, port, *vlan, VlanChange::Add(PortMode::Untagged))
                .await?;
        }
        info!(switch = %switch, port, vlans = ?state.detached_vlans, "Upstream VLANs restored");
        state.progress.publish(Milestone::VlansRestored).await;
        Ok(())
    }

    /// Patch the device's IN_PROGRESS record to DONE
    async fn mark_done(&self, state: &mut RunState) -> Result<()> {
        let record = self
            .store
            .find_by_status(RecordStatus::InProgress)
            .await?
            .into_iter()
            .find(|record| record.ip_address == state.device)
            .ok_or(WorkflowError::RecordNotFound {
                device: state.device,
                status: RecordStatus::InProgress,
            })?;

        self.store
            .patch(record.id, &RecordPatch::finished(Utc::now()))
            .await?;
        info!(run = %state.run, device = %state.device, record = record.id, "Record marked done");
        state.progress.finish().await;
        Ok(())
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(WorkflowError::Cancelled)
    } else {
        Ok(())
    }
}

/// Upstream switch, port and management VLAN of an auto-VLAN request
fn auto_vlan_target(request: &ProvisioningRequest) -> Result<(Ipv4Addr, u16, u16)> {
    match (request.upstream(), request.management_vlan) {
        (Some((switch, port)), Some(mgmt)) => Ok((switch, port, mgmt)),
        _ => Err(WorkflowError::InvalidRequest(
            "automatic VLAN change needs an upstream switch, port and management VLAN".to_string(),
        )),
    }
}

impl std::fmt::Debug for ProvisioningEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
