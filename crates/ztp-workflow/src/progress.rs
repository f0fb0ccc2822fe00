//! Progress checklist messages
//!
//! A run reports progress as a checklist: finished items get a done mark,
//! the current item a pending mark, later items are not shown yet. The first
//! render is sent to each recipient and every later render edits that
//! message in place.

use std::collections::HashMap;
use std::fmt::Write;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use ztp_notify::{MessageHandle, Notifier};

use crate::request::ProvisioningRequest;

const DONE: &str = "✅";
const PENDING: &str = "⏳";

/// Checklist items, in run order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Milestone {
    Started = 1,
    VlansDetached = 2,
    ManagementVlanAttached = 3,
    WaitingForDevice = 4,
    WaitingForDownload = 5,
    VlansRestored = 6,
    WaitingAfterReboot = 7,
    Finishing = 8,
}

impl Milestone {
    pub const ALL: [Milestone; 8] = [
        Milestone::Started,
        Milestone::VlansDetached,
        Milestone::ManagementVlanAttached,
        Milestone::WaitingForDevice,
        Milestone::WaitingForDownload,
        Milestone::VlansRestored,
        Milestone::WaitingAfterReboot,
        Milestone::Finishing,
    ];

    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// Items 2, 3 and 6 only exist when VLANs are changed automatically
    pub fn applies(&self, auto_vlans: bool) -> bool {
        auto_vlans
            || !matches!(
                self,
                Milestone::VlansDetached
                    | Milestone::ManagementVlanAttached
                    | Milestone::VlansRestored
            )
    }
}

/// What the checklist needs to know about a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressParams {
    pub device: Ipv4Addr,
    pub upstream: Option<(Ipv4Addr, u16)>,
    pub management_vlan: Option<u16>,
    pub auto_vlans: bool,
}

impl From<&ProvisioningRequest> for ProgressParams {
    fn from(request: &ProvisioningRequest) -> Self {
        Self {
            device: request.device,
            upstream: request.upstream(),
            management_vlan: request.management_vlan,
            auto_vlans: request.autochange_vlans,
        }
    }
}

fn label(milestone: Milestone, params: &ProgressParams) -> String {
    let vlan = params
        .management_vlan
        .map(|v| v.to_string())
        .unwrap_or_else(|| "?".to_string());
    match milestone {
        Milestone::Started => "Provisioning started".to_string(),
        Milestone::VlansDetached => "Untagged VLANs removed from upstream port".to_string(),
        Milestone::ManagementVlanAttached => format!("Management VLAN {vlan} set untagged"),
        Milestone::WaitingForDevice => "Waiting for the device to answer".to_string(),
        Milestone::WaitingForDownload => "Waiting for firmware and config download".to_string(),
        Milestone::VlansRestored => format!("Upstream VLANs restored, VLAN {vlan} tagged"),
        Milestone::WaitingAfterReboot => "Waiting for the device after reboot".to_string(),
        Milestone::Finishing => "Finishing".to_string(),
    }
}

fn header(params: &ProgressParams) -> String {
    match params.upstream {
        Some((switch, port)) => format!("ZTP {} (via {} port {})", params.device, switch, port),
        None => format!("ZTP {}", params.device),
    }
}

/// Checklist text with `current` pending
///
/// Pure: the same inputs always give the same text.
pub fn render(current: Milestone, params: &ProgressParams) -> String {
    let mut text = header(params);
    for milestone in Milestone::ALL
        .into_iter()
        .filter(|m| m.applies(params.auto_vlans))
        .take_while(|m| *m <= current)
    {
        let mark = if milestone == current { PENDING } else { DONE };
        let _ = write!(text, "\n{} {}", mark, label(milestone, params));
    }
    text
}

/// Checklist text with every item done
pub fn render_finished(params: &ProgressParams) -> String {
    let mut text = format!("{}: done", header(params));
    for milestone in Milestone::ALL
        .into_iter()
        .filter(|m| m.applies(params.auto_vlans))
    {
        let _ = write!(text, "\n{} {}", DONE, label(milestone, params));
    }
    text
}

/// Publishes one run's checklist to every recipient
///
/// Delivery failures are logged and never fail the run. Once the run is
/// cancelled nothing more is sent or edited.
pub struct ProgressReporter {
    notifier: Arc<dyn Notifier>,
    recipients: Vec<String>,
    params: ProgressParams,
    cancel: CancellationToken,
    messages: HashMap<String, MessageHandle>,
    last_text: Option<String>,
}

impl ProgressReporter {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        recipients: Vec<String>,
        params: ProgressParams,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            notifier,
            recipients,
            params,
            cancel,
            messages: HashMap::new(),
            last_text: None,
        }
    }

    /// Show `milestone` as the current item
    pub async fn publish(&mut self, milestone: Milestone) {
        let text = render(milestone, &self.params);
        self.deliver(text).await;
    }

    /// Show every item as done
    pub async fn finish(&mut self) {
        let text = render_finished(&self.params);
        self.deliver(text).await;
    }

    async fn deliver(&mut self, text: String) {
        if self.cancel.is_cancelled() {
            debug!(device = %self.params.device, "Run cancelled, progress not sent");
            return;
        }
        if self.last_text.as_deref() == Some(text.as_str()) {
            return;
        }

        for recipient in &self.recipients {
            if self.cancel.is_cancelled() {
                return;
            }
            match self.messages.get(recipient) {
                Some(handle) => {
                    if let Err(e) = self.notifier.edit_message(handle, &text).await {
                        warn!(recipient = %recipient, error = %e, "Failed to edit progress message");
                    }
                }
                None => match self.notifier.send_message(recipient, &text).await {
                    Ok(handle) => {
                        self.messages.insert(recipient.clone(), handle);
                    }
                    Err(e) => {
                        warn!(recipient = %recipient, error = %e, "Failed to send progress message");
                    }
                },
            }
        }
        self.last_text = Some(text);
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("recipients", &self.recipients)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
