//! Device gateway trait and shared types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::error::Result;

/// dot1qVlanStaticEgressPorts: every port that is a member of the VLAN
pub const OID_VLAN_ALL_PORTS: &str = "1.3.6.1.2.1.17.7.1.4.3.1.2";

/// dot1qVlanStaticUntaggedPorts: ports that carry the VLAN untagged
pub const OID_VLAN_UNTAGGED_PORTS: &str = "1.3.6.1.2.1.17.7.1.4.3.1.4";

/// ifAlias: operator-assigned port description
pub const OID_PORT_ALIAS: &str = "1.3.6.1.2.1.31.1.1.1.18";

/// Which of a VLAN's two port bitmaps an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitmapKind {
    /// All member ports, tagged and untagged
    AllPorts,
    /// Untagged member ports only
    UntaggedPorts,
}

impl BitmapKind {
    /// Table OID for this bitmap
    pub fn oid(&self) -> &'static str {
        match self {
            BitmapKind::AllPorts => OID_VLAN_ALL_PORTS,
            BitmapKind::UntaggedPorts => OID_VLAN_UNTAGGED_PORTS,
        }
    }

    /// Full OID of this bitmap for one VLAN
    pub fn vlan_oid(&self, vlan: u16) -> String {
        format!("{}.{}", self.oid(), vlan)
    }
}

/// One row of a VLAN port-bitmap table as reported by the device
///
/// `value` is kept exactly as the device reported it, including any `0x`
/// prefix, because its width tells the caller how wide writes must be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanBitmap {
    pub vlan: u16,
    pub value: String,
}

impl VlanBitmap {
    pub fn new(vlan: u16, value: impl Into<String>) -> Self {
        Self {
            vlan,
            value: value.into(),
        }
    }
}

/// Operations the provisioning workflow needs from the device API
///
/// All calls are keyed by device address. No call is transactional: a walk
/// followed by a set can race with another writer of the same VLAN.
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Read a port's description, if the device has one
    async fn get_port_description(&self, device: Ipv4Addr, port: u16) -> Result<Option<String>>;

    /// Walk the all-member-ports bitmap of every VLAN
    async fn walk_vlan_all_ports(&self, device: Ipv4Addr) -> Result<Vec<VlanBitmap>>;

    /// Walk the untagged-ports bitmap of every VLAN
    async fn walk_vlan_untagged_ports(&self, device: Ipv4Addr) -> Result<Vec<VlanBitmap>>;

    /// Overwrite one bitmap of one VLAN
    async fn set_vlan_bitmap(
        &self,
        device: Ipv4Addr,
        vlan: u16,
        kind: BitmapKind,
        value: &str,
    ) -> Result<()>;

    /// Single reachability probe
    async fn probe_reachability(&self, device: Ipv4Addr) -> Result<bool>;

    /// Run a list of CLI commands on the device, in order
    async fn send_command_batch(&self, device: Ipv4Addr, commands: &[String]) -> Result<()>;
}
