//! VLAN membership sets and the edits applied to them

use serde::{Deserialize, Serialize};

use crate::bitmap::{self, PortSet};
use crate::error::Result;

/// How a port carries a VLAN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortMode {
    /// Frames carry an 802.1Q tag (trunk)
    Tagged,
    /// Frames are sent without a tag (access)
    Untagged,
}

/// Edit applied to one port's membership of one VLAN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VlanChange {
    /// Remove the port from the VLAN entirely
    Delete,
    /// Make the port a member in the given mode
    Add(PortMode),
}

/// Tagged and untagged member ports of one VLAN on one device
///
/// After [`VlanMembership::apply`] a port is never in both sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VlanMembership {
    pub tagged: PortSet,
    pub untagged: PortSet,
}

impl VlanMembership {
    /// Build from the device's two bitmaps; tagged = all - untagged
    pub fn from_bitmaps(all_ports: &str, untagged_ports: &str) -> Result<Self> {
        let all = bitmap::decode(all_ports)?;
        let untagged = bitmap::decode(untagged_ports)?;
        let tagged = all.difference(&untagged).copied().collect();
        Ok(Self { tagged, untagged })
    }

    /// Every member port regardless of mode
    pub fn all(&self) -> PortSet {
        self.tagged.union(&self.untagged).copied().collect()
    }

    pub fn mode_of(&self, port: u16) -> Option<PortMode> {
        if self.untagged.contains(&port) {
            Some(PortMode::Untagged)
        } else if self.tagged.contains(&port) {
            Some(PortMode::Tagged)
        } else {
            None
        }
    }

    /// Apply an edit in place
    pub fn apply(&mut self, port: u16, change: VlanChange) {
        match change {
            VlanChange::Delete => {
                self.tagged.remove(&port);
                self.untagged.remove(&port);
            }
            VlanChange::Add(PortMode::Tagged) => {
                self.untagged.remove(&port);
                self.tagged.insert(port);
            }
            VlanChange::Add(PortMode::Untagged) => {
                self.tagged.remove(&port);
                self.untagged.insert(port);
            }
        }
    }

    /// Encode as (all members, untagged) bitmaps of `digits` hex digits
    pub fn to_bitmaps(&self, digits: usize) -> Result<(String, String)> {
        Ok((
            bitmap::encode(&self.all(), digits)?,
            bitmap::encode(&self.untagged, digits)?,
        ))
    }
}

/// VLANs a single port belongs to, by mode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortVlans {
    pub tagged: Vec<u16>,
    pub untagged: Vec<u16>,
}
