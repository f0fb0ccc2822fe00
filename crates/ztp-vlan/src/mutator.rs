//! Read-modify-write of VLAN membership through the device gateway
//!
//! Every call walks the device's tables afresh; nothing is cached between
//! calls. The walk and the two writes are not atomic, so two writers editing
//! the same VLAN on the same device can lose each other's update.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use tracing::{debug, info};
use ztp_gateway::{BitmapKind, DeviceGateway, VlanBitmap};

use crate::bitmap;
use crate::error::{Result, VlanError};
use crate::membership::{PortMode, PortVlans, VlanChange, VlanMembership};

/// VLAN whose bitmap width is taken as the device's native width
const WIDTH_REFERENCE_VLAN: u16 = 1;

struct RawTables {
    all_ports: BTreeMap<u16, String>,
    untagged_ports: BTreeMap<u16, String>,
}

impl RawTables {
    async fn fetch(gateway: &dyn DeviceGateway, device: Ipv4Addr) -> Result<Self> {
        let index = |rows: Vec<VlanBitmap>| {
            rows.into_iter()
                .map(|row| (row.vlan, row.value))
                .collect::<BTreeMap<_, _>>()
        };
        let all_ports = index(gateway.walk_vlan_all_ports(device).await?);
        let untagged_ports = index(gateway.walk_vlan_untagged_ports(device).await?);
        Ok(Self {
            all_ports,
            untagged_ports,
        })
    }

    fn membership(&self, vlan: u16) -> Option<Result<VlanMembership>> {
        let all = self.all_ports.get(&vlan)?;
        let untagged = self
            .untagged_ports
            .get(&vlan)
            .map(String::as_str)
            .unwrap_or("");
        Some(VlanMembership::from_bitmaps(all, untagged))
    }

    fn width_for(&self, vlan: u16) -> Option<usize> {
        self.all_ports
            .get(&WIDTH_REFERENCE_VLAN)
            .or_else(|| self.all_ports.get(&vlan))
            .map(|value| bitmap::digit_width(value))
    }
}

/// Membership of every VLAN configured on `device`
pub async fn vlan_table(
    gateway: &dyn DeviceGateway,
    device: Ipv4Addr,
) -> Result<BTreeMap<u16, VlanMembership>> {
    let tables = RawTables::fetch(gateway, device).await?;
    tables
        .all_ports
        .keys()
        .filter_map(|vlan| tables.membership(*vlan).map(|m| m.map(|m| (*vlan, m))))
        .collect()
}

/// VLANs `port` belongs to on `device`, ascending
pub async fn port_vlans(
    gateway: &dyn DeviceGateway,
    device: Ipv4Addr,
    port: u16,
) -> Result<PortVlans> {
    let mut vlans = PortVlans::default();
    for (vlan, membership) in vlan_table(gateway, device).await? {
        match membership.mode_of(port) {
            Some(PortMode::Tagged) => vlans.tagged.push(vlan),
            Some(PortMode::Untagged) => vlans.untagged.push(vlan),
            None => {}
        }
    }
    Ok(vlans)
}

/// Change one port's membership of one VLAN and write it back
///
/// Writes the all-members bitmap first, then the untagged bitmap, both at the
/// width the device uses for VLAN 1. Returns the membership as written.
/// Gateway failures propagate without retry.
pub async fn modify_port_vlan(
    gateway: &dyn DeviceGateway,
    device: Ipv4Addr,
    port: u16,
    vlan: u16,
    change: VlanChange,
) -> Result<VlanMembership> {
    let tables = RawTables::fetch(gateway, device).await?;
    let mut membership = tables
        .membership(vlan)
        .ok_or(VlanError::UnknownVlan { device, vlan })??;
    let digits = tables
        .width_for(vlan)
        .ok_or(VlanError::UnknownVlan { device, vlan })?;

    membership.apply(port, change);
    let (all_ports, untagged_ports) = membership.to_bitmaps(digits)?;
    debug!(
        device = %device,
        vlan,
        port,
        all = %all_ports,
        untagged = %untagged_ports,
        "Writing VLAN bitmaps"
    );

    gateway
        .set_vlan_bitmap(device, vlan, BitmapKind::AllPorts, &all_ports)
        .await?;
    gateway
        .set_vlan_bitmap(device, vlan, BitmapKind::UntaggedPorts, &untagged_ports)
        .await?;

    info!(device = %device, vlan, port, change = ?change, "VLAN membership updated");
    Ok(membership)
}
