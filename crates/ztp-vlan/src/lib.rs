//! VLAN membership for ZTP
//!
//! Two layers:
//!
//! - [`bitmap`]: the hex port-bitmap codec used by the device's VLAN tables
//! - [`mutator`]: fetch, edit and write back one port's membership of one
//!   VLAN through a [`ztp_gateway::DeviceGateway`]
//!
//! # Example
//!
//! ```no_run
//! use ztp_vlan::{modify_port_vlan, PortMode, VlanChange};
//! use ztp_gateway::MemoryGateway;
//! use std::net::Ipv4Addr;
//!
//! # async fn example() -> ztp_vlan::Result<()> {
//! let gateway = MemoryGateway::new();
//! let switch = Ipv4Addr::new(10, 0, 0, 1);
//! modify_port_vlan(&gateway, switch, 24, 100, VlanChange::Add(PortMode::Untagged)).await?;
//! # Ok(())
//! # }
//! ```

pub mod bitmap;
pub mod error;
pub mod membership;
pub mod mutator;

pub use bitmap::{decode, digit_width, encode, PortSet};
pub use error::{Result, VlanError};
pub use membership::{PortMode, PortVlans, VlanChange, VlanMembership};
pub use mutator::{modify_port_vlan, port_vlans, vlan_table};
