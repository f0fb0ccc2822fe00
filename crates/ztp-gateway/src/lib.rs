//! ZTP device gateway
//!
//! Switches are never spoken to directly. Every SNMP walk, SNMP set, ping and
//! CLI batch goes through the device API, an HTTP service keyed by device
//! address. This crate defines the [`DeviceGateway`] seam and ships two
//! implementations:
//!
//! - [`HttpDeviceGateway`]: talks to the device API over HTTP/JSON
//! - [`MemoryGateway`]: in-memory switches with scripted reachability, for
//!   tests and dry runs
//!
//! # Example
//!
//! ```no_run
//! use ztp_gateway::{DeviceGateway, HttpDeviceGateway, HttpGatewayConfig};
//! use std::net::Ipv4Addr;
//!
//! # async fn example() -> ztp_gateway::Result<()> {
//! let gateway = HttpDeviceGateway::new(HttpGatewayConfig::new("http://device-api:8000"))?;
//! let up = gateway.probe_reachability(Ipv4Addr::new(10, 0, 0, 5)).await?;
//! println!("reachable: {up}");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod gateway;
pub mod http;
pub mod memory;

pub use error::{GatewayError, Result};
pub use gateway::{BitmapKind, DeviceGateway, VlanBitmap, OID_PORT_ALIAS};
pub use http::{HttpDeviceGateway, HttpGatewayConfig};
pub use memory::{GatewayCall, MemoryGateway, Reachability};
