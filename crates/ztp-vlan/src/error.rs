//! Error types for VLAN membership operations

use std::net::Ipv4Addr;
use thiserror::Error;
use ztp_gateway::GatewayError;

/// Error type for VLAN membership operations
#[derive(Debug, Error)]
pub enum VlanError {
    /// Bitmap string contains something other than hex digits
    #[error("invalid bitmap {value:?}: {reason}")]
    InvalidBitmap { value: String, reason: String },

    /// Port cannot be placed in a bitmap of the requested width
    #[error("port {port} does not fit a {digits}-digit bitmap")]
    PortOutOfRange { port: u16, digits: usize },

    /// VLAN is not configured on the device
    #[error("VLAN {vlan} not found on {device}")]
    UnknownVlan { device: Ipv4Addr, vlan: u16 },

    /// Device gateway call failed
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Result type for VLAN membership operations
pub type Result<T> = std::result::Result<T, VlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VlanError::PortOutOfRange { port: 33, digits: 8 };
        assert_eq!(err.to_string(), "port 33 does not fit a 8-digit bitmap");

        let err = VlanError::UnknownVlan {
            device: Ipv4Addr::new(10, 0, 0, 1),
            vlan: 42,
        };
        assert_eq!(err.to_string(), "VLAN 42 not found on 10.0.0.1");
    }

    #[test]
    fn test_gateway_error_conversion() {
        let err: VlanError = GatewayError::Timeout("walk".into()).into();
        assert!(matches!(err, VlanError::Gateway(GatewayError::Timeout(_))));
    }
}
