//! Device API client
//!
//! The device API wraps SNMP, ICMP and CLI access behind plain HTTP:
//!
//! - `GET /snmp/v2/walk?ip=..&oid=..` → `{"response": [{"oid": .., "value": ..}]}`
//! - `GET /snmp/v2/set?ip=..&oid=..&value=..`
//! - `GET /ping/check?ip=..` → `{"response": {"available": bool}}`
//! - `POST /cli/batch` with `{"ip": .., "commands": [..]}`
//!
//! Any response may carry an `error` string instead of `response`, which
//! means the device itself refused the request.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::gateway::{
    BitmapKind, DeviceGateway, VlanBitmap, OID_PORT_ALIAS, OID_VLAN_ALL_PORTS,
    OID_VLAN_UNTAGGED_PORTS,
};

/// Device API connection settings
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// Base URL of the device API, without trailing slash
    pub base_url: String,

    /// Per-request timeout
    pub request_timeout: Duration,
}

impl HttpGatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Set the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnmpEntry {
    oid: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PingStatus {
    available: bool,
}

#[derive(Debug, Serialize)]
struct CommandBatch<'a> {
    ip: String,
    commands: &'a [String],
}

/// [`DeviceGateway`] backed by the device API
pub struct HttpDeviceGateway {
    client: Client,
    config: HttpGatewayConfig,
}

impl HttpDeviceGateway {
    /// Create a client for the given device API
    pub fn new(config: HttpGatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::ConnectionFailed(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Base URL of the device API
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn walk(&self, device: Ipv4Addr, oid: &str) -> Result<Vec<SnmpEntry>> {
        debug!(device = %device, oid, "SNMP walk");
        let response = self
            .client
            .get(self.url("/snmp/v2/walk"))
            .query(&[("ip", device.to_string()), ("oid", oid.to_string())])
            .send()
            .await?;
        let entries: Option<Vec<SnmpEntry>> = unwrap_envelope(device, response).await?;
        Ok(entries.unwrap_or_default())
    }

    async fn walk_bitmaps(&self, device: Ipv4Addr, table_oid: &str) -> Result<Vec<VlanBitmap>> {
        self.walk(device, table_oid)
            .await?
            .into_iter()
            .map(|entry| {
                let vlan = vlan_from_oid(&entry.oid).ok_or_else(|| {
                    GatewayError::InvalidResponse(format!(
                        "cannot read VLAN id from OID {}",
                        entry.oid
                    ))
                })?;
                Ok(VlanBitmap::new(vlan, entry.value))
            })
            .collect()
    }
}

/// Check the HTTP status and unwrap the `{response, error}` envelope
async fn unwrap_envelope<T: DeserializeOwned>(
    device: Ipv4Addr,
    response: Response,
) -> Result<Option<T>> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::Http {
            status: status.as_u16(),
            body,
        });
    }

    let envelope: Envelope<T> = response.json().await?;
    if let Some(reason) = envelope.error {
        return Err(GatewayError::Rejected { device, reason });
    }
    Ok(envelope.response)
}

/// VLAN id is the last arc of a bitmap table row OID
fn vlan_from_oid(oid: &str) -> Option<u16> {
    oid.trim_start_matches('.')
        .rsplit('.')
        .next()
        .and_then(|last| last.parse().ok())
}

#[async_trait]
impl DeviceGateway for HttpDeviceGateway {
    async fn get_port_description(&self, device: Ipv4Addr, port: u16) -> Result<Option<String>> {
        let oid = format!("{}.{}", OID_PORT_ALIAS, port);
        let entries = self.walk(device, &oid).await?;
        Ok(entries
            .into_iter()
            .next()
            .map(|entry| entry.value)
            .filter(|value| !value.is_empty()))
    }

    async fn walk_vlan_all_ports(&self, device: Ipv4Addr) -> Result<Vec<VlanBitmap>> {
        self.walk_bitmaps(device, OID_VLAN_ALL_PORTS).await
    }

    async fn walk_vlan_untagged_ports(&self, device: Ipv4Addr) -> Result<Vec<VlanBitmap>> {
        self.walk_bitmaps(device, OID_VLAN_UNTAGGED_PORTS).await
    }

    async fn set_vlan_bitmap(
        &self,
        device: Ipv4Addr,
        vlan: u16,
        kind: BitmapKind,
        value: &str,
    ) -> Result<()> {
        let oid = kind.vlan_oid(vlan);
        debug!(device = %device, vlan, oid = %oid, value, "SNMP set");
        let response = self
            .client
            .get(self.url("/snmp/v2/set"))
            .query(&[
                ("ip", device.to_string()),
                ("oid", oid),
                ("value", value.to_string()),
            ])
            .send()
            .await?;
        unwrap_envelope::<serde_json::Value>(device, response).await?;
        Ok(())
    }

    async fn probe_reachability(&self, device: Ipv4Addr) -> Result<bool> {
        let response = self
            .client
            .get(self.url("/ping/check"))
            .query(&[("ip", device.to_string())])
            .send()
            .await?;
        let status: Option<PingStatus> = unwrap_envelope(device, response).await?;
        status.map(|s| s.available).ok_or_else(|| {
            GatewayError::InvalidResponse("ping check returned no status".to_string())
        })
    }

    async fn send_command_batch(&self, device: Ipv4Addr, commands: &[String]) -> Result<()> {
        debug!(device = %device, count = commands.len(), "Sending CLI batch");
        let response = self
            .client
            .post(self.url("/cli/batch"))
            .json(&CommandBatch {
                ip: device.to_string(),
                commands,
            })
            .send()
            .await?;
        unwrap_envelope::<serde_json::Value>(device, response).await?;
        Ok(())
    }
}

impl std::fmt::Debug for HttpDeviceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDeviceGateway")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_trims_trailing_slash() {
        let config = HttpGatewayConfig::new("http://device-api:8000/");
        assert_eq!(config.base_url, "http://device-api:8000");
        assert_eq!(config.request_timeout, Duration::from_secs(30));

        let config = config.with_request_timeout(Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_vlan_from_oid() {
        assert_eq!(vlan_from_oid("1.3.6.1.2.1.17.7.1.4.3.1.2.100"), Some(100));
        assert_eq!(vlan_from_oid(".1.3.6.1.2.1.17.7.1.4.3.1.4.1"), Some(1));
        assert_eq!(vlan_from_oid("iso.3.6.1.x"), None);
    }

    #[test]
    fn test_envelope_shapes() {
        let walk: Envelope<Vec<SnmpEntry>> = serde_json::from_str(
            r#"{"response": [{"oid": "1.3.6.1.2.1.17.7.1.4.3.1.2.1", "value": "0xff00"}]}"#,
        )
        .unwrap();
        let entries = walk.response.unwrap();
        assert_eq!(entries[0].value, "0xff00");

        let ping: Envelope<PingStatus> =
            serde_json::from_str(r#"{"response": {"available": true}}"#).unwrap();
        assert!(ping.response.unwrap().available);

        let refused: Envelope<serde_json::Value> =
            serde_json::from_str(r#"{"response": null, "error": "timeout"}"#).unwrap();
        assert_eq!(refused.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_gateway_url() {
        let gateway =
            HttpDeviceGateway::new(HttpGatewayConfig::new("http://device-api:8000")).unwrap();
        assert_eq!(gateway.url("/ping/check"), "http://device-api:8000/ping/check");
        assert_eq!(gateway.base_url(), "http://device-api:8000");
    }
}
