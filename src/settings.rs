//! Settings file
//!
//! One YAML file describes every collaborator and the engine. Secrets and
//! endpoints can be overridden from the environment:
//!
//! | Variable              | Overrides              |
//! |-----------------------|------------------------|
//! | `ZTP_DEVICE_API_URL`  | `device_api.url`       |
//! | `ZTP_RECORD_API_URL`  | `record_api.url`       |
//! | `ZTP_FTP_PASSWORD`    | `ftp.password`         |
//! | `ZTP_TELEGRAM_TOKEN`  | `telegram.token`       |

use color_eyre::eyre::{bail, Result, WrapErr};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use ztp_gateway::{HttpDeviceGateway, HttpGatewayConfig};
use ztp_notify::{MemoryNotifier, Notifier, TelegramConfig, TelegramNotifier};
use ztp_transfer::{FtpConfig, FtpTransferServer, DEFAULT_FTP_PORT};
use ztp_workflow::{ApiRecordStore, ApiStoreConfig, EngineConfig, ProvisioningEngine};

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceApiSettings {
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordApiSettings {
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub page_size: Option<usize>,
}

#[derive(Clone, Deserialize)]
pub struct FtpSettings {
    pub host: String,
    #[serde(default = "default_ftp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Clone, Deserialize)]
pub struct TelegramSettings {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub api_url: Option<String>,
}

/// Contents of the settings file
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub device_api: DeviceApiSettings,
    pub record_api: RecordApiSettings,
    pub ftp: FtpSettings,
    #[serde(default)]
    pub telegram: Option<TelegramSettings>,
    pub engine: EngineConfig,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_ftp_port() -> u16 {
    DEFAULT_FTP_PORT
}

impl Settings {
    /// Read, parse and validate the settings file, then apply the environment
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read settings file {}", path.display()))?;
        let mut settings = Self::from_yaml(&text)
            .wrap_err_with(|| format!("invalid settings file {}", path.display()))?;
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Override endpoints and secrets from `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("ZTP_DEVICE_API_URL") {
            self.device_api.url = url;
        }
        if let Some(url) = lookup("ZTP_RECORD_API_URL") {
            self.record_api.url = url;
        }
        if let Some(password) = lookup("ZTP_FTP_PASSWORD") {
            self.ftp.password = Some(password);
        }
        if let Some(token) = lookup("ZTP_TELEGRAM_TOKEN") {
            self.telegram
                .get_or_insert_with(|| TelegramSettings {
                    token: String::new(),
                    api_url: None,
                })
                .token = token;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        let has_token = self
            .telegram
            .as_ref()
            .is_some_and(|telegram| !telegram.token.is_empty());
        if !self.engine.recipients.is_empty() && !has_token {
            bail!("engine.recipients is set but no Telegram token is configured");
        }
        Ok(())
    }

    pub fn device_gateway(&self) -> Result<HttpDeviceGateway> {
        let config = HttpGatewayConfig::new(&self.device_api.url)
            .with_request_timeout(Duration::from_secs(self.device_api.timeout_secs));
        Ok(HttpDeviceGateway::new(config)?)
    }

    fn transfer_server(&self) -> FtpTransferServer {
        let ftp = &self.ftp;
        let mut config = FtpConfig::new(&ftp.host)
            .with_port(ftp.port)
            .with_timeout(Duration::from_secs(ftp.timeout_secs));
        if let Some(username) = &ftp.username {
            config = config.with_credentials(username, ftp.password.clone().unwrap_or_default());
        }
        FtpTransferServer::new(config)
    }

    fn record_store(&self) -> Result<ApiRecordStore> {
        let mut config = ApiStoreConfig::new(&self.record_api.url)
            .with_request_timeout(Duration::from_secs(self.record_api.timeout_secs));
        if let Some(size) = self.record_api.page_size {
            config = config.with_page_size(size);
        }
        Ok(ApiRecordStore::new(config)?)
    }

    /// Without a Telegram token nothing is delivered; recipients are then
    /// required to be empty by [`Settings::validate`].
    fn notifier(&self) -> Result<Arc<dyn Notifier>> {
        match &self.telegram {
            Some(telegram) if !telegram.token.is_empty() => {
                let mut config = TelegramConfig::new(&telegram.token);
                if let Some(url) = &telegram.api_url {
                    config = config.with_api_url(url);
                }
                Ok(Arc::new(TelegramNotifier::new(config)?))
            }
            _ => Ok(Arc::new(MemoryNotifier::new())),
        }
    }

    /// Wire the engine to the configured services
    pub fn engine(&self) -> Result<ProvisioningEngine> {
        Ok(ProvisioningEngine::new(
            Arc::new(self.device_gateway()?),
            Arc::new(self.transfer_server()),
            self.notifier()?,
            Arc::new(self.record_store()?),
            self.engine.clone(),
        )?)
    }
}

impl std::fmt::Debug for FtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ztp_workflow::WaitLimit;

    const YAML: &str = r#"
device_api:
  url: http://device-api:8000
record_api:
  url: http://records:8080
  page_size: 50
ftp:
  host: 10.0.0.2
  username: ztp
engine:
  poll_interval: 2
  waits:
    up: 600
    download: 1800
    rebooted: forever
  management_vlan: 100
"#;

    #[test]
    fn test_parse_settings() {
        let settings = Settings::from_yaml(YAML).unwrap();
        assert_eq!(settings.device_api.timeout_secs, 30);
        assert_eq!(settings.record_api.page_size, Some(50));
        assert_eq!(settings.ftp.port, 21);
        assert!(settings.telegram.is_none());
        assert_eq!(settings.engine.waits.rebooted, WaitLimit::Forever);
        assert_eq!(settings.engine.poll_interval, Duration::from_secs(2));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::from_yaml(YAML).unwrap();
        settings.apply_env(|key| match key {
            "ZTP_FTP_PASSWORD" => Some("s3cret".to_string()),
            "ZTP_TELEGRAM_TOKEN" => Some("123:abc".to_string()),
            "ZTP_DEVICE_API_URL" => Some("http://other:9000".to_string()),
            _ => None,
        });
        assert_eq!(settings.ftp.password.as_deref(), Some("s3cret"));
        assert_eq!(settings.telegram.as_ref().unwrap().token, "123:abc");
        assert_eq!(settings.device_api.url, "http://other:9000");
        assert_eq!(settings.record_api.url, "http://records:8080");

        let debug = format!("{:?}", settings);
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("123:abc"));
    }

    #[test]
    fn test_recipients_need_token() {
        let mut settings = Settings::from_yaml(YAML).unwrap();
        settings.engine.recipients = vec!["-100".to_string()];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_waits_are_required() {
        let yaml = YAML.replace("    rebooted: forever\n", "");
        assert!(Settings::from_yaml(&yaml).is_err());
    }
}
