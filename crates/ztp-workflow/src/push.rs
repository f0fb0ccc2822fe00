//! Full-config command batches

use std::net::Ipv4Addr;
use tracing::{debug, info};
use ztp_gateway::DeviceGateway;
use ztp_transfer::TransferServer;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::request::ProvisioningRequest;

/// Assemble the batch sent after reboot
///
/// Blank lines are dropped. Without any body lines the batch is empty and the
/// preamble and epilogue are not sent either.
pub fn build_batch(
    file_lines: &[String],
    commands: &[String],
    preamble: &[String],
    epilogue: &[String],
) -> Vec<String> {
    let body: Vec<String> = file_lines
        .iter()
        .chain(commands)
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if body.is_empty() {
        return Vec::new();
    }

    preamble
        .iter()
        .cloned()
        .chain(body)
        .chain(epilogue.iter().cloned())
        .collect()
}

/// Send the request's full config to `device`, returning the batch length
pub async fn push_full_config(
    gateway: &dyn DeviceGateway,
    transfer: &dyn TransferServer,
    config: &EngineConfig,
    device: Ipv4Addr,
    request: &ProvisioningRequest,
) -> Result<usize> {
    let file_lines = match &request.full_config_filename {
        Some(name) => {
            let path = format!("{}/{}", config.full_config_dir.trim_end_matches('/'), name);
            debug!(device = %device, path = %path, "Fetching full config");
            transfer.download_lines(&path).await?
        }
        None => Vec::new(),
    };

    let batch = build_batch(
        &file_lines,
        &request.full_config_commands,
        &config.command_preamble,
        &config.command_epilogue,
    );
    if batch.is_empty() {
        info!(device = %device, "Full config is empty, nothing to push");
        return Ok(0);
    }

    gateway.send_command_batch(device, &batch).await?;
    info!(device = %device, commands = batch.len(), "Full config pushed");
    Ok(batch.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{WaitLimit, WaitLimits};
    use crate::error::WorkflowError;
    use ztp_gateway::MemoryGateway;
    use ztp_transfer::{MemoryTransferServer, TransferError};

    const DEVICE: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn config() -> EngineConfig {
        EngineConfig::new(WaitLimits::uniform(WaitLimit::Forever))
    }

    #[test]
    fn test_build_batch_wraps_body() {
        let batch = build_batch(
            &lines(&["config vlan v10 add tagged 25", "", "  "]),
            &lines(&["save"]),
            &lines(&["disable clipaging"]),
            &lines(&["enable clipaging"]),
        );
        assert_eq!(
            batch,
            lines(&[
                "disable clipaging",
                "config vlan v10 add tagged 25",
                "save",
                "enable clipaging"
            ])
        );
    }

    #[test]
    fn test_build_batch_empty_body() {
        let batch = build_batch(&lines(&["", ""]), &[], &lines(&["a"]), &lines(&["b"]));
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_push_reads_file_from_full_config_dir() {
        let gateway = MemoryGateway::new();
        let transfer = MemoryTransferServer::new();
        transfer.add_file("/configs/full/access.cfg", "create vlan v10 tag 10\r\n\r\nsave\r\n");
        let request = ProvisioningRequest::new(DEVICE)
            .with_full_config(Some("access.cfg".to_string()), Vec::new());

        let sent = push_full_config(&gateway, &transfer, &config(), DEVICE, &request)
            .await
            .unwrap();
        assert_eq!(sent, 6);
        let batches = gateway.batches(DEVICE);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][2], "create vlan v10 tag 10");
        assert_eq!(batches[0][3], "save");
    }

    #[tokio::test]
    async fn test_push_nothing_sends_nothing() {
        let gateway = MemoryGateway::new();
        let transfer = MemoryTransferServer::new();
        let request = ProvisioningRequest::new(DEVICE).with_full_config(None, Vec::new());

        let sent = push_full_config(&gateway, &transfer, &config(), DEVICE, &request)
            .await
            .unwrap();
        assert_eq!(sent, 0);
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_push_missing_file() {
        let gateway = MemoryGateway::new();
        let transfer = MemoryTransferServer::new();
        let request = ProvisioningRequest::new(DEVICE)
            .with_full_config(Some("missing.cfg".to_string()), Vec::new());

        let err = push_full_config(&gateway, &transfer, &config(), DEVICE, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Transfer(TransferError::NotFound(_))));
    }
}
