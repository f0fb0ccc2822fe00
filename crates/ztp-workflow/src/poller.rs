//! Device readiness polling
//!
//! Two conditions are watched at a fixed interval:
//!
//! - the device answers reachability probes
//! - the device has requested both firmware and config from the boot server
//!   and has then stopped answering probes (it is rebooting into them)
//!
//! Each check returns a typed outcome. Transient errors count as "not ready
//! yet" up to the configured budget of consecutive errors; fatal errors end
//! the wait at once.

use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ztp_gateway::DeviceGateway;
use ztp_transfer::{access_log, ArtifactMarkers, ArtifactsRequested, TransferError, TransferServer};

use crate::config::{EngineConfig, WaitLimit};
use crate::error::{Result, WorkflowError};

/// Outcome of a single successful check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady,
}

impl From<bool> for Readiness {
    fn from(ready: bool) -> Self {
        if ready {
            Readiness::Ready
        } else {
            Readiness::NotReady
        }
    }
}

/// A check that could not be answered
#[derive(Debug)]
pub enum CheckError {
    /// Worth asking again on the next tick
    Transient(WorkflowError),
    /// Asking again will not help
    Fatal(WorkflowError),
}

impl CheckError {
    fn classify(err: impl Into<WorkflowError>) -> Self {
        let err = err.into();
        if err.is_transient() {
            CheckError::Transient(err)
        } else {
            CheckError::Fatal(err)
        }
    }
}

pub type CheckResult<T> = std::result::Result<T, CheckError>;

/// Polls one device's readiness through the gateway and transfer server
pub struct ReadinessPoller {
    gateway: Arc<dyn DeviceGateway>,
    transfer: Arc<dyn TransferServer>,
    interval: Duration,
    error_budget: u32,
    access_log_path: String,
    markers: ArtifactMarkers,
}

impl ReadinessPoller {
    pub fn new(
        gateway: Arc<dyn DeviceGateway>,
        transfer: Arc<dyn TransferServer>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            gateway,
            transfer,
            interval: config.poll_interval,
            error_budget: config.probe_error_budget,
            access_log_path: config.access_log_path.clone(),
            markers: config.markers.clone(),
        }
    }

    /// One reachability probe
    pub async fn is_reachable(&self, device: Ipv4Addr) -> CheckResult<bool> {
        self.gateway
            .probe_reachability(device)
            .await
            .map_err(CheckError::classify)
    }

    /// Which artifacts `device` has requested so far, from the access log
    ///
    /// A missing log means nothing has been requested yet.
    pub async fn check_artifacts_requested(&self, device: Ipv4Addr) -> CheckResult<ArtifactsRequested> {
        let log = match self.transfer.download_file(&self.access_log_path).await {
            Ok(data) => data,
            Err(TransferError::NotFound(_)) => {
                debug!(path = %self.access_log_path, "Access log not present yet");
                return Ok(ArtifactsRequested::default());
            }
            Err(e) => return Err(CheckError::classify(e)),
        };
        let log = String::from_utf8_lossy(&log);
        Ok(access_log::scan(&log, device, &self.markers))
    }

    /// Device answers probes
    pub async fn check_up(&self, device: Ipv4Addr) -> CheckResult<Readiness> {
        self.is_reachable(device).await.map(Readiness::from)
    }

    /// Both artifacts requested and the device no longer answers
    ///
    /// The probe only runs once both artifacts have been seen. A failed probe
    /// is never taken to mean "unreachable".
    pub async fn check_download_complete(&self, device: Ipv4Addr) -> CheckResult<Readiness> {
        let artifacts = self.check_artifacts_requested(device).await?;
        if !artifacts.both() {
            debug!(
                device = %device,
                firmware = artifacts.firmware,
                config = artifacts.config,
                "Artifacts outstanding"
            );
            return Ok(Readiness::NotReady);
        }
        let reachable = self.is_reachable(device).await?;
        Ok(Readiness::from(!reachable))
    }

    /// Block until the device answers a probe
    pub async fn wait_until_reachable(
        &self,
        device: Ipv4Addr,
        limit: WaitLimit,
        cancel: &CancellationToken,
    ) -> Result<Duration> {
        self.wait_for("device reachable", device, limit, cancel, || self.check_up(device))
            .await
    }

    /// Block until the device has fetched both artifacts and dropped off
    pub async fn wait_until_download_complete(
        &self,
        device: Ipv4Addr,
        limit: WaitLimit,
        cancel: &CancellationToken,
    ) -> Result<Duration> {
        self.wait_for("download complete", device, limit, cancel, || {
            self.check_download_complete(device)
        })
        .await
    }

    /// Run `check` every interval until it is ready, returning the time waited
    async fn wait_for<F, Fut>(
        &self,
        condition: &'static str,
        device: Ipv4Addr,
        limit: WaitLimit,
        cancel: &CancellationToken,
        mut check: F,
    ) -> Result<Duration>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CheckResult<Readiness>>,
    {
        let started = Instant::now();
        let limit = limit.as_duration();
        let mut consecutive_errors = 0u32;

        info!(device = %device, condition, limit = ?limit, "Waiting");

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
                outcome = check() => outcome,
            };

            match outcome {
                Ok(Readiness::Ready) => {
                    let waited = started.elapsed();
                    info!(device = %device, condition, waited_ms = waited.as_millis() as u64, "Condition met");
                    return Ok(waited);
                }
                Ok(Readiness::NotReady) => consecutive_errors = 0,
                Err(CheckError::Transient(err)) => {
                    consecutive_errors += 1;
                    warn!(
                        device = %device,
                        condition,
                        error = %err,
                        consecutive_errors,
                        budget = self.error_budget,
                        "Check failed"
                    );
                    if consecutive_errors > self.error_budget {
                        return Err(WorkflowError::ProbeBudgetExhausted {
                            condition,
                            errors: consecutive_errors,
                            last: err.to_string(),
                        });
                    }
                }
                Err(CheckError::Fatal(err)) => return Err(err),
            }

            let waited = started.elapsed();
            if let Some(limit) = limit {
                if waited >= limit {
                    return Err(WorkflowError::Timeout { condition, waited });
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

impl std::fmt::Debug for ReadinessPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessPoller")
            .field("interval", &self.interval)
            .field("error_budget", &self.error_budget)
            .field("access_log_path", &self.access_log_path)
            .finish_non_exhaustive()
    }
}
