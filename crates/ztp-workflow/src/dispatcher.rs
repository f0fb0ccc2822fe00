//! Run dispatcher
//!
//! Each run is one tokio task. The dispatcher owns the cancellation token
//! and join handle of every run it spawned, and ties runs to stored records:
//! starting a record marks it IN_PROGRESS with the run's handle, stopping it
//! cancels the run and returns the record to WAITING.

use chrono::Utc;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use ztp_common::{RecordPatch, RecordStatus};

use crate::error::{Result, WorkflowError};
use crate::executor::ProvisioningEngine;
use crate::request::{ProvisioningRequest, RunHandle, StartOptions};

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

impl From<Result<()>> for RunOutcome {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => RunOutcome::Completed,
            Err(WorkflowError::Cancelled) => RunOutcome::Cancelled,
            Err(e) => RunOutcome::Failed(e.to_string()),
        }
    }
}

struct RunEntry {
    device: Ipv4Addr,
    cancel: CancellationToken,
    /// Taken by the first caller of [`TaskDispatcher::wait`]
    task: Option<JoinHandle<RunOutcome>>,
}

/// Spawns, tracks and cancels provisioning runs
pub struct TaskDispatcher {
    engine: Arc<ProvisioningEngine>,
    runs: Mutex<HashMap<RunHandle, RunEntry>>,
}

impl TaskDispatcher {
    pub fn new(engine: Arc<ProvisioningEngine>) -> Self {
        Self {
            engine,
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<ProvisioningEngine> {
        &self.engine
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<RunHandle, RunEntry>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a run for `request` in the background
    ///
    /// Invalid requests are rejected here, before anything is spawned.
    pub fn dispatch(&self, request: ProvisioningRequest) -> Result<RunHandle> {
        request.validate()?;
        let handle = RunHandle::new();
        self.spawn(handle, request);
        Ok(handle)
    }

    fn spawn(&self, handle: RunHandle, request: ProvisioningRequest) {
        self.reap();

        let cancel = CancellationToken::new();
        let device = request.device;
        let engine = self.engine.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            RunOutcome::from(engine.run(handle, &request, token).await)
        });

        info!(run = %handle, device = %device, "Run dispatched");
        self.runs().insert(
            handle,
            RunEntry {
                device,
                cancel,
                task: Some(task),
            },
        );
    }

    /// Drop finished runs nobody is waiting on
    fn reap(&self) {
        self.runs()
            .retain(|_, entry| entry.task.as_ref().map_or(true, |task| !task.is_finished()));
    }

    /// Signal a run to stop; false if the handle is unknown here
    pub fn cancel(&self, handle: &RunHandle) -> bool {
        match self.runs().get(handle) {
            Some(entry) => {
                info!(run = %handle, device = %entry.device, "Cancelling run");
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a run is known and has not finished yet
    pub fn is_running(&self, handle: &RunHandle) -> bool {
        self.runs()
            .get(handle)
            .and_then(|entry| entry.task.as_ref())
            .is_some_and(|task| !task.is_finished())
    }

    /// Handles of runs that have not finished yet
    pub fn active_runs(&self) -> Vec<RunHandle> {
        self.runs()
            .iter()
            .filter(|(_, entry)| entry.task.as_ref().is_some_and(|task| !task.is_finished()))
            .map(|(handle, _)| *handle)
            .collect()
    }

    /// Wait for a run to end and forget it
    ///
    /// Returns `None` for unknown handles, or when another caller is already
    /// waiting on the same run. Dropping the future before it resolves
    /// leaves the run going but no longer waitable.
    pub async fn wait(&self, handle: &RunHandle) -> Option<RunOutcome> {
        let task = self.runs().get_mut(handle)?.task.take()?;
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => RunOutcome::Failed(format!("run task aborted: {e}")),
        };
        self.runs().remove(handle);
        Some(outcome)
    }

    /// Start provisioning a WAITING record
    ///
    /// The record is patched to IN_PROGRESS with the new run's handle before
    /// the run is spawned.
    pub async fn start_record(&self, id: i64, options: StartOptions) -> Result<RunHandle> {
        let store = self.engine.store();
        let record = store.get(id).await?;
        if record.status != RecordStatus::Waiting {
            return Err(WorkflowError::InvalidState {
                id,
                status: record.status,
            });
        }

        let options = StartOptions {
            management_vlan: options
                .management_vlan
                .or(self.engine.config().management_vlan),
            ..options
        };
        let request = ProvisioningRequest::from_record(&record, &options);
        request.validate()?;

        let handle = RunHandle::new();
        store
            .patch(id, &RecordPatch::started(handle.to_string(), Utc::now()))
            .await?;
        info!(record = id, run = %handle, device = %record.ip_address, "Record started");

        self.spawn(handle, request);
        Ok(handle)
    }

    /// Stop a record's run and return the record to WAITING
    ///
    /// Nothing done so far is rolled back. A record whose run finished before
    /// the stop took effect is left as the run left it.
    pub async fn stop_record(&self, id: i64) -> Result<()> {
        let store = self.engine.store();
        let record = store.get(id).await?;
        let Some(task_handle) = record.task_handle else {
            return Err(WorkflowError::InvalidState {
                id,
                status: record.status,
            });
        };

        match task_handle.parse::<RunHandle>() {
            Ok(handle) if self.cancel(&handle) => {}
            _ => warn!(
                record = id,
                run = %task_handle,
                "Run is not active in this process, clearing handle only"
            ),
        }

        let current = store.get(id).await?;
        if current.status != RecordStatus::InProgress
            || current.task_handle.as_deref() != Some(task_handle.as_str())
        {
            info!(
                record = id,
                status = %current.status,
                "Run finished before the stop, record left unchanged"
            );
            return Ok(());
        }

        store.patch(id, &RecordPatch::cancelled()).await?;
        info!(record = id, device = %record.ip_address, "Record stopped");
        Ok(())
    }
}

impl std::fmt::Debug for TaskDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("runs", &self.runs().len())
            .finish_non_exhaustive()
    }
}
