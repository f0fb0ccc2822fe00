//! ZTP Workflow Engine
//!
//! This crate drives a switch through zero-touch provisioning: optional
//! VLAN changes on the upstream port, waits for the device to boot, fetch
//! its firmware and config and reboot, an optional full-config push, and
//! finally marking its record done.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              TaskDispatcher                          │
//! │   one tokio task + CancellationToken per run         │
//! │                      │                               │
//! │                      ▼                               │
//! │  ┌─────────────────────────────────────────────┐    │
//! │  │          ProvisioningEngine                 │    │
//! │  │   step list → one interpreter loop          │    │
//! │  └─────────────────────────────────────────────┘    │
//! │       │              │               │               │
//! │       ▼              ▼               ▼               │
//! │  ReadinessPoller  ztp-vlan     ProgressReporter      │
//! │  gateway+transfer  mutator      Notifier             │
//! │                      │                               │
//! │                      ▼                               │
//! │  ┌─────────────────────────────────────────────┐    │
//! │  │          RecordStore                        │    │
//! │  │   Memory | record API                       │    │
//! │  └─────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ztp_workflow::{EngineConfig, ProvisioningEngine, TaskDispatcher, WaitLimit, WaitLimits};
//! use std::sync::Arc;
//!
//! let config = EngineConfig::new(WaitLimits::uniform(WaitLimit::Seconds(1800)));
//! let engine = ProvisioningEngine::new(gateway, transfer, notifier, store, config)?;
//! let dispatcher = TaskDispatcher::new(Arc::new(engine));
//!
//! let run = dispatcher.start_record(42, Default::default()).await?;
//! dispatcher.wait(&run).await;
//! ```

pub mod api_store;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod poller;
pub mod progress;
pub mod push;
pub mod request;
pub mod steps;
pub mod store;

pub use api_store::{ApiRecordStore, ApiStoreConfig};
pub use config::{EngineConfig, WaitLimit, WaitLimits};
pub use dispatcher::{RunOutcome, TaskDispatcher};
pub use error::{Result, StoreError, WorkflowError};
pub use executor::{ProvisioningEngine, RunEvent};
pub use poller::{Readiness, ReadinessPoller};
pub use progress::{Milestone, ProgressReporter};
pub use request::{ProvisioningRequest, RunHandle, StartOptions};
pub use steps::WorkflowStep;
pub use store::{MemoryRecordStore, RecordStore};
