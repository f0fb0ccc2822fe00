//! Error types for provisioning runs

use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;
use ztp_common::RecordStatus;
use ztp_gateway::GatewayError;
use ztp_transfer::TransferError;
use ztp_vlan::VlanError;

/// Error type for record store access
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record API unreachable or timed out
    #[error("record API request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Record API answered with a non-success status
    #[error("record API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// No record with this id
    #[error("record {0} not found")]
    NotFound(i64),

    /// Patch would break a record invariant
    #[error(transparent)]
    InvalidRecord(#[from] ztp_common::Error),
}

impl StoreError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Request(e) => e.is_timeout() || e.is_connect(),
            StoreError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Error type for provisioning runs
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Request cannot be run as given
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Engine settings are unusable
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Record is not in a status that allows the operation
    #[error("record {id} is {status}")]
    InvalidState { id: i64, status: RecordStatus },

    /// No record in the expected status for a device
    #[error("no {status} record for {device}")]
    RecordNotFound {
        device: Ipv4Addr,
        status: RecordStatus,
    },

    /// Run handle does not name a run in this process
    #[error("unknown run: {0}")]
    UnknownRun(String),

    /// A wait exceeded its configured limit
    #[error("timed out after {waited:?} waiting for {condition}")]
    Timeout {
        condition: &'static str,
        waited: Duration,
    },

    /// Too many consecutive transient errors while polling
    #[error("{condition}: gave up after {errors} consecutive errors, last: {last}")]
    ProbeBudgetExhausted {
        condition: &'static str,
        errors: u32,
        last: String,
    },

    /// Device gateway call failed
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// VLAN edit failed
    #[error("VLAN error: {0}")]
    Vlan(#[from] VlanError),

    /// Transfer server call failed
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Record store call failed
    #[error("record store error: {0}")]
    Store(#[from] StoreError),

    /// Run was cancelled
    #[error("run cancelled")]
    Cancelled,
}

impl WorkflowError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            WorkflowError::Gateway(e) => e.is_transient(),
            WorkflowError::Vlan(VlanError::Gateway(e)) => e.is_transient(),
            WorkflowError::Transfer(e) => e.is_transient(),
            WorkflowError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type for provisioning runs
pub type Result<T> = std::result::Result<T, WorkflowError>;
