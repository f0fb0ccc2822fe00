//! Provisioning record storage
//!
//! The record API owns provisioning records. The engine only needs to find
//! records by status, read one by id and patch lifecycle fields.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use ztp_common::{ProvisioningRecord, RecordPatch, RecordStatus};

use crate::error::{Result, StoreError};

/// Access to provisioning records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records currently in `status`
    async fn find_by_status(&self, status: RecordStatus) -> Result<Vec<ProvisioningRecord>>;

    /// One record by id
    async fn get(&self, id: i64) -> Result<ProvisioningRecord>;

    /// Apply a partial update and return the updated record
    async fn patch(&self, id: i64, patch: &RecordPatch) -> Result<ProvisioningRecord>;
}

/// In-memory record store for testing
///
/// Patches are checked against the record invariants and logged in order.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<i64, ProvisioningRecord>>,
    patches: RwLock<Vec<(i64, RecordPatch)>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a record
    pub fn insert(&self, record: ProvisioningRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id, record);
    }

    /// Every patch applied so far, oldest first
    pub fn patches(&self) -> Vec<(i64, RecordPatch)> {
        self.patches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn record(&self, id: i64) -> Option<ProvisioningRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_by_status(&self, status: RecordStatus) -> Result<Vec<ProvisioningRecord>> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> Result<ProvisioningRecord> {
        self.record(id).ok_or_else(|| StoreError::NotFound(id).into())
    }

    async fn patch(&self, id: i64, patch: &RecordPatch) -> Result<ProvisioningRecord> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let current = records.get(&id).ok_or(StoreError::NotFound(id))?;

        let mut updated = current.clone();
        updated.apply(patch);
        updated.validate().map_err(StoreError::from)?;

        records.insert(id, updated.clone());
        self.patches
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, patch.clone()));
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkflowError;
    use chrono::Utc;
    use std::net::Ipv4Addr;

    fn store() -> MemoryRecordStore {
        let store = MemoryRecordStore::new();
        store.insert(ProvisioningRecord::new(1, Ipv4Addr::new(10, 0, 0, 5)));
        store.insert(ProvisioningRecord::new(2, Ipv4Addr::new(10, 0, 0, 6)));
        store
    }

    #[tokio::test]
    async fn test_find_by_status() {
        let store = store();
        store
            .patch(2, &RecordPatch::started("run", Utc::now()))
            .await
            .unwrap();

        let waiting = store.find_by_status(RecordStatus::Waiting).await.unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, 1);

        let running = store.find_by_status(RecordStatus::InProgress).await.unwrap();
        assert_eq!(running[0].task_handle.as_deref(), Some("run"));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let err = store().get(99).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Store(StoreError::NotFound(99))));
    }

    #[tokio::test]
    async fn test_patch_is_logged() {
        let store = store();
        let patch = RecordPatch::started("run", Utc::now());
        store.patch(1, &patch).await.unwrap();
        assert_eq!(store.patches(), vec![(1, patch)]);
    }

    #[tokio::test]
    async fn test_patch_rejects_broken_invariants() {
        let store = store();
        // IN_PROGRESS without a handle
        let patch = RecordPatch {
            status: Some(RecordStatus::InProgress),
            ..Default::default()
        };
        let err = store.patch(1, &patch).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Store(StoreError::InvalidRecord(_))));
        assert_eq!(store.record(1).unwrap().status, RecordStatus::Waiting);
        assert!(store.patches().is_empty());
    }
}
