//! In-memory implementation of every storage seam.
//!
//! Used by tests and by the CLI when no database is reachable. A unit of work holds the state
//! lock for its whole lifetime and edits a staged copy; `commit` swaps the copy in, anything
//! else throws it away.

use super::his::{
    ClassRef, ExaminationItemRow, ExecutionCompletion, HisSource, OrderRow, PatientRow,
    RegisteredTest, ResultKey, ResultRow, ResultStore, ResultUnitOfWork,
};
use crate::audit::{AuditEntry, AuditId, AuditOutcome, AuditSink};
use crate::{BridgeError, BridgeResult};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A stored result with its timestamps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredResult {
    pub row: ResultRow,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Everything the in-memory store knows.
#[derive(Clone, Debug, Default)]
pub struct MemoryState {
    pub order_rows: Vec<OrderRow>,
    pub registered_tests: Vec<RegisteredTest>,
    pub patient_rows: Vec<PatientRow>,
    pub default_class: Option<ClassRef>,
    /// Expected result items keyed by transaction code.
    pub examination_items: BTreeMap<String, Vec<ExaminationItemRow>>,
    pub results: BTreeMap<ResultKey, StoredResult>,
    /// Transaction codes flagged as having LIS results.
    pub flagged_registrations: BTreeMap<String, NaiveDateTime>,
    pub completed_executions: BTreeMap<i64, ExecutionCompletion>,
    /// Row count of each `update_results` call, in order.
    pub update_batches: Vec<usize>,
    /// When set, result writes fail.
    pub fail_writes: bool,
}

type AuditRecord = (AuditEntry, Option<AuditOutcome>);

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    audit: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: MemoryState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            audit: Arc::default(),
        }
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    pub async fn set_fail_writes(&self, fail: bool) {
        self.state.lock().await.fail_writes = fail;
    }

    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit.lock().await.clone()
    }
}

#[async_trait]
impl HisSource for MemoryStore {
    async fn fetch_order_rows(&self, kode_transaksi: &[String]) -> BridgeResult<Vec<OrderRow>> {
        let state = self.state.lock().await;
        let mut rows: Vec<OrderRow> = state
            .order_rows
            .iter()
            .filter(|row| kode_transaksi.contains(&row.kode_transaksi))
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.register_id);
        Ok(rows)
    }

    async fn fetch_registered_tests(
        &self,
        register_ids: &[i64],
    ) -> BridgeResult<Vec<RegisteredTest>> {
        let state = self.state.lock().await;
        Ok(state
            .registered_tests
            .iter()
            .filter(|test| register_ids.contains(&test.register_id))
            .cloned()
            .collect())
    }

    async fn fetch_patient_rows(&self, no_rm: &str) -> BridgeResult<Vec<PatientRow>> {
        let state = self.state.lock().await;
        Ok(state
            .patient_rows
            .iter()
            .filter(|row| row.no_rm == no_rm)
            .cloned()
            .collect())
    }

    async fn fetch_default_class(&self) -> BridgeResult<Option<ClassRef>> {
        Ok(self.state.lock().await.default_class.clone())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn begin(&self) -> BridgeResult<Box<dyn ResultUnitOfWork>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard: Some(guard),
            staged,
        }))
    }
}

pub struct MemoryUnitOfWork {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    staged: MemoryState,
}

impl MemoryUnitOfWork {
    fn ensure_open(&self) -> BridgeResult<()> {
        if self.guard.is_none() {
            return Err(BridgeError::Storage("unit of work already finished".into()));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> BridgeResult<()> {
        self.ensure_open()?;
        if self.staged.fail_writes {
            return Err(BridgeError::Storage("write rejected by store".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResultUnitOfWork for MemoryUnitOfWork {
    async fn examination_items(
        &mut self,
        kode_transaksi: &str,
    ) -> BridgeResult<Vec<ExaminationItemRow>> {
        self.ensure_open()?;
        Ok(self
            .staged
            .examination_items
            .get(kode_transaksi)
            .cloned()
            .unwrap_or_default())
    }

    async fn existing_result_keys(
        &mut self,
        examination_ids: &[i64],
        item_codes: &[String],
    ) -> BridgeResult<HashSet<ResultKey>> {
        self.ensure_open()?;
        Ok(self
            .staged
            .results
            .keys()
            .filter(|(id, code)| examination_ids.contains(id) && item_codes.contains(code))
            .cloned()
            .collect())
    }

    async fn insert_results(&mut self, rows: &[ResultRow], at: NaiveDateTime) -> BridgeResult<()> {
        self.ensure_writable()?;
        for row in rows {
            if self.staged.results.contains_key(&row.key()) {
                return Err(BridgeError::Storage(format!(
                    "duplicate result for examination {} item {}",
                    row.examination_id, row.item_code
                )));
            }
            self.staged.results.insert(
                row.key(),
                StoredResult {
                    row: row.clone(),
                    created_at: at,
                    updated_at: at,
                },
            );
        }
        Ok(())
    }

    async fn update_results(&mut self, rows: &[ResultRow], at: NaiveDateTime) -> BridgeResult<()> {
        self.ensure_writable()?;
        self.staged.update_batches.push(rows.len());
        for row in rows {
            let created_at = self
                .staged
                .results
                .get(&row.key())
                .map_or(at, |existing| existing.created_at);
            self.staged.results.insert(
                row.key(),
                StoredResult {
                    row: row.clone(),
                    created_at,
                    updated_at: at,
                },
            );
        }
        Ok(())
    }

    async fn flag_results_available(
        &mut self,
        kode_transaksi: &str,
        at: NaiveDateTime,
    ) -> BridgeResult<()> {
        self.ensure_writable()?;
        self.staged
            .flagged_registrations
            .insert(kode_transaksi.to_string(), at);
        Ok(())
    }

    async fn complete_executions(
        &mut self,
        execution_ids: &[i64],
        completion: &ExecutionCompletion,
    ) -> BridgeResult<()> {
        self.ensure_writable()?;
        for id in execution_ids {
            self.staged
                .completed_executions
                .insert(*id, completion.clone());
        }
        Ok(())
    }

    async fn commit(&mut self) -> BridgeResult<()> {
        let mut guard = self
            .guard
            .take()
            .ok_or_else(|| BridgeError::Storage("unit of work already finished".into()))?;
        *guard = std::mem::take(&mut self.staged);
        Ok(())
    }

    async fn rollback(&mut self) -> BridgeResult<()> {
        self.guard.take();
        self.staged = MemoryState::default();
        Ok(())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn open(&self, entry: &AuditEntry) -> BridgeResult<AuditId> {
        let mut audit = self.audit.lock().await;
        audit.push((entry.clone(), None));
        Ok(AuditId(audit.len() as u64))
    }

    async fn close(&self, id: AuditId, outcome: &AuditOutcome) -> BridgeResult<()> {
        let mut audit = self.audit.lock().await;
        let record = usize::try_from(id.0)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|index| audit.get_mut(index))
            .ok_or_else(|| BridgeError::Storage(format!("unknown audit record {}", id.0)))?;
        record.1 = Some(outcome.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, 30)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .expect("timestamp")
    }

    fn row(examination_id: i64, item_code: &str, value: &str) -> ResultRow {
        ResultRow {
            examination_id,
            item_code: item_code.into(),
            item_name: None,
            data_type: Some("N".into()),
            value: Some(value.into()),
            unit: None,
            reference_range: None,
            abnormal_flag: None,
        }
    }

    #[tokio::test]
    async fn uncommitted_work_is_discarded() {
        let store = MemoryStore::new();

        let mut uow = store.begin().await.expect("begin");
        uow.insert_results(&[row(1, "HB", "13")], at())
            .await
            .expect("insert");
        uow.rollback().await.expect("rollback");

        assert!(store.snapshot().await.results.is_empty());

        let mut uow = store.begin().await.expect("begin");
        uow.insert_results(&[row(1, "HB", "13")], at())
            .await
            .expect("insert");
        drop(uow);

        assert!(store.snapshot().await.results.is_empty());
    }

    #[tokio::test]
    async fn committed_work_is_visible_and_updates_keep_created_at() {
        let store = MemoryStore::new();

        let mut uow = store.begin().await.expect("begin");
        uow.insert_results(&[row(1, "HB", "13")], at())
            .await
            .expect("insert");
        uow.commit().await.expect("commit");

        let later = at() + chrono::Duration::hours(1);
        let mut uow = store.begin().await.expect("begin");
        uow.update_results(&[row(1, "HB", "14")], later)
            .await
            .expect("update");
        uow.commit().await.expect("commit");

        let state = store.snapshot().await;
        let stored = &state.results[&(1, "HB".to_string())];
        assert_eq!(stored.row.value.as_deref(), Some("14"));
        assert_eq!(stored.created_at, at());
        assert_eq!(stored.updated_at, later);
        assert_eq!(state.update_batches, vec![1]);
    }

    #[tokio::test]
    async fn write_failures_can_be_injected() {
        let store = MemoryStore::new();
        store.set_fail_writes(true).await;

        let mut uow = store.begin().await.expect("begin");
        let err = uow
            .insert_results(&[row(1, "HB", "13")], at())
            .await
            .expect_err("injected failure");
        assert!(matches!(err, BridgeError::Storage(_)));
    }
}
