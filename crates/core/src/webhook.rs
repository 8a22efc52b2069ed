//! Webhook Reconciler: applies LIS result callbacks to the HIS.
//!
//! A callback moves through `RECEIVED -> VALIDATED -> MATCHED -> PERSISTED -> COMPLETED`, or
//! ends in `REJECTED`. Every write happens inside one unit of work: either all results,
//! the registration flag and the execution completions land, or none do.
//!
//! Results are matched to HIS examinations by package code, then to items by
//! `package||item`. Unmatched lines are skipped, not errors. Results are keyed by
//! (examination, item), so a redelivered callback updates rows instead of duplicating them.

use crate::config::BridgeConfig;
use crate::constants::LOOKUP_KEY_SEPARATOR;
use crate::repositories::his::{
    ExaminationItemRow, ExecutionCompletion, ResultKey, ResultRow, ResultStore, ResultUnitOfWork,
};
use crate::{BridgeError, BridgeResult};
use api_shared::webhook::{WebhookReq, WebhookResultTest};
use api_shared::ResponseEnvelope;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Lifecycle of one callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookStage {
    Received,
    Validated,
    Matched,
    Persisted,
    Completed,
    Rejected,
}

impl WebhookStage {
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookStage::Received => "RECEIVED",
            WebhookStage::Validated => "VALIDATED",
            WebhookStage::Matched => "MATCHED",
            WebhookStage::Persisted => "PERSISTED",
            WebhookStage::Completed => "COMPLETED",
            WebhookStage::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for WebhookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a callback was not applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// No transaction code in the sample.
    NoOrder,
    /// Malformed or incomplete payload.
    Invalid(String),
}

/// A callback that passed the structural gates.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedCallback {
    pub kode_transaksi: String,
    pub lis_sampel: String,
    pub results: Vec<WebhookResultTest>,
}

/// Check the structural gates of a callback body.
pub fn validate_callback(body: &[u8]) -> Result<ValidatedCallback, Rejection> {
    let request: WebhookReq = serde_json::from_slice(body)
        .map_err(|e| Rejection::Invalid(format!("malformed payload: {e}")))?;
    let response = request.response;

    if response.code.trim() != "200" {
        return Err(Rejection::Invalid(format!(
            "response code is {:?}, expected \"200\"",
            response.code
        )));
    }

    let sample = response
        .sampel
        .ok_or_else(|| Rejection::Invalid("missing sampel".into()))?;

    let kode_transaksi = sample
        .order_lab
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty())
        .ok_or(Rejection::NoOrder)?;

    let lis_sampel = sample
        .lis_sampel
        .ok_or_else(|| Rejection::Invalid("missing lis_sampel".into()))?;

    let results = sample
        .result_test
        .ok_or_else(|| Rejection::Invalid("missing result_test".into()))?;

    Ok(ValidatedCallback {
        kode_transaksi,
        lis_sampel,
        results,
    })
}

pub fn lookup_key(package_code: &str, item_code: &str) -> String {
    format!("{package_code}{LOOKUP_KEY_SEPARATOR}{item_code}")
}

/// Expected items of one transaction, indexed for matching.
#[derive(Debug, Default)]
pub struct ExaminationLookup {
    /// package code -> (examination id, execution id)
    packages: HashMap<String, (i64, i64)>,
    /// `package||item` -> (item code, item name)
    items: HashMap<String, (String, Option<String>)>,
}

/// A result line matched to an HIS examination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchedResult {
    pub row: ResultRow,
    pub execution_id: i64,
}

impl ExaminationLookup {
    /// Index rows. When a package appears under several examinations the last one wins.
    pub fn from_rows(rows: &[ExaminationItemRow]) -> Self {
        let mut lookup = Self::default();
        for row in rows {
            lookup
                .packages
                .insert(row.package_code.clone(), (row.examination_id, row.execution_id));
            lookup.items.insert(
                lookup_key(&row.package_code, &row.item_code),
                (row.item_code.clone(), row.item_name.clone()),
            );
        }
        lookup
    }

    pub fn match_one(&self, test: &WebhookResultTest) -> Option<MatchedResult> {
        let (examination_id, execution_id) = *self.packages.get(&test.kode_paket)?;
        let (item_code, item_name) = self
            .items
            .get(&lookup_key(&test.kode_paket, &test.test_id))?;

        Some(MatchedResult {
            row: ResultRow {
                examination_id,
                item_code: item_code.clone(),
                item_name: item_name.clone(),
                data_type: test.jenis_hasil.clone(),
                value: test.hasil.clone(),
                unit: test.satuan.clone(),
                reference_range: test.nilai_normal.clone(),
                abnormal_flag: test.flag.clone(),
            },
            execution_id,
        })
    }

    /// Match every line, dropping unmatched ones. A repeated (examination, item) keeps its
    /// last value.
    pub fn match_all(&self, tests: &[WebhookResultTest]) -> Vec<MatchedResult> {
        let mut matched: Vec<MatchedResult> = Vec::new();
        let mut positions: HashMap<ResultKey, usize> = HashMap::new();
        for test in tests {
            let Some(result) = self.match_one(test) else {
                tracing::debug!(
                    package = %test.kode_paket,
                    item = %test.test_id,
                    "result line has no matching examination item"
                );
                continue;
            };
            match positions.entry(result.row.key()) {
                Entry::Occupied(slot) => matched[*slot.get()] = result,
                Entry::Vacant(slot) => {
                    slot.insert(matched.len());
                    matched.push(result);
                }
            }
        }
        matched
    }
}

/// What a successful reconciliation did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub received: usize,
    pub matched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub executions_completed: usize,
}

/// Result of handling one callback. The envelope is always returned to the LIS with HTTP 200.
#[derive(Clone, Debug, PartialEq)]
pub struct CallbackReport {
    pub envelope: ResponseEnvelope,
    pub stage: WebhookStage,
    pub kode_transaksi: Option<String>,
    pub summary: Option<ReconcileSummary>,
    pub error: Option<String>,
}

impl CallbackReport {
    fn rejected(kode_transaksi: Option<String>, envelope: ResponseEnvelope, error: String) -> Self {
        Self {
            envelope,
            stage: WebhookStage::Rejected,
            kode_transaksi,
            summary: None,
            error: Some(error),
        }
    }

    /// HTTP-like status for auditing.
    pub fn status_code(&self) -> u16 {
        self.envelope.response.code.parse().unwrap_or(500)
    }
}

fn at_stage(stage: WebhookStage) -> impl FnOnce(BridgeError) -> BridgeError {
    move |e| match e {
        BridgeError::Reconciliation { .. } => e,
        other => BridgeError::Reconciliation {
            stage,
            reason: other.to_string(),
        },
    }
}

#[derive(Clone)]
pub struct WebhookReconciler {
    store: Arc<dyn ResultStore>,
    config: Arc<BridgeConfig>,
}

impl WebhookReconciler {
    pub fn new(store: Arc<dyn ResultStore>, config: Arc<BridgeConfig>) -> Self {
        Self { store, config }
    }

    /// Handle a raw callback body.
    pub async fn reconcile(&self, body: &[u8]) -> CallbackReport {
        tracing::info!(stage = %WebhookStage::Received, bytes = body.len(), "LIS callback");

        let callback = match validate_callback(body) {
            Ok(callback) => callback,
            Err(Rejection::NoOrder) => {
                tracing::info!(stage = %WebhookStage::Rejected, "callback without order_lab");
                return CallbackReport::rejected(
                    None,
                    ResponseEnvelope::no_data(),
                    "missing order_lab".into(),
                );
            }
            Err(Rejection::Invalid(reason)) => {
                tracing::warn!(stage = %WebhookStage::Rejected, %reason, "invalid callback");
                return CallbackReport::rejected(None, ResponseEnvelope::no_data(), reason);
            }
        };

        let kode = callback.kode_transaksi.clone();
        tracing::info!(
            stage = %WebhookStage::Validated,
            kode_transaksi = %kode,
            lis_sampel = %callback.lis_sampel,
            results = callback.results.len(),
            "callback validated"
        );

        let mut uow = match self.store.begin().await {
            Ok(uow) => uow,
            Err(e) => {
                tracing::error!(kode_transaksi = %kode, "failed to open unit of work: {e}");
                return CallbackReport::rejected(
                    Some(kode),
                    ResponseEnvelope::no_data(),
                    e.to_string(),
                );
            }
        };

        let applied = self.apply(uow.as_mut(), &callback).await;
        let committed = match applied {
            Ok(summary) => uow.commit().await.map(|()| summary).map_err(at_stage(WebhookStage::Completed)),
            Err(e) => {
                if let Err(rollback) = uow.rollback().await {
                    tracing::warn!(kode_transaksi = %kode, "rollback failed: {rollback}");
                }
                Err(e)
            }
        };

        match committed {
            Ok(summary) => {
                tracing::info!(
                    stage = %WebhookStage::Completed,
                    kode_transaksi = %kode,
                    matched = summary.matched,
                    inserted = summary.inserted,
                    updated = summary.updated,
                    "callback reconciled"
                );
                CallbackReport {
                    envelope: ResponseEnvelope::success(callback.lis_sampel),
                    stage: WebhookStage::Completed,
                    kode_transaksi: Some(kode),
                    summary: Some(summary),
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(
                    stage = %WebhookStage::Rejected,
                    kode_transaksi = %kode,
                    "reconciliation rolled back: {e}"
                );
                CallbackReport::rejected(Some(kode), ResponseEnvelope::no_data(), e.to_string())
            }
        }
    }

    async fn apply(
        &self,
        uow: &mut dyn ResultUnitOfWork,
        callback: &ValidatedCallback,
    ) -> BridgeResult<ReconcileSummary> {
        let mut summary = ReconcileSummary {
            received: callback.results.len(),
            ..ReconcileSummary::default()
        };

        let items = uow
            .examination_items(&callback.kode_transaksi)
            .await
            .map_err(at_stage(WebhookStage::Matched))?;
        let matched = ExaminationLookup::from_rows(&items).match_all(&callback.results);
        summary.matched = matched.len();

        tracing::debug!(
            stage = %WebhookStage::Matched,
            kode_transaksi = %callback.kode_transaksi,
            expected_items = items.len(),
            matched = matched.len(),
            "results matched"
        );

        if matched.is_empty() {
            return Ok(summary);
        }

        let examination_ids: Vec<i64> = matched
            .iter()
            .map(|m| m.row.examination_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let item_codes: Vec<String> = matched
            .iter()
            .map(|m| m.row.item_code.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let existing = uow
            .existing_result_keys(&examination_ids, &item_codes)
            .await
            .map_err(at_stage(WebhookStage::Persisted))?;

        let (updates, inserts): (Vec<ResultRow>, Vec<ResultRow>) = matched
            .iter()
            .map(|m| m.row.clone())
            .partition(|row| existing.contains(&row.key()));

        let now = chrono::Local::now().naive_local();

        if !inserts.is_empty() {
            uow.insert_results(&inserts, now)
                .await
                .map_err(at_stage(WebhookStage::Persisted))?;
        }
        for chunk in updates.chunks(self.config.limits().update_chunk_size) {
            uow.update_results(chunk, now)
                .await
                .map_err(at_stage(WebhookStage::Persisted))?;
        }
        summary.inserted = inserts.len();
        summary.updated = updates.len();

        tracing::debug!(
            stage = %WebhookStage::Persisted,
            kode_transaksi = %callback.kode_transaksi,
            inserted = summary.inserted,
            updated = summary.updated,
            "results persisted"
        );

        uow.flag_results_available(&callback.kode_transaksi, now)
            .await
            .map_err(at_stage(WebhookStage::Completed))?;

        let execution_ids: Vec<i64> = matched
            .iter()
            .map(|m| m.execution_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let completion = ExecutionCompletion {
            actor_id: self.config.system_user_id(),
            at: now,
        };
        uow.complete_executions(&execution_ids, &completion)
            .await
            .map_err(at_stage(WebhookStage::Completed))?;
        summary.executions_completed = execution_ids.len();

        Ok(summary)
    }
}
