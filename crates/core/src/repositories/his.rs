//! Storage seams over the HIS database.
//!
//! Rows here are the flat shapes the queries return. Assembly into records (gender mapping,
//! test aggregation, class defaulting) happens in `crate::records`, so these types carry no
//! behaviour beyond a few accessors.

use crate::BridgeResult;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashSet;

/// One lab registration joined with its visit, patient and reference data.
#[derive(Clone, Debug, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct OrderRow {
    pub register_id: i64,
    pub kode_transaksi: String,
    pub reg_no: Option<String>,
    pub no_rm: Option<String>,
    pub nama: Option<String>,
    pub jenis_kelamin: Option<i64>,
    pub tanggal_lahir: Option<String>,
    pub alamat: Option<String>,
    pub no_telepon_1: Option<String>,
    pub no_telepon_2: Option<String>,
    pub email: Option<String>,
    pub no_identitas: Option<String>,
    pub cara_bayar_id: Option<String>,
    pub cara_bayar_nama: Option<String>,
    pub dokter_id: Option<String>,
    pub dokter_nama: Option<String>,
    pub layanan_id: Option<String>,
    pub layanan_nama: Option<String>,
    pub bed_id: Option<String>,
    pub bed_nama: Option<String>,
    pub kelas_id: Option<String>,
    pub kelas_nama: Option<String>,
    pub cito: Option<i64>,
    pub created_at: Option<String>,
    pub created_by: Option<String>,
}

/// An examination ordered under a registration.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct RegisteredTest {
    pub register_id: i64,
    pub kode: String,
    pub batal: i64,
}

impl RegisteredTest {
    pub fn is_cancelled(&self) -> bool {
        self.batal != 0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct PatientRow {
    pub no_rm: String,
    pub nama: Option<String>,
    pub jenis_kelamin: Option<i64>,
    pub tanggal_lahir: Option<String>,
    pub alamat: Option<String>,
    pub no_telepon_1: Option<String>,
    pub no_telepon_2: Option<String>,
    pub email: Option<String>,
    pub no_identitas: Option<String>,
    pub created_by: Option<String>,
}

/// Care class reference (`m_kelas`).
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct ClassRef {
    pub id: String,
    pub nama: Option<String>,
}

/// One result item expected for a transaction: examination package, its item and the
/// execution it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct ExaminationItemRow {
    /// `t_lab_pelaksanaan.id`
    pub execution_id: i64,
    /// `t_lab_pelaksanaan_pemeriksaan.id`, the owner of result rows.
    pub examination_id: i64,
    pub package_code: String,
    pub item_code: String,
    pub item_name: Option<String>,
}

/// Natural key of a stored result: examination id and item code.
pub type ResultKey = (i64, String);

/// A result row ready to be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultRow {
    pub examination_id: i64,
    pub item_code: String,
    pub item_name: Option<String>,
    pub data_type: Option<String>,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub abnormal_flag: Option<String>,
}

impl ResultRow {
    pub fn key(&self) -> ResultKey {
        (self.examination_id, self.item_code.clone())
    }
}

/// Audit stamp written on completed executions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionCompletion {
    pub actor_id: i64,
    pub at: NaiveDateTime,
}

/// Read access to HIS registrations and patients.
#[async_trait]
pub trait HisSource: Send + Sync {
    /// Active registrations for the given transaction codes, ordered by registration id.
    async fn fetch_order_rows(&self, kode_transaksi: &[String]) -> BridgeResult<Vec<OrderRow>>;

    /// Examinations ordered under the given registrations, cancelled ones included.
    async fn fetch_registered_tests(&self, register_ids: &[i64])
        -> BridgeResult<Vec<RegisteredTest>>;

    async fn fetch_patient_rows(&self, no_rm: &str) -> BridgeResult<Vec<PatientRow>>;

    /// The configured default outpatient class, if any.
    async fn fetch_default_class(&self) -> BridgeResult<Option<ClassRef>>;
}

/// Opens transactional units of work over the result tables.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn begin(&self) -> BridgeResult<Box<dyn ResultUnitOfWork>>;
}

/// Writes made while reconciling one webhook. Nothing is visible to other readers until
/// `commit`; dropping without committing discards everything.
#[async_trait]
pub trait ResultUnitOfWork: Send {
    /// Expected result items of a transaction, locked against concurrent reconciliation.
    async fn examination_items(&mut self, kode_transaksi: &str)
        -> BridgeResult<Vec<ExaminationItemRow>>;

    /// Keys among `examination_ids` x `item_codes` that already have a stored result.
    async fn existing_result_keys(
        &mut self,
        examination_ids: &[i64],
        item_codes: &[String],
    ) -> BridgeResult<HashSet<ResultKey>>;

    async fn insert_results(&mut self, rows: &[ResultRow], at: NaiveDateTime) -> BridgeResult<()>;

    /// Overwrite existing results in one statement.
    async fn update_results(&mut self, rows: &[ResultRow], at: NaiveDateTime) -> BridgeResult<()>;

    /// Mark the registration as having results from the LIS.
    async fn flag_results_available(
        &mut self,
        kode_transaksi: &str,
        at: NaiveDateTime,
    ) -> BridgeResult<()>;

    async fn complete_executions(
        &mut self,
        execution_ids: &[i64],
        completion: &ExecutionCompletion,
    ) -> BridgeResult<()>;

    async fn commit(&mut self) -> BridgeResult<()>;

    async fn rollback(&mut self) -> BridgeResult<()>;
}
