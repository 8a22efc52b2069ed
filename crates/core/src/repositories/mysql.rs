//! MySQL implementation of the storage seams.
//!
//! Reads the HIS schema directly. Dates and reference ids are cast to text in SQL so that
//! zero dates and mixed integer widths never fail row decoding; normalisation happens later.

use super::his::{
    ClassRef, ExaminationItemRow, ExecutionCompletion, HisSource, OrderRow, PatientRow,
    RegisteredTest, ResultKey, ResultRow, ResultStore, ResultUnitOfWork,
};
use crate::audit::{AuditEntry, AuditId, AuditOutcome, AuditSink};
use crate::constants::{DEFAULT_CLASS_OPTION, EXECUTION_STATUS_COMPLETED};
use crate::{BridgeError, BridgeResult};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::types::Json;
use sqlx::{MySql, QueryBuilder, Transaction};
use std::collections::{BTreeSet, HashSet};

const ORDER_SELECT: &str = r#"
SELECT
    CAST(r.id AS SIGNED) AS register_id,
    r.kode_transaksi,
    pl.no_register AS reg_no,
    ps.no_rm,
    ps.nama,
    CAST(ps.jenis_kelamin AS SIGNED) AS jenis_kelamin,
    CAST(ps.tanggal_lahir AS CHAR) AS tanggal_lahir,
    ps.alamat,
    ps.no_telepon_1,
    ps.no_telepon_2,
    ps.email,
    ps.no_identitas,
    CAST(r.cara_bayar_id AS CHAR) AS cara_bayar_id,
    cb.nama AS cara_bayar_nama,
    CAST(r.dokter_id AS CHAR) AS dokter_id,
    dk.nama AS dokter_nama,
    CAST(pl.layanan_id AS CHAR) AS layanan_id,
    ly.nama AS layanan_nama,
    CAST(pl.bed_id AS CHAR) AS bed_id,
    bd.nama AS bed_nama,
    CAST(pl.kelas_id AS CHAR) AS kelas_id,
    kl.nama AS kelas_nama,
    CAST(COALESCE(r.cito, 0) AS SIGNED) AS cito,
    CAST(r.created_at AS CHAR) AS created_at,
    CAST(r.created_by AS CHAR) AS created_by
FROM t_lab_register r
JOIN m_pasien ps ON ps.id = r.pasien_id
LEFT JOIN t_pelayanan pl ON pl.id = r.pelayanan_id
LEFT JOIN m_cara_bayar cb ON cb.id = r.cara_bayar_id
LEFT JOIN hrd_karyawan dk ON dk.id = r.dokter_id
LEFT JOIN m_layanan ly ON ly.id = pl.layanan_id
LEFT JOIN m_bed bd ON bd.id = pl.bed_id
LEFT JOIN m_kelas kl ON kl.id = pl.kelas_id
"#;

const PATIENT_SELECT: &str = r#"
SELECT
    ps.no_rm,
    ps.nama,
    CAST(ps.jenis_kelamin AS SIGNED) AS jenis_kelamin,
    CAST(ps.tanggal_lahir AS CHAR) AS tanggal_lahir,
    ps.alamat,
    ps.no_telepon_1,
    ps.no_telepon_2,
    ps.email,
    ps.no_identitas,
    CAST(ps.created_by AS CHAR) AS created_by
FROM m_pasien ps
WHERE ps.no_rm = ?
ORDER BY ps.id
"#;

const DEFAULT_CLASS_SELECT: &str = r#"
SELECT CAST(k.id AS CHAR) AS id, k.nama
FROM sys_options so
JOIN m_kelas k ON CAST(k.id AS CHAR) = so.option_value
WHERE so.option_name = ?
LIMIT 1
"#;

const EXAMINATION_ITEMS_SELECT: &str = r#"
SELECT
    CAST(pl.id AS SIGNED) AS execution_id,
    CAST(pp.id AS SIGNED) AS examination_id,
    mp.kode AS package_code,
    mi.kode AS item_code,
    mi.nama AS item_name
FROM t_lab_pelaksanaan_pemeriksaan pp
JOIN t_lab_pelaksanaan pl ON pl.id = pp.pelaksanaan_id
JOIN t_lab_register r ON r.id = pl.register_id
JOIN m_lab_pemeriksaan mp ON mp.id = pp.pemeriksaan_id
JOIN m_lab_pemeriksaan_fk fk ON fk.pemeriksaan_id = mp.id
JOIN m_lab_pemeriksaan_item mi ON mi.id = fk.pemeriksaan_item_id
WHERE r.kode_transaksi = ?
ORDER BY pp.id, mi.id
"#;

/// Serialises callbacks for one order without touching the shared catalogue tables.
const REGISTRATION_LOCK: &str =
    "SELECT CAST(id AS SIGNED) FROM t_lab_register WHERE kode_transaksi = ? FOR UPDATE";

const RESULT_COLUMNS: &str = "INSERT INTO t_lab_pelaksanaan_pemeriksaan_hasil \
     (pemeriksaan_id, kode, nama, datatype, value, satuan, nilai_normal, lis_flag_sign, lis, created_at, update_at) ";

/// Open a MySQL pool.
pub async fn connect(url: &str, max_connections: u32) -> BridgeResult<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;
    Ok(pool)
}

/// Apply the bridge's own migrations (the audit table).
pub async fn run_migrations(pool: &MySqlPool) -> BridgeResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// HIS reads and result writes over one pool.
#[derive(Clone)]
pub struct MySqlHisStore {
    pool: MySqlPool,
}

impl MySqlHisStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HisSource for MySqlHisStore {
    async fn fetch_order_rows(&self, kode_transaksi: &[String]) -> BridgeResult<Vec<OrderRow>> {
        if kode_transaksi.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<MySql>::new(ORDER_SELECT);
        qb.push(" WHERE COALESCE(r.deleted_flag, 0) = 0 AND r.kode_transaksi IN (");
        let mut codes = qb.separated(", ");
        for code in kode_transaksi {
            codes.push_bind(code.clone());
        }
        codes.push_unseparated(") ORDER BY r.id");

        let rows = qb
            .build_query_as::<OrderRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_registered_tests(
        &self,
        register_ids: &[i64],
    ) -> BridgeResult<Vec<RegisteredTest>> {
        if register_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<MySql>::new(
            "SELECT CAST(pl.register_id AS SIGNED) AS register_id, mp.kode, \
             CAST(COALESCE(pp.batal, 0) AS SIGNED) AS batal \
             FROM t_lab_pelaksanaan_pemeriksaan pp \
             JOIN t_lab_pelaksanaan pl ON pl.id = pp.pelaksanaan_id \
             JOIN m_lab_pemeriksaan mp ON mp.id = pp.pemeriksaan_id \
             WHERE pl.register_id IN (",
        );
        let mut ids = qb.separated(", ");
        for id in register_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(") ORDER BY pp.id");

        let rows = qb
            .build_query_as::<RegisteredTest>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_patient_rows(&self, no_rm: &str) -> BridgeResult<Vec<PatientRow>> {
        let rows = sqlx::query_as::<_, PatientRow>(PATIENT_SELECT)
            .bind(no_rm)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_default_class(&self) -> BridgeResult<Option<ClassRef>> {
        let class = sqlx::query_as::<_, ClassRef>(DEFAULT_CLASS_SELECT)
            .bind(DEFAULT_CLASS_OPTION)
            .fetch_optional(&self.pool)
            .await?;
        Ok(class)
    }
}

#[async_trait]
impl ResultStore for MySqlHisStore {
    async fn begin(&self) -> BridgeResult<Box<dyn ResultUnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlUnitOfWork { tx: Some(tx) }))
    }
}

pub struct MySqlUnitOfWork {
    tx: Option<Transaction<'static, MySql>>,
}

impl MySqlUnitOfWork {
    fn tx(&mut self) -> BridgeResult<&mut Transaction<'static, MySql>> {
        self.tx
            .as_mut()
            .ok_or_else(|| BridgeError::Storage("transaction already finished".into()))
    }
}

fn push_result_values(qb: &mut QueryBuilder<'_, MySql>, rows: &[ResultRow], at: NaiveDateTime) {
    qb.push_values(rows, |mut b, row| {
        b.push_bind(row.examination_id)
            .push_bind(row.item_code.clone())
            .push_bind(row.item_name.clone())
            .push_bind(row.data_type.clone())
            .push_bind(row.value.clone())
            .push_bind(row.unit.clone())
            .push_bind(row.reference_range.clone())
            .push_bind(row.abnormal_flag.clone())
            .push_bind(1_i32)
            .push_bind(at)
            .push_bind(at);
    });
}

type ResultColumn = (&'static str, fn(&ResultRow) -> Option<String>);

/// Columns rewritten when a result is delivered again.
const UPDATED_COLUMNS: [ResultColumn; 6] = [
    ("nama", |row: &ResultRow| row.item_name.clone()),
    ("datatype", |row: &ResultRow| row.data_type.clone()),
    ("value", |row: &ResultRow| row.value.clone()),
    ("satuan", |row: &ResultRow| row.unit.clone()),
    ("nilai_normal", |row: &ResultRow| row.reference_range.clone()),
    ("lis_flag_sign", |row: &ResultRow| row.abnormal_flag.clone()),
];

/// One `UPDATE` for a chunk of existing results, each column a `CASE` over
/// (pemeriksaan_id, kode). Needs no unique key on the results table.
fn update_results_query(rows: &[ResultRow], at: NaiveDateTime) -> QueryBuilder<'static, MySql> {
    let mut qb = QueryBuilder::new("UPDATE t_lab_pelaksanaan_pemeriksaan_hasil SET ");
    for (column, value) in UPDATED_COLUMNS {
        qb.push(column).push(" = CASE");
        for row in rows {
            qb.push(" WHEN pemeriksaan_id = ")
                .push_bind(row.examination_id)
                .push(" AND kode = ")
                .push_bind(row.item_code.clone())
                .push(" THEN ")
                .push_bind(value(row));
        }
        qb.push(" ELSE ").push(column).push(" END, ");
    }
    qb.push("lis = 1, update_at = ").push_bind(at);

    let ids: BTreeSet<i64> = rows.iter().map(|r| r.examination_id).collect();
    let codes: BTreeSet<&str> = rows.iter().map(|r| r.item_code.as_str()).collect();

    qb.push(" WHERE pemeriksaan_id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(") AND kode IN (");
    let mut separated = qb.separated(", ");
    for code in codes {
        separated.push_bind(code.to_string());
    }
    separated.push_unseparated(")");
    qb
}

#[async_trait]
impl ResultUnitOfWork for MySqlUnitOfWork {
    async fn examination_items(
        &mut self,
        kode_transaksi: &str,
    ) -> BridgeResult<Vec<ExaminationItemRow>> {
        let tx = self.tx()?;
        sqlx::query_scalar::<_, i64>(REGISTRATION_LOCK)
            .bind(kode_transaksi)
            .fetch_all(&mut **tx)
            .await?;
        let rows = sqlx::query_as::<_, ExaminationItemRow>(EXAMINATION_ITEMS_SELECT)
            .bind(kode_transaksi)
            .fetch_all(&mut **tx)
            .await?;
        Ok(rows)
    }

    async fn existing_result_keys(
        &mut self,
        examination_ids: &[i64],
        item_codes: &[String],
    ) -> BridgeResult<HashSet<ResultKey>> {
        if examination_ids.is_empty() || item_codes.is_empty() {
            return Ok(HashSet::new());
        }

        let mut qb = QueryBuilder::<MySql>::new(
            "SELECT CAST(pemeriksaan_id AS SIGNED), kode \
             FROM t_lab_pelaksanaan_pemeriksaan_hasil WHERE pemeriksaan_id IN (",
        );
        let mut ids = qb.separated(", ");
        for id in examination_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(") AND kode IN (");
        let mut codes = qb.separated(", ");
        for code in item_codes {
            codes.push_bind(code.clone());
        }
        codes.push_unseparated(") FOR UPDATE");

        let tx = self.tx()?;
        let keys = qb
            .build_query_as::<(i64, String)>()
            .fetch_all(&mut **tx)
            .await?;
        Ok(keys.into_iter().collect())
    }

    async fn insert_results(&mut self, rows: &[ResultRow], at: NaiveDateTime) -> BridgeResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut qb = QueryBuilder::<MySql>::new(RESULT_COLUMNS);
        push_result_values(&mut qb, rows, at);

        let tx = self.tx()?;
        qb.build().execute(&mut **tx).await?;
        Ok(())
    }

    async fn update_results(&mut self, rows: &[ResultRow], at: NaiveDateTime) -> BridgeResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut qb = update_results_query(rows, at);
        let tx = self.tx()?;
        qb.build().execute(&mut **tx).await?;
        Ok(())
    }

    async fn flag_results_available(
        &mut self,
        kode_transaksi: &str,
        at: NaiveDateTime,
    ) -> BridgeResult<()> {
        let tx = self.tx()?;
        sqlx::query("UPDATE t_lab_register SET is_lis_hasil = 1, update_at = ? WHERE kode_transaksi = ?")
            .bind(at)
            .bind(kode_transaksi)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn complete_executions(
        &mut self,
        execution_ids: &[i64],
        completion: &ExecutionCompletion,
    ) -> BridgeResult<()> {
        if execution_ids.is_empty() {
            return Ok(());
        }

        let mut qb = QueryBuilder::<MySql>::new("UPDATE t_lab_pelaksanaan SET hasil_flag = 1, hasil_at = ");
        qb.push_bind(completion.at)
            .push(", hasil_by = ")
            .push_bind(completion.actor_id)
            .push(", dokter_flag = 1, dokter_at = ")
            .push_bind(completion.at)
            .push(", dokter_by = ")
            .push_bind(completion.actor_id)
            .push(", status = ")
            .push_bind(EXECUTION_STATUS_COMPLETED)
            .push(", update_at = ")
            .push_bind(completion.at)
            .push(", updated_by = ")
            .push_bind(completion.actor_id)
            .push(" WHERE id IN (");
        let mut ids = qb.separated(", ");
        for id in execution_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");

        let tx = self.tx()?;
        qb.build().execute(&mut **tx).await?;
        Ok(())
    }

    async fn commit(&mut self) -> BridgeResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| BridgeError::Storage("transaction already finished".into()))?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> BridgeResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

/// Audit records in the bridge's own `api_logs` table.
#[derive(Clone)]
pub struct MySqlAuditSink {
    pool: MySqlPool,
}

impl MySqlAuditSink {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for MySqlAuditSink {
    async fn open(&self, entry: &AuditEntry) -> BridgeResult<AuditId> {
        let now = chrono::Local::now().naive_local();
        let result = sqlx::query(
            "INSERT INTO api_logs \
             (service_name, method, endpoint, payload, status, ip_address, user_agent, request_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?)",
        )
        .bind(&entry.service_name)
        .bind(&entry.method)
        .bind(&entry.endpoint)
        .bind(Json(&entry.payload))
        .bind(entry.ip_address.as_deref())
        .bind(entry.user_agent.as_deref())
        .bind(&entry.request_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(AuditId(result.last_insert_id()))
    }

    async fn close(&self, id: AuditId, outcome: &AuditOutcome) -> BridgeResult<()> {
        let now = chrono::Local::now().naive_local();
        sqlx::query(
            "UPDATE api_logs SET status_code = ?, status = ?, response = ?, error_message = ?, \
             response_time = ?, updated_at = ? WHERE id = ?",
        )
        .bind(outcome.status_code)
        .bind(outcome.status.as_str())
        .bind(outcome.response.as_ref().map(Json))
        .bind(outcome.error_message.as_deref())
        .bind(outcome.response_time_ms)
        .bind(now)
        .bind(id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
