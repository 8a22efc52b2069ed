//! Typed HIS records and their assembly from raw rows.

use crate::normalize::gender_code;
use crate::repositories::his::{ClassRef, OrderRow, PatientRow, RegisteredTest};
use std::collections::HashMap;

/// Patient demographics as needed for the PID block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatientRecord {
    pub no_rm: Option<String>,
    pub nama: Option<String>,
    /// Wire sex code: `L`, `P` or `-`.
    pub sex: String,
    pub tanggal_lahir: Option<String>,
    pub alamat: Option<String>,
    pub no_telepon_1: Option<String>,
    pub no_telepon_2: Option<String>,
    pub email: Option<String>,
    pub no_identitas: Option<String>,
    /// HIS user that created the patient.
    pub created_by: Option<String>,
}

/// One lab order ready for payload building.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderRecord {
    pub register_id: i64,
    pub kode_transaksi: String,
    pub reg_no: Option<String>,
    pub patient: PatientRecord,
    pub provider_id: Option<String>,
    pub provider_name: Option<String>,
    pub clinician_id: Option<String>,
    pub clinician_name: Option<String>,
    pub bangsal_id: Option<String>,
    pub bangsal_name: Option<String>,
    pub bed_id: Option<String>,
    pub bed_name: Option<String>,
    pub class_id: Option<String>,
    pub class_name: Option<String>,
    pub cito: bool,
    pub order_date: Option<String>,
    pub created_by: Option<String>,
    /// Comma-joined codes of the non-cancelled examinations.
    pub order_test: Option<String>,
}

/// Join the codes of non-cancelled tests per registration, keeping first-seen order.
pub fn active_tests_by_registration(tests: &[RegisteredTest]) -> HashMap<i64, String> {
    let mut grouped: HashMap<i64, Vec<&str>> = HashMap::new();
    for test in tests.iter().filter(|t| !t.is_cancelled()) {
        let codes = grouped.entry(test.register_id).or_default();
        if !codes.contains(&test.kode.as_str()) {
            codes.push(&test.kode);
        }
    }

    grouped
        .into_iter()
        .map(|(id, codes)| (id, codes.join(",")))
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<PatientRow> for PatientRecord {
    fn from(row: PatientRow) -> Self {
        Self {
            no_rm: Some(row.no_rm),
            nama: row.nama,
            sex: gender_code(row.jenis_kelamin).to_string(),
            tanggal_lahir: row.tanggal_lahir,
            alamat: row.alamat,
            no_telepon_1: row.no_telepon_1,
            no_telepon_2: row.no_telepon_2,
            email: row.email,
            no_identitas: row.no_identitas,
            created_by: row.created_by,
        }
    }
}

impl OrderRecord {
    /// Assemble a record from its row.
    ///
    /// A visit without a care class takes `default_class`. `tests` comes from
    /// [`active_tests_by_registration`].
    pub fn assemble(
        row: OrderRow,
        tests: &HashMap<i64, String>,
        default_class: Option<&ClassRef>,
    ) -> Self {
        let (class_id, class_name) = match non_empty(row.kelas_id) {
            Some(id) => (Some(id), row.kelas_nama),
            None => (
                default_class.map(|c| c.id.clone()),
                default_class.and_then(|c| c.nama.clone()),
            ),
        };

        Self {
            register_id: row.register_id,
            order_test: tests.get(&row.register_id).cloned(),
            kode_transaksi: row.kode_transaksi,
            reg_no: row.reg_no,
            patient: PatientRecord {
                no_rm: row.no_rm,
                nama: row.nama,
                sex: gender_code(row.jenis_kelamin).to_string(),
                tanggal_lahir: row.tanggal_lahir,
                alamat: row.alamat,
                no_telepon_1: row.no_telepon_1,
                no_telepon_2: row.no_telepon_2,
                email: row.email,
                no_identitas: row.no_identitas,
                created_by: None,
            },
            provider_id: row.cara_bayar_id,
            provider_name: row.cara_bayar_nama,
            clinician_id: row.dokter_id,
            clinician_name: row.dokter_nama,
            bangsal_id: row.layanan_id,
            bangsal_name: row.layanan_nama,
            bed_id: row.bed_id,
            bed_name: row.bed_nama,
            class_id,
            class_name,
            cito: row.cito.unwrap_or(0) != 0,
            order_date: row.created_at,
            created_by: row.created_by,
        }
    }
}
