//! Record Fetcher: loads order and patient records from the HIS.

use crate::records::{active_tests_by_registration, OrderRecord, PatientRecord};
use crate::repositories::his::HisSource;
use crate::BridgeResult;
use std::sync::Arc;

#[derive(Clone)]
pub struct RecordFetcher {
    source: Arc<dyn HisSource>,
}

impl RecordFetcher {
    pub fn new(source: Arc<dyn HisSource>) -> Self {
        Self { source }
    }

    /// Active orders for the given transaction codes, in registration order.
    ///
    /// Unknown codes are skipped; an empty result is not an error here.
    pub async fn fetch_orders(&self, kode_transaksi: &[String]) -> BridgeResult<Vec<OrderRecord>> {
        let rows = self.source.fetch_order_rows(kode_transaksi).await?;
        if rows.is_empty() {
            tracing::debug!(codes = ?kode_transaksi, "no active registrations found");
            return Ok(Vec::new());
        }

        let mut register_ids: Vec<i64> = rows.iter().map(|r| r.register_id).collect();
        register_ids.dedup();
        let tests = self.source.fetch_registered_tests(&register_ids).await?;
        let tests = active_tests_by_registration(&tests);

        let needs_default_class = rows
            .iter()
            .any(|r| r.kelas_id.as_deref().map_or(true, |id| id.trim().is_empty()));
        let default_class = if needs_default_class {
            match self.source.fetch_default_class().await {
                Ok(class) => class,
                Err(e) => {
                    // The class is informational; send the order without it.
                    tracing::warn!("failed to load default care class: {e}");
                    None
                }
            }
        } else {
            None
        };

        tracing::debug!(rows = rows.len(), "fetched order rows");
        Ok(rows
            .into_iter()
            .map(|row| OrderRecord::assemble(row, &tests, default_class.as_ref()))
            .collect())
    }

    /// Patients with the given medical record number.
    pub async fn fetch_patients(&self, no_rm: &str) -> BridgeResult<Vec<PatientRecord>> {
        let rows = self.source.fetch_patient_rows(no_rm).await?;
        Ok(rows.into_iter().map(PatientRecord::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::his::{ClassRef, OrderRow, PatientRow, RegisteredTest};
    use crate::repositories::memory::{MemoryState, MemoryStore};

    fn order_row(register_id: i64, kode: &str) -> OrderRow {
        OrderRow {
            register_id,
            kode_transaksi: kode.into(),
            no_rm: Some("000123".into()),
            jenis_kelamin: Some(1),
            ..OrderRow::default()
        }
    }

    fn fetcher(state: MemoryState) -> RecordFetcher {
        RecordFetcher::new(Arc::new(MemoryStore::with_state(state)))
    }

    #[tokio::test]
    async fn fetches_orders_with_tests_and_default_class() {
        let fetcher = fetcher(MemoryState {
            order_rows: vec![order_row(2, "LAB2"), order_row(1, "LAB1"), order_row(3, "LAB3")],
            registered_tests: vec![
                RegisteredTest {
                    register_id: 1,
                    kode: "HEM01".into(),
                    batal: 0,
                },
                RegisteredTest {
                    register_id: 1,
                    kode: "GLU".into(),
                    batal: 1,
                },
            ],
            default_class: Some(ClassRef {
                id: "9".into(),
                nama: Some("RAWAT JALAN".into()),
            }),
            ..MemoryState::default()
        });

        let records = fetcher
            .fetch_orders(&["LAB1".to_string(), "LAB2".to_string(), "MISSING".to_string()])
            .await
            .expect("fetch");

        assert_eq!(
            records.iter().map(|r| r.kode_transaksi.as_str()).collect::<Vec<_>>(),
            vec!["LAB1", "LAB2"]
        );
        assert_eq!(records[0].order_test.as_deref(), Some("HEM01"));
        assert_eq!(records[0].patient.sex, "L");
        assert_eq!(records[1].class_id.as_deref(), Some("9"));
    }

    #[tokio::test]
    async fn unknown_codes_yield_nothing() {
        let records = fetcher(MemoryState::default())
            .fetch_orders(&["NOPE".to_string()])
            .await
            .expect("fetch");
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn fetches_patients_by_record_number() {
        let fetcher = fetcher(MemoryState {
            patient_rows: vec![PatientRow {
                no_rm: "123456".into(),
                nama: Some("SITI".into()),
                jenis_kelamin: Some(2),
                ..PatientRow::default()
            }],
            ..MemoryState::default()
        });

        let patients = fetcher.fetch_patients("123456").await.expect("fetch");
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].sex, "P");
        assert!(fetcher.fetch_patients("999999").await.expect("fetch").is_empty());
    }
}
