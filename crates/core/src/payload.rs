//! Payload Builder: HIS records to the LIS wire format.
//!
//! Each payload has three blocks: MSH (sender credentials), PID (patient) and OBR (order or
//! control data). Every field is truncated to its wire length and never null. A single record
//! is sent as a bare object, several as an array; at most `batch_limit` records go out per call.

use crate::config::BridgeConfig;
use crate::constants::{
    field_len, BIRTH_DATE_FORMAT, DEFAULT_EMAIL, DEFAULT_ID, DEFAULT_PHONE, ORDER_DATE_FORMAT,
    PROVIDER_ID_WIDTH,
};
use crate::normalize::{format_date, pad_left, split_test_list, truncate, with_default, yes_no};
use crate::records::{OrderRecord, PatientRecord};
use crate::status_control::StatusControl;
use serde::Serialize;

/// Sender header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MshBlock {
    pub product: String,
    pub version: String,
    pub user_id: String,
    pub key: String,
}

/// Patient data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PidBlock {
    pub pmrn: String,
    pub pname: String,
    pub sex: String,
    pub birth_dt: String,
    pub address: String,
    pub no_tlp: String,
    pub no_hp: String,
    pub email: String,
    pub nik: String,
}

/// Order data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderObr {
    pub order_control: String,
    pub ptype: String,
    pub reg_no: String,
    pub order_lab: String,
    pub provider_id: String,
    pub provider_name: String,
    pub order_date: String,
    pub clinician_id: String,
    pub clinician_name: String,
    pub bangsal_id: String,
    pub bangsal_name: String,
    pub bed_id: String,
    pub bed_name: String,
    pub class_id: String,
    pub class_name: String,
    pub cito: String,
    pub med_legal: String,
    pub user_id: String,
    pub reserve1: String,
    pub reserve2: String,
    pub reserve3: String,
    pub reserve4: String,
    pub order_test: Vec<String>,
}

/// Control data of a standalone patient update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PatientObr {
    pub order_control: String,
    pub user_id: String,
    pub reserve1: String,
    pub reserve2: String,
    pub reserve3: String,
    pub reserve4: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderMessage {
    pub msh: MshBlock,
    pub pid: PidBlock,
    pub obr: OrderObr,
}

/// `{"order": {...}}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderPayload {
    pub order: OrderMessage,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PatientMessage {
    pub msh: MshBlock,
    pub pid: PidBlock,
    pub obr: PatientObr,
}

/// `{"pasien": {...}}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PatientPayload {
    pub pasien: PatientMessage,
}

/// One payload as a bare object, more than one as an array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PayloadBatch<T> {
    Single(T),
    Many(Vec<T>),
}

impl<T> PayloadBatch<T> {
    fn from_vec(mut items: Vec<T>) -> Self {
        if items.len() == 1 {
            if let Some(item) = items.pop() {
                return PayloadBatch::Single(item);
            }
        }
        PayloadBatch::Many(items)
    }

    pub fn len(&self) -> usize {
        match self {
            PayloadBatch::Single(_) => 1,
            PayloadBatch::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            PayloadBatch::Single(item) => std::slice::from_ref(item).iter(),
            PayloadBatch::Many(items) => items.iter(),
        }
    }
}

/// Status codes chosen by the caller of `POST /order`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderParams {
    pub order_control: StatusControl,
    pub patient_type: StatusControl,
    pub med_legal: StatusControl,
}

/// Status codes chosen by the caller of `POST /pasien`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatientParams {
    pub order_control: StatusControl,
}

fn reserve() -> String {
    truncate(Some(""), field_len::RESERVE)
}

fn id_or_default(value: Option<&str>, max_len: usize) -> String {
    truncate(Some(with_default(value, DEFAULT_ID)), max_len)
}

pub fn build_pid(patient: &PatientRecord) -> PidBlock {
    PidBlock {
        pmrn: truncate(patient.no_rm.as_deref(), field_len::PMRN),
        pname: truncate(patient.nama.as_deref(), field_len::PNAME),
        sex: truncate(Some(&patient.sex), field_len::SEX),
        birth_dt: truncate(
            format_date(patient.tanggal_lahir.as_deref(), BIRTH_DATE_FORMAT),
            field_len::BIRTH_DT,
        ),
        address: truncate(patient.alamat.as_deref(), field_len::ADDRESS),
        no_tlp: truncate(
            Some(with_default(patient.no_telepon_1.as_deref(), DEFAULT_PHONE)),
            field_len::NO_TLP,
        ),
        no_hp: truncate(
            Some(with_default(patient.no_telepon_2.as_deref(), DEFAULT_PHONE)),
            field_len::NO_HP,
        ),
        email: truncate(
            Some(with_default(patient.email.as_deref(), DEFAULT_EMAIL)),
            field_len::EMAIL,
        ),
        nik: truncate(patient.no_identitas.as_deref(), field_len::NIK),
    }
}

pub fn build_order_obr(record: &OrderRecord, params: &OrderParams) -> OrderObr {
    let provider_id = pad_left(
        &with_default(record.provider_id.as_deref(), DEFAULT_ID),
        PROVIDER_ID_WIDTH,
        '0',
    );

    OrderObr {
        order_control: truncate(Some(params.order_control.code()), field_len::ORDER_CONTROL),
        ptype: truncate(Some(params.patient_type.code()), field_len::PTYPE),
        reg_no: truncate(record.reg_no.as_deref(), field_len::REG_NO),
        order_lab: truncate(Some(&record.kode_transaksi), field_len::ORDER_LAB),
        provider_id: truncate(Some(provider_id), field_len::PROVIDER_ID),
        provider_name: truncate(record.provider_name.as_deref(), field_len::PROVIDER_NAME),
        order_date: truncate(
            format_date(record.order_date.as_deref(), ORDER_DATE_FORMAT),
            field_len::ORDER_DATE,
        ),
        clinician_id: id_or_default(record.clinician_id.as_deref(), field_len::CLINICIAN_ID),
        clinician_name: truncate(record.clinician_name.as_deref(), field_len::CLINICIAN_NAME),
        bangsal_id: id_or_default(record.bangsal_id.as_deref(), field_len::BANGSAL_ID),
        bangsal_name: truncate(record.bangsal_name.as_deref(), field_len::BANGSAL_NAME),
        bed_id: id_or_default(record.bed_id.as_deref(), field_len::BED_ID),
        bed_name: truncate(record.bed_name.as_deref(), field_len::BED_NAME),
        class_id: id_or_default(record.class_id.as_deref(), field_len::CLASS_ID),
        class_name: truncate(record.class_name.as_deref(), field_len::CLASS_NAME),
        cito: truncate(Some(yes_no(record.cito)), field_len::CITO),
        med_legal: truncate(Some(params.med_legal.code()), field_len::MED_LEGAL),
        user_id: id_or_default(record.created_by.as_deref(), field_len::USER_ID_OBR),
        reserve1: reserve(),
        reserve2: reserve(),
        reserve3: reserve(),
        reserve4: reserve(),
        order_test: split_test_list(record.order_test.as_deref(), field_len::ORDER_TEST),
    }
}

pub fn build_patient_obr(patient: &PatientRecord, params: &PatientParams) -> PatientObr {
    PatientObr {
        order_control: truncate(Some(params.order_control.code()), field_len::ORDER_CONTROL),
        user_id: id_or_default(patient.created_by.as_deref(), field_len::USER_ID_OBR),
        reserve1: reserve(),
        reserve2: reserve(),
        reserve3: reserve(),
        reserve4: reserve(),
    }
}

/// Builds payloads with a sender header computed once from configuration.
#[derive(Clone, Debug)]
pub struct PayloadBuilder {
    msh: MshBlock,
    batch_limit: usize,
}

impl PayloadBuilder {
    pub fn new(config: &BridgeConfig) -> Self {
        let lis = config.lis();
        Self {
            msh: MshBlock {
                product: truncate(Some(&lis.product_name), field_len::PRODUCT),
                version: truncate(Some(&lis.version), field_len::VERSION),
                user_id: truncate(Some(&lis.user_id), field_len::USER_ID),
                key: truncate(Some(&lis.secret_key), field_len::KEY),
            },
            batch_limit: config.limits().batch_limit,
        }
    }

    pub fn msh(&self) -> &MshBlock {
        &self.msh
    }

    pub fn build_orders(
        &self,
        records: &[OrderRecord],
        params: &OrderParams,
    ) -> PayloadBatch<OrderPayload> {
        if records.len() > self.batch_limit {
            tracing::warn!(
                rows = records.len(),
                limit = self.batch_limit,
                "order batch truncated"
            );
        }

        PayloadBatch::from_vec(
            records
                .iter()
                .take(self.batch_limit)
                .map(|record| OrderPayload {
                    order: OrderMessage {
                        msh: self.msh.clone(),
                        pid: build_pid(&record.patient),
                        obr: build_order_obr(record, params),
                    },
                })
                .collect(),
        )
    }

    pub fn build_patients(
        &self,
        patients: &[PatientRecord],
        params: &PatientParams,
    ) -> PayloadBatch<PatientPayload> {
        if patients.len() > self.batch_limit {
            tracing::warn!(
                rows = patients.len(),
                limit = self.batch_limit,
                "patient batch truncated"
            );
        }

        PayloadBatch::from_vec(
            patients
                .iter()
                .take(self.batch_limit)
                .map(|patient| PatientPayload {
                    pasien: PatientMessage {
                        msh: self.msh.clone(),
                        pid: build_pid(patient),
                        obr: build_patient_obr(patient, params),
                    },
                })
                .collect(),
        )
    }
}
