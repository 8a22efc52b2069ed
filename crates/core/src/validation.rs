//! Request validation.
//!
//! Turns the loosely-typed request DTOs from `api-shared` into typed commands. Failures are
//! collected per field, so a caller sees every problem in one 422 response and invalid input
//! never reaches the fetcher or the LIS.

use crate::constants::QUERY_DATE_FORMAT;
use crate::payload::{OrderParams, PatientParams};
use crate::status_control::{ControlKind, StatusControl};
use api_shared::requests::{
    OrderReq, PasienReq, ResultByLabQuery, ResultMrnPeriodQuery, ResultPeriodQuery,
};
use api_shared::ValidationErrorBody;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

const KODE_TRANSAKSI_MAX_LEN: usize = 32;
const NO_LAB_MAX_LEN: usize = 20;
const NO_RM_MIN_DIGITS: usize = 4;
const NO_RM_MAX_DIGITS: usize = 15;
const NO_RM_QUERY_MAX_LEN: usize = 20;

/// Field-keyed validation messages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    message: Option<String>,
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the summary message derived from the first field error.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    fn summary(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }

        let total: usize = self.errors.values().map(Vec::len).sum();
        let first = self
            .errors
            .values()
            .flatten()
            .next()
            .cloned()
            .unwrap_or_else(|| "The given data was invalid.".to_string());

        match total {
            0 | 1 => first,
            2 => format!("{first} (and 1 more error)"),
            n => format!("{first} (and {} more errors)", n - 1),
        }
    }

    pub fn to_body(&self) -> ValidationErrorBody {
        ValidationErrorBody {
            message: self.summary(),
            errors: self.errors.clone(),
        }
    }

    fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.errors {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

fn label(field: &str) -> String {
    field.replace('_', " ")
}

fn required(field: &str) -> String {
    format!("The {} field is required.", label(field))
}

fn invalid_choice(field: &str) -> String {
    format!("The selected {} is invalid.", label(field))
}

/// Validated `POST /order` body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderCommand {
    pub kode_transaksi: Vec<String>,
    pub params: OrderParams,
}

/// Validated `POST /pasien` body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientCommand {
    pub no_rm: String,
    pub params: PatientParams,
}

/// Validated result query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResultQuery {
    ByLab {
        no_lab: String,
    },
    Period {
        start: NaiveDate,
        end: NaiveDate,
    },
    MrnPeriod {
        no_rm: String,
        start: NaiveDate,
        end: NaiveDate,
    },
}

fn status_field(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
    kind: ControlKind,
) -> Option<StatusControl> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => {
            errors.add(field, required(field));
            None
        }
        Some(name) => {
            let status = StatusControl::from_name_of_kind(name, kind);
            if status.is_none() {
                errors.add(field, invalid_choice(field));
            }
            status
        }
    }
}

fn transaction_code(errors: &mut ValidationErrors, key: String, raw: &Value) -> Option<String> {
    match raw {
        Value::String(code) if code.trim().is_empty() => {
            errors.add(key, required("kode_transaksi"));
            None
        }
        Value::String(code) if code.len() > KODE_TRANSAKSI_MAX_LEN => {
            let message = format!(
                "The {} field must not be greater than {KODE_TRANSAKSI_MAX_LEN} characters.",
                label(&key)
            );
            errors.add(key, message);
            None
        }
        Value::String(code) => Some(code.trim().to_string()),
        _ => {
            let message = format!("The {} field must be a string.", label(&key));
            errors.add(key, message);
            None
        }
    }
}

fn transaction_codes(errors: &mut ValidationErrors, value: Option<&Value>) -> Vec<String> {
    const FIELD: &str = "kode_transaksi";

    match value {
        None | Some(Value::Null) => {
            errors_add_required(errors, FIELD);
            Vec::new()
        }
        Some(Value::Array(items)) if items.is_empty() => {
            errors.add(
                FIELD,
                format!("The {} field must have at least 1 items.", label(FIELD)),
            );
            Vec::new()
        }
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| transaction_code(errors, format!("{FIELD}.{index}"), item))
            .collect(),
        Some(other) => transaction_code(errors, FIELD.to_string(), other)
            .into_iter()
            .collect(),
    }
}

fn errors_add_required(errors: &mut ValidationErrors, field: &str) {
    errors.add(field, required(field));
}

/// Validate a `POST /order` body.
pub fn validate_order(req: &OrderReq) -> Result<OrderCommand, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let order_control = status_field(
        &mut errors,
        "order_control",
        req.order_control.as_deref(),
        ControlKind::OrderControl,
    );
    let patient_type = status_field(
        &mut errors,
        "status_pasien",
        req.status_pasien.as_deref(),
        ControlKind::PatientType,
    );
    let med_legal = match req.med_legal.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => Some(StatusControl::MedlegalTidak),
        Some(name) => {
            let status = StatusControl::from_name_of_kind(name, ControlKind::MedLegal);
            if status.is_none() {
                errors.add("med_legal", invalid_choice("med_legal"));
            }
            status
        }
    };
    let kode_transaksi = transaction_codes(&mut errors, req.kode_transaksi.as_ref());

    match (order_control, patient_type, med_legal) {
        (Some(order_control), Some(patient_type), Some(med_legal)) => errors.finish(|| OrderCommand {
            kode_transaksi,
            params: OrderParams {
                order_control,
                patient_type,
                med_legal,
            },
        }),
        _ => Err(errors),
    }
}

fn digits_between(errors: &mut ValidationErrors, field: &str, raw: &str) -> bool {
    let len = raw.len();
    let ok = raw.bytes().all(|b| b.is_ascii_digit())
        && (NO_RM_MIN_DIGITS..=NO_RM_MAX_DIGITS).contains(&len);
    if !ok {
        errors.add(
            field,
            format!(
                "The {} field must be between {NO_RM_MIN_DIGITS} and {NO_RM_MAX_DIGITS} digits.",
                label(field)
            ),
        );
    }
    ok
}

/// Validate a `POST /pasien` body.
pub fn validate_patient(req: &PasienReq) -> Result<PatientCommand, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let order_control = status_field(
        &mut errors,
        "order_control",
        req.order_control.as_deref(),
        ControlKind::OrderControl,
    );

    let no_rm = match req.no_rm.as_ref() {
        None | Some(Value::Null) => {
            errors_add_required(&mut errors, "no_rm");
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors_add_required(&mut errors, "no_rm");
            None
        }
        Some(Value::String(s)) => {
            let s = s.trim();
            digits_between(&mut errors, "no_rm", s).then(|| s.to_string())
        }
        Some(Value::Number(n)) => {
            let s = n.to_string();
            digits_between(&mut errors, "no_rm", &s).then_some(s)
        }
        Some(_) => {
            digits_between(&mut errors, "no_rm", "");
            None
        }
    };

    match (order_control, no_rm) {
        (Some(order_control), Some(no_rm)) => errors.finish(|| PatientCommand {
            no_rm,
            params: PatientParams { order_control },
        }),
        _ => Err(errors),
    }
}

/// A required value that becomes one segment of a LIS result path.
///
/// Separators and dot segments are refused outright; the segment is percent-encoded again
/// when the URL is built.
fn path_value(
    errors: &mut ValidationErrors,
    field: &str,
    raw: Option<&str>,
    max_len: usize,
) -> Option<String> {
    let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        errors_add_required(errors, field);
        return None;
    };

    if value.chars().count() > max_len {
        errors.add(
            field,
            format!(
                "The {} field must not be greater than {max_len} characters.",
                label(field)
            ),
        );
        return None;
    }

    if value.contains(['/', '\\', '?', '#']) || value == "." || value == ".." {
        errors.add(field, format!("The {} field format is invalid.", label(field)));
        return None;
    }

    Some(value.to_string())
}

/// Validate `GET /result/no_order`.
pub fn validate_result_by_lab(query: &ResultByLabQuery) -> Result<ResultQuery, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let no_lab = path_value(&mut errors, "no_lab", query.no_lab.as_deref(), NO_LAB_MAX_LEN);

    match no_lab {
        Some(no_lab) => errors.finish(|| ResultQuery::ByLab { no_lab }),
        None => Err(errors),
    }
}

fn query_date(errors: &mut ValidationErrors, field: &str, raw: Option<&str>) -> Option<NaiveDate> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => {
            errors_add_required(errors, field);
            None
        }
        Some(raw) => {
            let parsed = NaiveDate::parse_from_str(raw, QUERY_DATE_FORMAT).ok();
            if parsed.is_none() {
                errors.add(
                    field,
                    format!("The {} field must match the format Y-m-d.", label(field)),
                );
            }
            parsed
        }
    }
}

/// Whether the window `start..=end` spans at most `max_days` days.
pub fn period_within(start: NaiveDate, end: NaiveDate, max_days: i64) -> bool {
    (end - start).num_days() <= max_days
}

/// Validate a date window: both dates present, `end >= start`, span within `max_days`.
///
/// The span check only runs once the field rules pass. A window that is too long produces a
/// dedicated summary message alongside the `end_date` field error.
pub fn validate_window(
    start_date: Option<&str>,
    end_date: Option<&str>,
    max_days: i64,
) -> Result<(NaiveDate, NaiveDate), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let start = query_date(&mut errors, "start_date", start_date);
    let end = query_date(&mut errors, "end_date", end_date);

    let (Some(start), Some(end)) = (start, end) else {
        return Err(errors);
    };

    if end < start {
        errors.add(
            "end_date",
            "The end date field must be a date after or equal to start date.",
        );
        return Err(errors);
    }

    if !period_within(start, end, max_days) {
        errors.add("end_date", format!("Maksimal periode adalah {max_days} hari"));
        return Err(errors.with_message(format!("Periode tidak boleh lebih dari {max_days} hari")));
    }

    errors.finish(|| (start, end))
}

/// Validate `GET /result/periode`.
pub fn validate_result_period(
    query: &ResultPeriodQuery,
    max_days: i64,
) -> Result<ResultQuery, ValidationErrors> {
    let (start, end) = validate_window(
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        max_days,
    )?;
    Ok(ResultQuery::Period { start, end })
}

/// Validate `GET /result/mrn_periode`.
pub fn validate_result_mrn_period(
    query: &ResultMrnPeriodQuery,
    max_days: i64,
) -> Result<ResultQuery, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let no_rm = path_value(&mut errors, "no_rm", query.no_rm.as_deref(), NO_RM_QUERY_MAX_LEN);

    let window = validate_window(
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        max_days,
    );

    match (no_rm, window) {
        (Some(no_rm), Ok((start, end))) => errors.finish(|| ResultQuery::MrnPeriod {
            no_rm,
            start,
            end,
        }),
        (_, Ok(_)) => Err(errors),
        (_, Err(window_errors)) => {
            let message = window_errors.message.clone();
            for (field, messages) in window_errors.errors {
                for m in messages {
                    errors.add(field.clone(), m);
                }
            }
            match message {
                Some(message) if errors.errors.len() == 1 => Err(errors.with_message(message)),
                _ => Err(errors),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_req(body: Value) -> OrderReq {
        serde_json::from_value(body).expect("order request")
    }

    #[test]
    fn order_accepts_a_single_code_and_defaults_med_legal() {
        let cmd = validate_order(&order_req(json!({
            "order_control": "PASIEN_BARU_MASUK",
            "status_pasien": "STATUS_PASIEN_RAWAT_INAP",
            "kode_transaksi": "LAB250730001"
        })))
        .expect("valid order");

        assert_eq!(cmd.kode_transaksi, vec!["LAB250730001"]);
        assert_eq!(cmd.params.order_control, StatusControl::PasienBaruMasuk);
        assert_eq!(cmd.params.patient_type, StatusControl::StatusPasienRawatInap);
        assert_eq!(cmd.params.med_legal, StatusControl::MedlegalTidak);
    }

    #[test]
    fn order_accepts_a_list_of_codes() {
        let cmd = validate_order(&order_req(json!({
            "order_control": "PASIEN_PULANG",
            "status_pasien": "STATUS_PASIEN_RAWAT_JALAN",
            "kode_transaksi": ["LAB1", "LAB2"],
            "med_legal": "MEDLEGAL_YA"
        })))
        .expect("valid order");

        assert_eq!(cmd.kode_transaksi, vec!["LAB1", "LAB2"]);
        assert_eq!(cmd.params.med_legal, StatusControl::MedlegalYa);
    }

    #[test]
    fn order_collects_every_field_error() {
        let errors = validate_order(&order_req(json!({
            "order_control": "STATUS_PASIEN_RAWAT_INAP",
            "kode_transaksi": ["LAB1", 7, ""]
        })))
        .expect_err("invalid order");

        assert_eq!(
            errors.messages("order_control"),
            ["The selected order control is invalid."]
        );
        assert_eq!(
            errors.messages("status_pasien"),
            ["The status pasien field is required."]
        );
        assert!(errors.fields().any(|f| f == "kode_transaksi.1"));
        assert!(errors.fields().any(|f| f == "kode_transaksi.2"));

        let body = errors.to_body();
        assert!(body.message.contains("more errors"));
    }

    #[test]
    fn order_rejects_empty_code_list() {
        let errors = validate_order(&order_req(json!({
            "order_control": "PASIEN_BARU_MASUK",
            "status_pasien": "STATUS_PASIEN_RAWAT_INAP",
            "kode_transaksi": []
        })))
        .expect_err("empty list");
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["kode_transaksi"]);
    }

    #[test]
    fn patient_requires_a_numeric_record_number() {
        let ok = validate_patient(&PasienReq {
            order_control: Some("PASIEN_BARU_MASUK".into()),
            no_rm: Some(json!(123456)),
        })
        .expect("numeric no_rm");
        assert_eq!(ok.no_rm, "123456");

        let errors = validate_patient(&PasienReq {
            order_control: Some("PASIEN_BARU_MASUK".into()),
            no_rm: Some(json!("12a")),
        })
        .expect_err("not digits");
        assert_eq!(
            errors.messages("no_rm"),
            ["The no rm field must be between 4 and 15 digits."]
        );
    }

    #[test]
    fn period_longer_than_limit_is_rejected_on_end_date() {
        let errors = validate_result_period(
            &ResultPeriodQuery {
                start_date: Some("2025-01-01".into()),
                end_date: Some("2025-02-05".into()),
            },
            30,
        )
        .expect_err("35 day window");

        let body = errors.to_body();
        assert_eq!(body.message, "Periode tidak boleh lebih dari 30 hari");
        assert_eq!(
            body.errors.get("end_date"),
            Some(&vec!["Maksimal periode adalah 30 hari".to_string()])
        );
    }

    #[test]
    fn period_within_limit_passes() {
        let query = validate_result_period(
            &ResultPeriodQuery {
                start_date: Some("2025-01-01".into()),
                end_date: Some("2025-01-30".into()),
            },
            30,
        )
        .expect("29 day window");

        assert_eq!(
            query,
            ResultQuery::Period {
                start: NaiveDate::from_ymd_opt(2025, 1, 1).expect("date"),
                end: NaiveDate::from_ymd_opt(2025, 1, 30).expect("date"),
            }
        );
        assert!(period_within(
            NaiveDate::from_ymd_opt(2025, 1, 1).expect("date"),
            NaiveDate::from_ymd_opt(2025, 1, 31).expect("date"),
            30
        ));
    }

    #[test]
    fn end_before_start_and_bad_format_are_field_errors() {
        let errors = validate_window(Some("2025-02-01"), Some("2025-01-01"), 30)
            .expect_err("reversed window");
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["end_date"]);

        let errors =
            validate_window(Some("01/02/2025"), None, 30).expect_err("bad start, missing end");
        assert_eq!(
            errors.fields().collect::<Vec<_>>(),
            vec!["end_date", "start_date"]
        );
    }

    #[test]
    fn mrn_period_merges_window_errors() {
        let errors = validate_result_mrn_period(
            &ResultMrnPeriodQuery {
                no_rm: None,
                start_date: Some("2025-01-01".into()),
                end_date: Some("2025-03-01".into()),
            },
            30,
        )
        .expect_err("missing no_rm and long window");

        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["end_date", "no_rm"]);
    }

    #[test]
    fn no_lab_is_bounded() {
        let errors = validate_result_by_lab(&ResultByLabQuery {
            no_lab: Some("X".repeat(21)),
        })
        .expect_err("too long");
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["no_lab"]);
    }

    #[test]
    fn result_path_values_refuse_separators() {
        for hostile in ["../../../order?x=", "a/b", "L1#frag", ".."] {
            let errors = validate_result_by_lab(&ResultByLabQuery {
                no_lab: Some(hostile.into()),
            })
            .expect_err("separator in no_lab");
            assert_eq!(errors.messages("no_lab"), ["The no lab field format is invalid."]);

            let errors = validate_result_mrn_period(
                &ResultMrnPeriodQuery {
                    no_rm: Some(hostile.into()),
                    start_date: Some("2025-01-01".into()),
                    end_date: Some("2025-01-01".into()),
                },
                30,
            )
            .expect_err("separator in no_rm");
            assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["no_rm"]);
        }
    }

    #[test]
    fn mrn_period_bounds_no_rm() {
        let query = |no_rm: String| ResultMrnPeriodQuery {
            no_rm: Some(no_rm),
            start_date: Some("2025-01-01".into()),
            end_date: Some("2025-01-10".into()),
        };

        let errors = validate_result_mrn_period(&query("9".repeat(21)), 30).expect_err("too long");
        assert_eq!(
            errors.messages("no_rm"),
            ["The no rm field must not be greater than 20 characters."]
        );
        assert!(validate_result_mrn_period(&query("9".repeat(20)), 30).is_ok());
    }
}
