//! Constants used throughout the bridge core crate.
//!
//! Wire field lengths, sentinel defaults and LIS endpoint paths live here so that the
//! payload builder, the reconciler and their tests agree on a single set of values.

/// Maximum byte length of each wire field sent to the LIS.
pub mod field_len {
    // MSH header
    pub const PRODUCT: usize = 15;
    pub const VERSION: usize = 15;
    pub const USER_ID: usize = 15;
    pub const KEY: usize = 15;

    // PID (patient data)
    pub const PMRN: usize = 15;
    pub const PNAME: usize = 100;
    pub const SEX: usize = 1;
    pub const BIRTH_DT: usize = 10;
    pub const ADDRESS: usize = 100;
    pub const NO_TLP: usize = 25;
    pub const NO_HP: usize = 25;
    pub const EMAIL: usize = 25;
    pub const NIK: usize = 25;

    // OBR (order data)
    pub const ORDER_CONTROL: usize = 2;
    pub const PTYPE: usize = 2;
    pub const REG_NO: usize = 15;
    pub const ORDER_LAB: usize = 15;
    pub const PROVIDER_ID: usize = 15;
    pub const PROVIDER_NAME: usize = 50;
    pub const ORDER_DATE: usize = 19;
    pub const CLINICIAN_ID: usize = 15;
    pub const CLINICIAN_NAME: usize = 100;
    pub const BANGSAL_ID: usize = 15;
    pub const BANGSAL_NAME: usize = 100;
    pub const BED_ID: usize = 10;
    pub const BED_NAME: usize = 20;
    pub const CLASS_ID: usize = 10;
    pub const CLASS_NAME: usize = 15;
    pub const CITO: usize = 1;
    pub const MED_LEGAL: usize = 1;
    pub const USER_ID_OBR: usize = 30;
    pub const RESERVE: usize = 100;

    /// Each entry of `order_test`.
    pub const ORDER_TEST: usize = 20;
}

/// Sentinel for empty phone numbers.
pub const DEFAULT_PHONE: &str = "000000000";

/// Sentinel for empty e-mail addresses.
pub const DEFAULT_EMAIL: &str = "none@mail.com";

/// Sentinel for empty numeric-ish identifiers.
pub const DEFAULT_ID: &str = "000";

/// Width that payer identifiers are left-padded to.
pub const PROVIDER_ID_WIDTH: usize = 3;

/// Wire format of `birth_dt`, e.g. `24.04.1992`.
pub const BIRTH_DATE_FORMAT: &str = "%d.%m.%Y";

/// Wire format of `order_date`, e.g. `30.07.2025 15:24:11`.
pub const ORDER_DATE_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Date format of result query parameters.
pub const QUERY_DATE_FORMAT: &str = "%Y-%m-%d";

/// LIS endpoint receiving lab orders.
pub const LIS_ORDER_ENDPOINT: &str = "bridging/order";

/// LIS endpoint receiving standalone patient updates.
pub const LIS_PATIENT_ENDPOINT: &str = "bridging/other_pas";

pub const LIS_RESULT_BY_LAB_ENDPOINT: &str = "bridging/result";
pub const LIS_RESULT_PERIOD_ENDPOINT: &str = "bridging/result_allperiode";
pub const LIS_RESULT_MRN_PERIOD_ENDPOINT: &str = "bridging/result_mikroperiode";

/// Default number of rows transformed per call.
pub const DEFAULT_BATCH_LIMIT: usize = 100;

/// Default number of result rows per batched update statement.
pub const DEFAULT_UPDATE_CHUNK_SIZE: usize = 50;

/// Default maximum span, in days, of a result query window.
pub const DEFAULT_MAX_PERIOD_DAYS: i64 = 30;

/// Default HIS user stamped on executions completed by the LIS.
pub const DEFAULT_SYSTEM_USER_ID: i64 = 2;

/// `t_lab_pelaksanaan.status` value for a finished execution.
pub const EXECUTION_STATUS_COMPLETED: i32 = 3;

/// Separator of composite lookup keys (`package||item`).
pub const LOOKUP_KEY_SEPARATOR: &str = "||";

/// `sys_options.option_name` holding the default outpatient class.
pub const DEFAULT_CLASS_OPTION: &str = "default_kelas_rawat_jalan";

/// Audit service names.
pub const AUDIT_SERVICE_ORDER: &str = "LIS_ORDER";
pub const AUDIT_SERVICE_PATIENT: &str = "LIS_PATIENT";
pub const AUDIT_SERVICE_RESULT: &str = "LIS_RESULT";
pub const AUDIT_SERVICE_WEBHOOK: &str = "LIS_WEBHOOK_ORDER";
