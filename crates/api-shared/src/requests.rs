//! Inbound request bodies and query strings.
//!
//! Every field is optional at this layer so that missing or mistyped fields surface as
//! field-level validation messages (HTTP 422) instead of extractor rejections. Typed
//! commands are produced by `bridge_core::validation`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// `POST /order`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderReq {
    /// Order control name, e.g. `PASIEN_BARU_MASUK`.
    pub order_control: Option<String>,
    /// Patient type name, e.g. `STATUS_PASIEN_RAWAT_INAP`.
    pub status_pasien: Option<String>,
    /// One transaction code or an array of them.
    #[schema(value_type = Object)]
    pub kode_transaksi: Option<serde_json::Value>,
    /// Medico-legal name, `MEDLEGAL_YA` or `MEDLEGAL_TIDAK` (default).
    pub med_legal: Option<String>,
}

/// `POST /pasien`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PasienReq {
    pub order_control: Option<String>,
    /// Medical record number, 4 to 15 digits.
    #[schema(value_type = String)]
    pub no_rm: Option<serde_json::Value>,
}

/// `GET /result/no_order`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResultByLabQuery {
    pub no_lab: Option<String>,
}

/// `GET /result/periode`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResultPeriodQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// `GET /result/mrn_periode`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResultMrnPeriodQuery {
    pub no_rm: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// One entry of the `GET /result` route listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResultRouteInfo {
    pub description: String,
    pub method: String,
    pub endpoint: String,
    pub params: std::collections::BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResultInfoRes {
    pub message: String,
    pub routes: Vec<ResultRouteInfo>,
}
