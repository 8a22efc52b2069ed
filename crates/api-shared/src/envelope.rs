//! Acknowledgement envelope shared with the LIS vendor.
//!
//! Every non-relayed reply (not found, transport failure, webhook acknowledgement) uses the
//! same fixed shape: `{"response": {"code", "message", "product", "version", "id"}}`. The
//! `code` is a string, not a number, and `id` is empty unless a correlation id is known.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Product name reported in every envelope.
pub const ENVELOPE_PRODUCT: &str = "SOFTMEDIX LIS";

/// Protocol version reported in every envelope.
pub const ENVELOPE_VERSION: &str = "ws.003";

pub const NO_DATA_MESSAGE: &str = "Tidak Ada Data";
pub const SUCCESS_MESSAGE: &str = "berhasil";
pub const SYSTEM_ERROR_MESSAGE: &str = "Terjadi kesalahan sistem";
pub const LIS_UNREACHABLE_MESSAGE: &str = "Gagal terhubung ke server LIS";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResponseEnvelope {
    pub response: EnvelopeBody,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EnvelopeBody {
    pub code: String,
    pub message: String,
    pub product: String,
    pub version: String,
    pub id: String,
}

impl ResponseEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            response: EnvelopeBody {
                code: code.into(),
                message: message.into(),
                product: ENVELOPE_PRODUCT.into(),
                version: ENVELOPE_VERSION.into(),
                id: id.into(),
            },
        }
    }

    /// The "no data" envelope: code `"404"`, empty id.
    pub fn no_data() -> Self {
        Self::new("404", NO_DATA_MESSAGE, "")
    }

    /// Successful acknowledgement correlated to `id`.
    pub fn success(id: impl Into<String>) -> Self {
        Self::new("200", SUCCESS_MESSAGE, id)
    }

    /// Generic failure; the caller never sees internal detail.
    pub fn system_error() -> Self {
        Self::new("500", SYSTEM_ERROR_MESSAGE, "")
    }

    /// Failure carrying an HTTP status as its code.
    pub fn failure(status: u16, message: Option<&str>) -> Self {
        Self::new(
            status.to_string(),
            message.unwrap_or(LIS_UNREACHABLE_MESSAGE),
            "",
        )
    }

    pub fn is_success(&self) -> bool {
        self.response.code == "200"
    }
}

/// Field-level validation failure body (HTTP 422).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ValidationErrorBody {
    pub message: String,
    pub errors: BTreeMap<String, Vec<String>>,
}
