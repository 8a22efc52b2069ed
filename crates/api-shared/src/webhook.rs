//! LIS result callback wire model.
//!
//! The LIS posts `{"response": {"code", "sampel": {"order_lab", "lis_sampel", "result_test": [..]}}}`.
//! Result values arrive as strings or bare numbers depending on the analyser, so the scalar
//! fields are read leniently.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WebhookReq {
    pub response: WebhookResponse,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WebhookResponse {
    /// `"200"` when the LIS reports a finished sample; bare numbers are accepted.
    #[serde(deserialize_with = "lenient_string")]
    pub code: String,
    pub sampel: Option<WebhookSample>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WebhookSample {
    /// HIS transaction code the results belong to.
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub order_lab: Option<String>,
    /// LIS sample id, echoed back as the acknowledgement id.
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub lis_sampel: Option<String>,
    pub result_test: Option<Vec<WebhookResultTest>>,
}

/// One result line reported by the LIS.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WebhookResultTest {
    /// Test package code (examination code on the HIS side).
    #[serde(deserialize_with = "lenient_string")]
    pub kode_paket: String,
    /// Test item code.
    #[serde(deserialize_with = "lenient_string")]
    pub test_id: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub jenis_hasil: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub hasil: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub satuan: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub nilai_normal: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub flag: Option<String>,
}

fn scalar_to_string<E: de::Error>(value: Value) -> Result<Option<String>, E> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(E::custom(format!("expected a scalar value, got {other}"))),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    scalar_to_string(Value::deserialize(deserializer)?)?
        .ok_or_else(|| de::Error::custom("value must not be null"))
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    scalar_to_string(Value::deserialize(deserializer)?)
}
