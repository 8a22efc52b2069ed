//! Bridge operations exposed to the API layer.
//!
//! Each operation opens an audit record, does its work and closes the record with the
//! outcome. Relaying follows one rule: a reachable LIS has its status and body passed back
//! unchanged, except that a 2xx carrying an embedded non-200 `response.code` is surfaced as
//! that client error.

use crate::audit::{AuditSink, Auditor, RequestMeta};
use crate::config::BridgeConfig;
use crate::constants::{
    AUDIT_SERVICE_ORDER, AUDIT_SERVICE_PATIENT, AUDIT_SERVICE_RESULT, AUDIT_SERVICE_WEBHOOK,
    LIS_ORDER_ENDPOINT, LIS_PATIENT_ENDPOINT, LIS_RESULT_BY_LAB_ENDPOINT,
    LIS_RESULT_MRN_PERIOD_ENDPOINT, LIS_RESULT_PERIOD_ENDPOINT, QUERY_DATE_FORMAT,
};
use crate::delivery::{DeliveryClient, DeliveryOutcome};
use crate::fetcher::RecordFetcher;
use crate::payload::{OrderPayload, PatientPayload, PayloadBatch, PayloadBuilder};
use crate::repositories::his::{HisSource, ResultStore};
use crate::validation::{OrderCommand, PatientCommand, ResultQuery};
use crate::webhook::{CallbackReport, WebhookReconciler};
use crate::{BridgeError, BridgeResult};
use api_shared::ResponseEnvelope;
use reqwest::{Method, Url};
use serde_json::Value;
use std::sync::Arc;

/// Body relayed back to the HIS caller.
#[derive(Clone, Debug, PartialEq)]
pub enum RelayBody {
    Json(Value),
    /// Non-JSON LIS body, sent with a JSON content type.
    Raw(String),
    Envelope(ResponseEnvelope),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelayReply {
    pub status: u16,
    pub body: RelayBody,
}

impl RelayReply {
    fn audit_body(&self) -> Value {
        match &self.body {
            RelayBody::Json(json) => json.clone(),
            RelayBody::Raw(raw) => Value::String(raw.clone()),
            RelayBody::Envelope(envelope) => {
                serde_json::to_value(envelope).unwrap_or(Value::Null)
            }
        }
    }
}

/// The `response.code` a LIS body embeds, if any.
fn embedded_code(data: Option<&Value>) -> Option<String> {
    match data?.get("response")?.get("code")? {
        Value::String(code) => Some(code.trim().to_string()),
        Value::Number(code) => Some(code.to_string()),
        _ => None,
    }
}

/// Map a delivery outcome to the reply sent to the HIS caller.
pub fn relay(outcome: &DeliveryOutcome) -> RelayReply {
    if !outcome.success {
        return RelayReply {
            status: outcome.status,
            body: RelayBody::Envelope(ResponseEnvelope::failure(
                outcome.status,
                outcome.error.as_deref(),
            )),
        };
    }

    let mut status = outcome.status;
    if outcome.is_2xx() {
        if let Some(code) = embedded_code(outcome.data.as_ref()).filter(|c| c != "200") {
            status = code
                .parse::<u16>()
                .ok()
                .filter(|c| (400..500).contains(c))
                .unwrap_or(400);
        }
    }

    let body = match (&outcome.data, &outcome.body) {
        (Some(data @ (Value::Object(_) | Value::Array(_))), _) => RelayBody::Json(data.clone()),
        (_, Some(raw)) => RelayBody::Raw(raw.clone()),
        (Some(data), None) => RelayBody::Json(data.clone()),
        (None, None) => RelayBody::Raw(String::new()),
    };

    RelayReply { status, body }
}

/// LIS URL of a result query.
///
/// Every caller-supplied value is pushed as its own percent-encoded path segment, so it can
/// never reach another LIS endpoint.
pub fn result_url(query: &ResultQuery, config: &BridgeConfig) -> BridgeResult<Url> {
    let lis = config.lis();
    let date = |d: &chrono::NaiveDate| d.format(QUERY_DATE_FORMAT).to_string();

    let (endpoint, params) = match query {
        ResultQuery::ByLab { no_lab } => (LIS_RESULT_BY_LAB_ENDPOINT, vec![no_lab.clone()]),
        ResultQuery::Period { start, end } => {
            (LIS_RESULT_PERIOD_ENDPOINT, vec![date(start), date(end)])
        }
        ResultQuery::MrnPeriod { no_rm, start, end } => (
            LIS_RESULT_MRN_PERIOD_ENDPOINT,
            vec![no_rm.clone(), date(start), date(end)],
        ),
    };

    let mut url = Url::parse(&config.lis_url(""))
        .map_err(|e| BridgeError::InvalidConfig(format!("LIS_BASE_URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| BridgeError::InvalidConfig("LIS_BASE_URL cannot take a path".into()))?
        .pop_if_empty()
        .extend(endpoint.split('/'))
        .push(&lis.user_id)
        .push(&lis.secret_key)
        .extend(&params);
    Ok(url)
}

#[derive(Clone)]
pub struct BridgeService {
    config: Arc<BridgeConfig>,
    fetcher: RecordFetcher,
    builder: PayloadBuilder,
    delivery: DeliveryClient,
    reconciler: WebhookReconciler,
    auditor: Auditor,
}

impl BridgeService {
    pub fn new(
        config: Arc<BridgeConfig>,
        his: Arc<dyn HisSource>,
        results: Arc<dyn ResultStore>,
        audit: Arc<dyn AuditSink>,
    ) -> BridgeResult<Self> {
        Ok(Self {
            fetcher: RecordFetcher::new(his),
            builder: PayloadBuilder::new(&config),
            delivery: DeliveryClient::new(config.clone())?,
            reconciler: WebhookReconciler::new(results, config.clone()),
            auditor: Auditor::new(audit),
            config,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Build the order payload without sending it.
    ///
    /// # Errors
    ///
    /// `BridgeError::NotFound` when no active registration matches.
    pub async fn prepare_order(&self, command: &OrderCommand) -> BridgeResult<PayloadBatch<OrderPayload>> {
        let records = self.fetcher.fetch_orders(&command.kode_transaksi).await?;
        if records.is_empty() {
            return Err(BridgeError::NotFound);
        }
        Ok(self.builder.build_orders(&records, &command.params))
    }

    /// Build the patient payload without sending it.
    pub async fn prepare_patient(
        &self,
        command: &PatientCommand,
    ) -> BridgeResult<PayloadBatch<PatientPayload>> {
        let patients = self.fetcher.fetch_patients(&command.no_rm).await?;
        if patients.is_empty() {
            return Err(BridgeError::NotFound);
        }
        Ok(self.builder.build_patients(&patients, &command.params))
    }

    /// Fetch, build and deliver an order; relay the LIS reply.
    pub async fn submit_order(
        &self,
        command: &OrderCommand,
        meta: &RequestMeta,
        request: Value,
    ) -> BridgeResult<RelayReply> {
        let trail = self.auditor.open(AUDIT_SERVICE_ORDER, meta, request).await;
        let prepared = match self.prepare_order(command).await {
            Ok(batch) => serde_json::to_value(&batch).map_err(BridgeError::from),
            Err(e) => Err(e),
        };
        self.deliver(trail, prepared, LIS_ORDER_ENDPOINT).await
    }

    /// Fetch, build and deliver a patient update; relay the LIS reply.
    pub async fn sync_patient(
        &self,
        command: &PatientCommand,
        meta: &RequestMeta,
        request: Value,
    ) -> BridgeResult<RelayReply> {
        let trail = self.auditor.open(AUDIT_SERVICE_PATIENT, meta, request).await;
        let prepared = match self.prepare_patient(command).await {
            Ok(batch) => serde_json::to_value(&batch).map_err(BridgeError::from),
            Err(e) => Err(e),
        };
        self.deliver(trail, prepared, LIS_PATIENT_ENDPOINT).await
    }

    async fn deliver(
        &self,
        trail: crate::audit::AuditTrail,
        prepared: BridgeResult<Value>,
        endpoint: &str,
    ) -> BridgeResult<RelayReply> {
        let payload = match prepared {
            Ok(payload) => payload,
            Err(BridgeError::NotFound) => {
                let envelope = ResponseEnvelope::no_data();
                self.auditor
                    .close(trail, 404, serde_json::to_value(&envelope).ok(), None)
                    .await;
                return Err(BridgeError::NotFound);
            }
            Err(e) => {
                self.auditor.close(trail, 500, None, Some(e.to_string())).await;
                return Err(e);
            }
        };

        let outcome = self
            .delivery
            .send_to_lis(Method::POST, endpoint, Some(&payload))
            .await;
        let reply = relay(&outcome);

        tracing::info!(
            request_id = trail.request_id(),
            endpoint,
            status = reply.status,
            attempts = outcome.attempts,
            "payload delivered to LIS"
        );
        self.auditor
            .close(trail, reply.status, Some(reply.audit_body()), outcome.error.clone())
            .await;
        Ok(reply)
    }

    /// Proxy a result query to the LIS.
    ///
    /// The reply body is the serialised delivery outcome with its status.
    pub async fn query_results(&self, query: &ResultQuery, meta: &RequestMeta) -> RelayReply {
        let url = match result_url(query, &self.config) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("cannot build LIS result URL: {e}");
                return RelayReply {
                    status: 500,
                    body: RelayBody::Envelope(ResponseEnvelope::system_error()),
                };
            }
        };
        let trail = self
            .auditor
            .open(AUDIT_SERVICE_RESULT, meta, Value::String(url.path().to_string()))
            .await;

        let outcome = self
            .delivery
            .send(Method::GET, url.as_str(), None, &[], self.config.delivery())
            .await;
        let body = serde_json::to_value(&outcome).unwrap_or(Value::Null);
        let reply = RelayReply {
            status: outcome.status,
            body: RelayBody::Json(body.clone()),
        };

        self.auditor
            .close(trail, reply.status, Some(body), outcome.error.clone())
            .await;
        reply
    }

    /// Apply a LIS result callback. Always yields an envelope for an HTTP 200 reply.
    pub async fn receive_callback(&self, body: &[u8], meta: &RequestMeta) -> CallbackReport {
        let payload = serde_json::from_slice::<Value>(body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()));
        let trail = self.auditor.open(AUDIT_SERVICE_WEBHOOK, meta, payload).await;

        let report = self.reconciler.reconcile(body).await;

        self.auditor
            .close(
                trail,
                report.status_code(),
                serde_json::to_value(&report.envelope).ok(),
                report.error.clone(),
            )
            .await;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchLimits, DeliverySettings, LisSettings};
    use crate::payload::OrderParams;
    use crate::repositories::his::OrderRow;
    use crate::repositories::memory::{MemoryState, MemoryStore};
    use crate::status_control::StatusControl;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::time::Duration;

    fn config(base_url: &str) -> Arc<BridgeConfig> {
        Arc::new(
            BridgeConfig::new(
                LisSettings {
                    base_url: base_url.into(),
                    product_name: "HIS".into(),
                    version: "1".into(),
                    user_id: "bridge".into(),
                    secret_key: "s3cret".into(),
                },
                DeliverySettings {
                    timeout: Duration::from_millis(200),
                    retries: 1,
                    retry_delay: Duration::from_millis(1),
                },
                BatchLimits::default(),
                2,
            )
            .expect("config"),
        )
    }

    fn service(store: &MemoryStore, base_url: &str) -> BridgeService {
        let store = Arc::new(store.clone());
        BridgeService::new(config(base_url), store.clone(), store.clone(), store).expect("service")
    }

    fn command(codes: &[&str]) -> OrderCommand {
        OrderCommand {
            kode_transaksi: codes.iter().map(|c| c.to_string()).collect(),
            params: OrderParams {
                order_control: StatusControl::PasienBaruMasuk,
                patient_type: StatusControl::StatusPasienRawatJalan,
                med_legal: StatusControl::MedlegalTidak,
            },
        }
    }

    fn received(status: u16, body: &str) -> DeliveryOutcome {
        DeliveryOutcome {
            success: true,
            status,
            data: serde_json::from_str(body).ok().or(Some(Value::String(body.into()))),
            error: None,
            body: Some(body.into()),
            attempts: 1,
        }
    }

    #[tokio::test]
    async fn unknown_transaction_is_not_found_and_audited() {
        let store = MemoryStore::new();
        let service = service(&store, "http://127.0.0.1:9");

        let err = service
            .submit_order(&command(&["NOPE"]), &RequestMeta::default(), json!({}))
            .await
            .expect_err("no registration");
        assert!(matches!(err, BridgeError::NotFound));

        let records = store.audit_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1.as_ref().map(|o| o.status_code), Some(404));
    }

    #[tokio::test]
    async fn prepare_order_builds_from_memory() {
        let store = MemoryStore::with_state(MemoryState {
            order_rows: vec![OrderRow {
                register_id: 1,
                kode_transaksi: "LAB1".into(),
                ..OrderRow::default()
            }],
            ..MemoryState::default()
        });
        let service = service(&store, "http://127.0.0.1:9");

        let batch = service
            .prepare_order(&command(&["LAB1"]))
            .await
            .expect("payload");
        assert_eq!(batch.len(), 1);
        let json = serde_json::to_value(&batch).expect("serialise");
        assert_eq!(json["order"]["obr"]["ptype"], json!("OP"));
    }

    #[test]
    fn relays_lis_responses_unchanged() {
        let reply = relay(&received(200, r#"{"response":{"code":"200","message":"ok"}}"#));
        assert_eq!(reply.status, 200);
        assert!(matches!(reply.body, RelayBody::Json(_)));

        let reply = relay(&received(500, "gateway exploded"));
        assert_eq!(reply.status, 500);
        assert_eq!(reply.body, RelayBody::Raw("gateway exploded".into()));
    }

    #[test]
    fn embedded_error_codes_become_client_errors() {
        let reply = relay(&received(200, r#"{"response":{"code":"404","message":"no order"}}"#));
        assert_eq!(reply.status, 404);

        let reply = relay(&received(200, r#"{"response":{"code":"E01"}}"#));
        assert_eq!(reply.status, 400);

        let reply = relay(&received(200, r#"{"response":{"code":"503"}}"#));
        assert_eq!(reply.status, 400);
    }

    #[test]
    fn transport_failures_become_envelopes() {
        let outcome = DeliveryOutcome {
            success: false,
            status: 503,
            data: None,
            error: Some("Connection timeout: refused".into()),
            body: None,
            attempts: 3,
        };
        let reply = relay(&outcome);
        assert_eq!(reply.status, 503);
        assert_eq!(
            reply.body,
            RelayBody::Envelope(ResponseEnvelope::failure(503, Some("Connection timeout: refused")))
        );
    }

    #[test]
    fn result_urls_carry_credentials_and_dates() {
        let cfg = config("http://lis.example.test");
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).expect("date");
        let end = NaiveDate::from_ymd_opt(2025, 1, 30).expect("date");
        let url = |query: ResultQuery| result_url(&query, &cfg).expect("url").to_string();

        assert_eq!(
            url(ResultQuery::ByLab { no_lab: "L123".into() }),
            "http://lis.example.test/bridging/result/bridge/s3cret/L123"
        );
        assert_eq!(
            url(ResultQuery::Period { start, end }),
            "http://lis.example.test/bridging/result_allperiode/bridge/s3cret/2025-01-01/2025-01-30"
        );
        assert_eq!(
            url(ResultQuery::MrnPeriod {
                no_rm: "123456".into(),
                start,
                end
            }),
            "http://lis.example.test/bridging/result_mikroperiode/bridge/s3cret/123456/2025-01-01/2025-01-30"
        );
    }

    #[test]
    fn result_url_segments_are_encoded() {
        let cfg = config("http://lis.example.test/api/");
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).expect("date");

        let url = result_url(
            &ResultQuery::MrnPeriod {
                no_rm: "../../../order?x=#y".into(),
                start,
                end: start,
            },
            &cfg,
        )
        .expect("url");

        assert_eq!(
            url.path(),
            "/api/bridging/result_mikroperiode/bridge/s3cret/..%2F..%2F..%2Forder%3Fx=%23y/2025-01-01/2025-01-01"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }
}
