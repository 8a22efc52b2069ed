//! Request audit trail.
//!
//! Every inbound call gets one audit record: opened when the request arrives and closed with
//! the outcome. Audit writes never fail the request they describe; sink errors are logged and
//! dropped.

use crate::BridgeResult;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Identifier a sink assigns to an opened record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AuditId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditStatus {
    Pending,
    Success,
    Error,
}

impl AuditStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Success => "success",
            AuditStatus::Error => "error",
        }
    }
}

/// Caller details captured at the edge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub method: String,
    pub endpoint: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AuditEntry {
    pub service_name: String,
    pub method: String,
    pub endpoint: String,
    pub payload: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AuditOutcome {
    pub status_code: u16,
    pub status: AuditStatus,
    pub response: Option<Value>,
    pub error_message: Option<String>,
    pub response_time_ms: f64,
}

/// Destination of audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn open(&self, entry: &AuditEntry) -> BridgeResult<AuditId>;

    async fn close(&self, id: AuditId, outcome: &AuditOutcome) -> BridgeResult<()>;
}

/// Sink that only emits tracing events. Used when no audit database is configured.
#[derive(Clone, Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn open(&self, entry: &AuditEntry) -> BridgeResult<AuditId> {
        tracing::info!(
            service = %entry.service_name,
            method = %entry.method,
            endpoint = %entry.endpoint,
            request_id = %entry.request_id,
            "audit: request received"
        );
        Ok(AuditId(0))
    }

    async fn close(&self, _id: AuditId, outcome: &AuditOutcome) -> BridgeResult<()> {
        tracing::info!(
            status_code = outcome.status_code,
            status = outcome.status.as_str(),
            response_time_ms = outcome.response_time_ms,
            error = outcome.error_message.as_deref().unwrap_or(""),
            "audit: request finished"
        );
        Ok(())
    }
}

/// An audit record opened for one request.
#[derive(Debug)]
pub struct AuditTrail {
    id: Option<AuditId>,
    request_id: String,
    started: Instant,
}

impl AuditTrail {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

/// Fire-and-forget front for an [`AuditSink`].
#[derive(Clone)]
pub struct Auditor {
    sink: Arc<dyn AuditSink>,
}

impl Auditor {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub async fn open(&self, service_name: &str, meta: &RequestMeta, payload: Value) -> AuditTrail {
        let request_id = uuid::Uuid::new_v4().to_string();
        let entry = AuditEntry {
            service_name: service_name.to_string(),
            method: meta.method.clone(),
            endpoint: meta.endpoint.clone(),
            payload,
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
            request_id: request_id.clone(),
        };

        let id = match self.sink.open(&entry).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(request_id = %request_id, "failed to open audit record: {e}");
                None
            }
        };

        AuditTrail {
            id,
            request_id,
            started: Instant::now(),
        }
    }

    /// Close `trail`. Status is `success` for codes below 400 without an error message.
    pub async fn close(
        &self,
        trail: AuditTrail,
        status_code: u16,
        response: Option<Value>,
        error_message: Option<String>,
    ) {
        let Some(id) = trail.id else {
            return;
        };

        let status = if status_code < 400 && error_message.is_none() {
            AuditStatus::Success
        } else {
            AuditStatus::Error
        };
        let outcome = AuditOutcome {
            status_code,
            status,
            response,
            error_message,
            response_time_ms: trail.started.elapsed().as_secs_f64() * 1000.0,
        };

        if let Err(e) = self.sink.close(id, &outcome).await {
            tracing::warn!(request_id = %trail.request_id, "failed to close audit record: {e}");
        }
    }
}
