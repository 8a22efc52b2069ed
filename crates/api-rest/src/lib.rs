//! # API REST
//!
//! REST API for the LIS bridge.
//!
//! Handles:
//! - HTTP endpoints with axum (`/order`, `/pasien`, `/result/*`, `/webhook/order`)
//! - API key authentication via the `x-api-key` header
//! - OpenAPI/Swagger documentation
//! - Mapping core outcomes to HTTP responses
//!
//! Uses `api-shared` for wire types and `bridge-core` for all behaviour.

#![warn(rust_2018_idioms)]

use api_shared::auth::{validate_api_key, API_KEY_HEADER};
use api_shared::requests::{
    OrderReq, PasienReq, ResultByLabQuery, ResultInfoRes, ResultMrnPeriodQuery,
    ResultPeriodQuery, ResultRouteInfo,
};
use api_shared::webhook::{WebhookReq, WebhookResponse, WebhookResultTest, WebhookSample};
use api_shared::{
    EnvelopeBody, HealthRes, HealthService, ResponseEnvelope, ValidationErrorBody,
};
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bridge_core::audit::RequestMeta;
use bridge_core::validation::{
    validate_order, validate_patient, validate_result_by_lab, validate_result_mrn_period,
    validate_result_period, ValidationErrors,
};
use bridge_core::{BridgeError, BridgeService, RelayBody, RelayReply};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    service: Arc<BridgeService>,
    api_key: Option<Arc<str>>,
}

impl AppState {
    /// `api_key` of `None` disables authentication.
    pub fn new(service: Arc<BridgeService>, api_key: Option<String>) -> Self {
        Self {
            service,
            api_key: api_key.map(Arc::from),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        submit_order,
        sync_patient,
        result_info,
        result_by_lab,
        result_period,
        result_mrn_period,
        webhook_order,
    ),
    components(schemas(
        HealthRes,
        OrderReq,
        PasienReq,
        ResponseEnvelope,
        EnvelopeBody,
        ValidationErrorBody,
        ResultInfoRes,
        ResultRouteInfo,
        WebhookReq,
        WebhookResponse,
        WebhookSample,
        WebhookResultTest,
    ))
)]
pub struct ApiDoc;

/// Build the application router.
///
/// `/health` and the API docs are public; every other route requires the API key when one
/// is configured.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/order", post(submit_order))
        .route("/pasien", post(sync_patient))
        .route("/result", get(result_info))
        .route("/result/no_order", get(result_by_lab))
        .route("/result/periode", get(result_period))
        .route("/result/mrn_periode", get(result_mrn_period))
        .route("/webhook/order", post(webhook_order))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match validate_api_key(provided, expected) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::warn!(path = %request.uri().path(), "rejected request: {e}");
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn request_meta(method: &Method, uri: &Uri, headers: &HeaderMap) -> RequestMeta {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    RequestMeta {
        method: method.to_string(),
        endpoint: uri.path().to_string(),
        ip_address: header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| header("x-real-ip")),
        user_agent: header(header::USER_AGENT.as_str()),
    }
}

fn validation_response(errors: &ValidationErrors) -> Response {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(errors.to_body())).into_response()
}

fn malformed_body(rejection: JsonRejection) -> Response {
    let message = rejection.body_text();
    let body = ValidationErrorBody {
        message: message.clone(),
        errors: BTreeMap::from([("body".to_string(), vec![message])]),
    };
    (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
}

fn relay_response(reply: RelayReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    match reply.body {
        RelayBody::Json(json) => (status, Json(json)).into_response(),
        RelayBody::Envelope(envelope) => (status, Json(envelope)).into_response(),
        RelayBody::Raw(raw) => {
            (status, [(header::CONTENT_TYPE, "application/json")], raw).into_response()
        }
    }
}

fn error_response(err: BridgeError) -> Response {
    match err {
        BridgeError::NotFound => {
            (StatusCode::NOT_FOUND, Json(ResponseEnvelope::no_data())).into_response()
        }
        BridgeError::Validation(errors) => validation_response(&errors),
        other => {
            tracing::error!("request failed: {other}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ResponseEnvelope::system_error()),
            )
                .into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for load balancers and monitoring.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/order",
    request_body = OrderReq,
    responses(
        (status = 200, description = "LIS reply relayed unchanged"),
        (status = 401, description = "Missing or invalid API key"),
        (status = 404, description = "No active registration", body = ResponseEnvelope),
        (status = 422, description = "Validation failed", body = ValidationErrorBody),
        (status = 503, description = "LIS unreachable", body = ResponseEnvelope)
    )
)]
/// Send lab orders for one or more transaction codes to the LIS.
///
/// The LIS status and body are relayed back. A 2xx reply whose embedded `response.code` is
/// not `"200"` is surfaced as a 4xx.
#[axum::debug_handler]
async fn submit_order(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    payload: Result<Json<OrderReq>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return malformed_body(rejection),
    };
    let command = match validate_order(&req) {
        Ok(command) => command,
        Err(errors) => return validation_response(&errors),
    };

    let meta = request_meta(&method, &uri, &headers);
    let request = serde_json::to_value(&req).unwrap_or(Value::Null);
    match state.service.submit_order(&command, &meta, request).await {
        Ok(reply) => relay_response(reply),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    post,
    path = "/pasien",
    request_body = PasienReq,
    responses(
        (status = 200, description = "LIS reply relayed unchanged"),
        (status = 401, description = "Missing or invalid API key"),
        (status = 404, description = "Unknown medical record number", body = ResponseEnvelope),
        (status = 422, description = "Validation failed", body = ValidationErrorBody),
        (status = 503, description = "LIS unreachable", body = ResponseEnvelope)
    )
)]
/// Send a standalone patient update to the LIS.
#[axum::debug_handler]
async fn sync_patient(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    payload: Result<Json<PasienReq>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return malformed_body(rejection),
    };
    let command = match validate_patient(&req) {
        Ok(command) => command,
        Err(errors) => return validation_response(&errors),
    };

    let meta = request_meta(&method, &uri, &headers);
    let request = serde_json::to_value(&req).unwrap_or(Value::Null);
    match state.service.sync_patient(&command, &meta, request).await {
        Ok(reply) => relay_response(reply),
        Err(e) => error_response(e),
    }
}

fn route(description: &str, endpoint: &str, params: &[(&str, &str)]) -> ResultRouteInfo {
    ResultRouteInfo {
        description: description.into(),
        method: "GET".into(),
        endpoint: endpoint.into(),
        params: params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

#[utoipa::path(
    get,
    path = "/result",
    responses(
        (status = 200, description = "Available result queries", body = ResultInfoRes)
    )
)]
/// List the result query endpoints.
#[axum::debug_handler]
async fn result_info(State(state): State<AppState>) -> Json<ResultInfoRes> {
    let max_days = state.service.config().limits().max_period_days;
    let window = format!("Y-m-d, at most {max_days} days after start_date");

    Json(ResultInfoRes {
        message: "LIS result endpoints".into(),
        routes: vec![
            route(
                "Results of one lab order",
                "/result/no_order",
                &[("no_lab", "Lab order number, max 20 characters")],
            ),
            route(
                "Results of all patients in a period",
                "/result/periode",
                &[("start_date", "Y-m-d"), ("end_date", &window)],
            ),
            route(
                "Results of one patient in a period",
                "/result/mrn_periode",
                &[
                    ("no_rm", "Medical record number"),
                    ("start_date", "Y-m-d"),
                    ("end_date", &window),
                ],
            ),
        ],
    })
}

#[utoipa::path(
    get,
    path = "/result/no_order",
    params(("no_lab" = String, Query, description = "Lab order number")),
    responses(
        (status = 200, description = "LIS delivery outcome"),
        (status = 422, description = "Validation failed", body = ValidationErrorBody)
    )
)]
/// Query results of one lab order.
#[axum::debug_handler]
async fn result_by_lab(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<ResultByLabQuery>,
) -> Response {
    match validate_result_by_lab(&query) {
        Ok(query) => {
            let meta = request_meta(&method, &uri, &headers);
            relay_response(state.service.query_results(&query, &meta).await)
        }
        Err(errors) => validation_response(&errors),
    }
}

#[utoipa::path(
    get,
    path = "/result/periode",
    params(
        ("start_date" = String, Query, description = "Start date, Y-m-d"),
        ("end_date" = String, Query, description = "End date, Y-m-d")
    ),
    responses(
        (status = 200, description = "LIS delivery outcome"),
        (status = 422, description = "Validation failed or window too long", body = ValidationErrorBody)
    )
)]
/// Query results of all patients in a date window.
#[axum::debug_handler]
async fn result_period(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<ResultPeriodQuery>,
) -> Response {
    let max_days = state.service.config().limits().max_period_days;
    match validate_result_period(&query, max_days) {
        Ok(query) => {
            let meta = request_meta(&method, &uri, &headers);
            relay_response(state.service.query_results(&query, &meta).await)
        }
        Err(errors) => validation_response(&errors),
    }
}

#[utoipa::path(
    get,
    path = "/result/mrn_periode",
    params(
        ("no_rm" = String, Query, description = "Medical record number"),
        ("start_date" = String, Query, description = "Start date, Y-m-d"),
        ("end_date" = String, Query, description = "End date, Y-m-d")
    ),
    responses(
        (status = 200, description = "LIS delivery outcome"),
        (status = 422, description = "Validation failed or window too long", body = ValidationErrorBody)
    )
)]
/// Query results of one patient in a date window.
#[axum::debug_handler]
async fn result_mrn_period(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<ResultMrnPeriodQuery>,
) -> Response {
    let max_days = state.service.config().limits().max_period_days;
    match validate_result_mrn_period(&query, max_days) {
        Ok(query) => {
            let meta = request_meta(&method, &uri, &headers);
            relay_response(state.service.query_results(&query, &meta).await)
        }
        Err(errors) => validation_response(&errors),
    }
}

#[utoipa::path(
    post,
    path = "/webhook/order",
    request_body = WebhookReq,
    responses(
        (status = 200, description = "Acknowledgement; the envelope code carries the outcome", body = ResponseEnvelope)
    )
)]
/// Receive lab results from the LIS.
///
/// Always answers HTTP 200 so the LIS does not redeliver; the envelope code tells it whether
/// the results were applied.
#[axum::debug_handler]
async fn webhook_order(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<ResponseEnvelope>) {
    let meta = request_meta(&method, &uri, &headers);
    let report = state.service.receive_callback(&body, &meta).await;
    (StatusCode::OK, Json(report.envelope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use bridge_core::config::{BatchLimits, DeliverySettings, LisSettings};
    use bridge_core::repositories::his::{ExaminationItemRow, OrderRow};
    use bridge_core::repositories::memory::{MemoryState, MemoryStore};
    use bridge_core::BridgeConfig;
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    fn seeded_store() -> MemoryStore {
        MemoryStore::with_state(MemoryState {
            order_rows: vec![OrderRow {
                register_id: 1,
                kode_transaksi: "LAB1".into(),
                no_rm: Some("000123".into()),
                nama: Some("BUDI".into()),
                jenis_kelamin: Some(1),
                ..OrderRow::default()
            }],
            examination_items: BTreeMap::from([(
                "LAB1".to_string(),
                vec![ExaminationItemRow {
                    execution_id: 10,
                    examination_id: 100,
                    package_code: "HEM01".into(),
                    item_code: "HB".into(),
                    item_name: Some("Hemoglobin".into()),
                }],
            )]),
            ..MemoryState::default()
        })
    }

    fn app(store: &MemoryStore, lis_url: &str) -> Router {
        let config = BridgeConfig::new(
            LisSettings {
                base_url: lis_url.into(),
                product_name: "HIS".into(),
                version: "1".into(),
                user_id: "bridge".into(),
                secret_key: "s3cret".into(),
            },
            DeliverySettings {
                timeout: Duration::from_millis(200),
                retries: 2,
                retry_delay: Duration::from_millis(5),
            },
            BatchLimits::default(),
            2,
        )
        .expect("config");
        let store = Arc::new(store.clone());
        let service = BridgeService::new(Arc::new(config), store.clone(), store.clone(), store)
            .expect("service");
        router(AppState::new(Arc::new(service), Some(KEY.into())))
    }

    async fn spawn_lis(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        format!("http://{addr}")
    }

    async fn unreachable_lis() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        format!("http://{addr}")
    }

    fn post_json(uri: &str, body: Value) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header(API_KEY_HEADER, KEY)
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get_with_key(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .uri(uri)
            .header(API_KEY_HEADER, KEY)
            .body(Body::empty())
            .expect("request")
    }

    async fn send(app: Router, request: HttpRequest<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_needs_no_key() {
        let store = MemoryStore::new();
        let request = HttpRequest::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("request");

        let (status, body) = send(app(&store, "http://127.0.0.1:9"), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], json!(true));
    }

    #[tokio::test]
    async fn protected_routes_require_the_key() {
        let store = MemoryStore::new();
        let request = HttpRequest::builder()
            .uri("/result")
            .body(Body::empty())
            .expect("request");

        let (status, _) = send(app(&store, "http://127.0.0.1:9"), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = HttpRequest::builder()
            .uri("/result")
            .header(API_KEY_HEADER, "wrong")
            .body(Body::empty())
            .expect("request");
        let (status, _) = send(app(&store, "http://127.0.0.1:9"), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(app(&store, "http://127.0.0.1:9"), get_with_key("/result")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["routes"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn invalid_order_is_422_with_field_errors() {
        let store = MemoryStore::new();
        let (status, body) = send(
            app(&store, "http://127.0.0.1:9"),
            post_json(
                "/order",
                json!({"order_control": "NOPE", "kode_transaksi": "LAB1"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["errors"]["order_control"].is_array());
        assert!(body["errors"]["status_pasien"].is_array());
    }

    #[tokio::test]
    async fn unknown_transaction_is_404_no_data() {
        let store = seeded_store();
        let (status, body) = send(
            app(&store, "http://127.0.0.1:9"),
            post_json(
                "/order",
                json!({
                    "order_control": "PASIEN_BARU_MASUK",
                    "status_pasien": "STATUS_PASIEN_RAWAT_INAP",
                    "kode_transaksi": "UNKNOWN"
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body,
            serde_json::to_value(ResponseEnvelope::no_data()).expect("envelope")
        );
    }

    #[tokio::test]
    async fn order_is_delivered_and_reply_relayed() {
        let captured: Arc<Mutex<Option<Value>>> = Arc::default();
        let sink = captured.clone();
        let lis = Router::new().route(
            "/bridging/order",
            post(move |Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().expect("lock") = Some(body);
                    Json(json!({"response": {"code": "200", "message": "order diterima"}}))
                }
            }),
        );
        let base = spawn_lis(lis).await;
        let store = seeded_store();

        let (status, body) = send(
            app(&store, &base),
            post_json(
                "/order",
                json!({
                    "order_control": "PASIEN_PINDAH_RUANGAN",
                    "status_pasien": "STATUS_PASIEN_RAWAT_INAP",
                    "kode_transaksi": ["LAB1"]
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["message"], json!("order diterima"));

        let sent = captured.lock().expect("lock").clone().expect("LIS called");
        assert_eq!(sent["order"]["obr"]["order_control"], json!("UI"));
        assert_eq!(sent["order"]["obr"]["order_lab"], json!("LAB1"));
        assert_eq!(sent["order"]["pid"]["sex"], json!("L"));

        let audit = store.audit_records().await;
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].0.endpoint, "/order");
    }

    #[tokio::test]
    async fn embedded_lis_error_becomes_client_error() {
        let lis = Router::new().route(
            "/bridging/order",
            post(|| async { Json(json!({"response": {"code": "404", "message": "pasien tidak ada"}})) }),
        );
        let base = spawn_lis(lis).await;

        let (status, body) = send(
            app(&seeded_store(), &base),
            post_json(
                "/order",
                json!({
                    "order_control": "PASIEN_BARU_MASUK",
                    "status_pasien": "STATUS_PASIEN_RAWAT_JALAN",
                    "kode_transaksi": "LAB1"
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["response"]["message"], json!("pasien tidak ada"));
    }

    #[tokio::test]
    async fn unreachable_lis_is_503_envelope() {
        let base = unreachable_lis().await;

        let (status, body) = send(
            app(&seeded_store(), &base),
            post_json(
                "/order",
                json!({
                    "order_control": "PASIEN_BARU_MASUK",
                    "status_pasien": "STATUS_PASIEN_RAWAT_JALAN",
                    "kode_transaksi": "LAB1"
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["response"]["code"], json!("503"));
        assert_eq!(body["response"]["product"], json!("SOFTMEDIX LIS"));
    }

    #[tokio::test]
    async fn long_result_window_is_rejected() {
        let store = MemoryStore::new();
        let (status, body) = send(
            app(&store, "http://127.0.0.1:9"),
            get_with_key("/result/periode?start_date=2025-01-01&end_date=2025-02-05"),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body,
            json!({
                "message": "Periode tidak boleh lebih dari 30 hari",
                "errors": {"end_date": ["Maksimal periode adalah 30 hari"]}
            })
        );
    }

    #[tokio::test]
    async fn result_query_is_proxied_with_credentials() {
        let lis = Router::new().route(
            "/bridging/result/bridge/s3cret/L123",
            get(|| async { Json(json!({"hasil": [{"test": "HB", "nilai": "13.5"}]})) }),
        );
        let base = spawn_lis(lis).await;

        let (status, body) = send(
            app(&MemoryStore::new(), &base),
            get_with_key("/result/no_order?no_lab=L123"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["status"], json!(200));
        assert_eq!(body["data"]["hasil"][0]["test"], json!("HB"));
    }

    #[tokio::test]
    async fn webhook_is_idempotent_and_always_200() {
        let store = seeded_store();
        let callback = json!({
            "response": {
                "code": "200",
                "sampel": {
                    "order_lab": "LAB1",
                    "lis_sampel": "S-77",
                    "result_test": [{
                        "kode_paket": "HEM01",
                        "test_id": "HB",
                        "jenis_hasil": "N",
                        "hasil": 13.5,
                        "satuan": "g/dL",
                        "nilai_normal": "12-16",
                        "flag": ""
                    }]
                }
            }
        });

        for _ in 0..2 {
            let (status, body) = send(
                app(&store, "http://127.0.0.1:9"),
                post_json("/webhook/order", callback.clone()),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["response"]["code"], json!("200"));
            assert_eq!(body["response"]["id"], json!("S-77"));
        }

        let state = store.snapshot().await;
        assert_eq!(state.results.len(), 1);
        assert!(state.completed_executions.contains_key(&10));

        let (status, body) = send(
            app(&store, "http://127.0.0.1:9"),
            post_json("/webhook/order", json!({"response": {"code": "500"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["code"], json!("404"));
    }
}
