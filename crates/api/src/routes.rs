use axum::{
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use extract::{
    ExtractedResult, ModelError, SchemaVariant, Subject, build_request, decode_image, extract,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::cache::{AnalysisCache, CacheStats};
use crate::metrics::{MetricsSnapshot, TimedOperation};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Image,
    Text,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(rename = "type")]
    pub kind: Option<InputKind>,
    /// Base64 image, optionally a data URL
    pub file: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FactCheckRequest {
    pub text: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    model: String,
}

#[derive(Serialize)]
pub struct StatsResponse {
    metrics: MetricsSnapshot,
    cache: Option<CacheStats>,
}

/// Failure rendered as the variant's placeholder body.
#[derive(Debug)]
pub struct AnalysisFailure {
    variant: SchemaVariant,
    status: StatusCode,
    detail: String,
}

impl AnalysisFailure {
    fn invalid(variant: SchemaVariant, detail: impl Into<String>) -> Self {
        Self {
            variant,
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn upstream(variant: SchemaVariant, err: &ModelError) -> Self {
        Self {
            variant,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: format!("Analysis service error: {}", err),
        }
    }
}

impl IntoResponse for AnalysisFailure {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(
                variant = self.variant.as_str(),
                status = self.status.as_u16(),
                detail = %self.detail,
                "Analysis failed"
            );
        } else {
            warn!(
                variant = self.variant.as_str(),
                status = self.status.as_u16(),
                detail = %self.detail,
                "Rejected analysis request"
            );
        }

        let body = ExtractedResult::placeholder(self.variant, &self.detail).into_value();
        (self.status, Json(body)).into_response()
    }
}

/// base64 inflates by 4/3, plus room for the JSON envelope
fn body_limit(max_image_bytes: usize) -> usize {
    (max_image_bytes / 3)
        .saturating_add(1)
        .saturating_mul(4)
        .saturating_add(64 * 1024)
}

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = body_limit(state.config.server.max_image_bytes);

    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/analyze", post(analyze))
        .route("/fact-check", post(fact_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.model.name().to_string(),
    })
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        metrics: state.metrics.snapshot(),
        cache: state.cache.as_ref().map(AnalysisCache::stats),
    })
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<Value>, AnalysisFailure> {
    let variant = SchemaVariant::Assessment;
    state.metrics.record_request();

    let subject = payload
        .map_err(|rejection| rejection.body_text())
        .and_then(|Json(req)| resolve_subject(req, state.config.server.max_image_bytes))
        .map_err(|detail| {
            state.metrics.record_invalid_request();
            AnalysisFailure::invalid(variant, detail)
        })?;

    run_analysis(&state, subject, variant).await
}

async fn fact_check(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FactCheckRequest>, JsonRejection>,
) -> Result<Json<Value>, AnalysisFailure> {
    let variant = SchemaVariant::FactCheck;
    state.metrics.record_request();

    let text = payload
        .map_err(|rejection| rejection.body_text())
        .and_then(|Json(req)| non_empty(req.text).ok_or_else(|| "No text provided.".to_string()))
        .map_err(|detail| {
            state.metrics.record_invalid_request();
            AnalysisFailure::invalid(variant, detail)
        })?;

    run_analysis(&state, Subject::Text(text), variant).await
}

/// `type` wins; without it an attached file means an image.
fn resolve_subject(req: AnalyzeRequest, max_image_bytes: usize) -> Result<Subject, String> {
    let kind = req.kind.unwrap_or(if req.file.is_some() {
        InputKind::Image
    } else {
        InputKind::Text
    });

    match kind {
        InputKind::Image => {
            let file = non_empty(req.file).ok_or_else(|| "No image provided.".to_string())?;
            decode_image(&file, max_image_bytes)
                .map(Subject::Image)
                .map_err(|e| format!("Invalid image: {}", e))
        }
        InputKind::Text => non_empty(req.text)
            .map(Subject::Text)
            .ok_or_else(|| "No text provided.".to_string()),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn run_analysis(
    state: &AppState,
    subject: Subject,
    variant: SchemaVariant,
) -> Result<Json<Value>, AnalysisFailure> {
    let span = info_span!(
        "analysis",
        request_id = %Uuid::new_v4(),
        variant = variant.as_str(),
        kind = subject.kind()
    );

    async move {
        let cache_key = state
            .cache
            .as_ref()
            .map(|_| AnalysisCache::key(variant, &subject));

        if let (Some(cache), Some(key)) = (&state.cache, &cache_key) {
            if let Some(hit) = cache.get(key) {
                debug!("Serving cached analysis");
                state.metrics.record_cache_hit();
                state.metrics.record_success();
                return Ok(Json(hit));
            }
        }

        let timer = TimedOperation::start();
        let raw = state
            .call_model(build_request(&subject, variant))
            .await
            .map_err(|e| {
                state.metrics.record_upstream_failure();
                AnalysisFailure::upstream(variant, &e)
            })?;

        let result = extract(&raw, variant);
        state.metrics.record_extraction(result.strategy);

        info!(
            strategy = result.strategy.map(|s| s.as_str()).unwrap_or("none"),
            placeholder = result.is_placeholder(),
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "Analysis complete"
        );

        if let (Some(cache), Some(key)) = (&state.cache, cache_key) {
            if !result.is_placeholder() {
                cache.insert(key, Value::Object(result.fields.clone()));
            }
        }

        state.metrics.record_success();
        Ok(Json(result.into_value()))
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, header};
    use extract::{AnalysisModel, ModelRequest};
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    /// 1x1 transparent PNG
    const PNG_BASE64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    type Reply = Box<dyn Fn(usize) -> Result<String, ModelError> + Send + Sync>;

    struct StubModel {
        reply: Reply,
        delay: Duration,
        calls: AtomicUsize,
        last_request: Mutex<Option<ModelRequest>>,
    }

    impl StubModel {
        fn new(reply: impl Fn(usize) -> Result<String, ModelError> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                reply: Box::new(reply),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn replying(text: &str) -> Arc<Self> {
            let text = text.to_string();
            Self::new(move |_| Ok(text.clone()))
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnalysisModel for StubModel {
        fn name(&self) -> &str {
            "stub-model"
        }

        async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.reply)(call)
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.retry.initial_backoff_ms = 1;
        config.retry.max_backoff_ms = 1;
        config
    }

    fn app_with(model: Arc<StubModel>, config: AppConfig) -> (Router, Arc<AppState>) {
        let state = Arc::new(AppState::new(config, model));
        (router(Arc::clone(&state)), state)
    }

    async fn post_json(app: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(app, request).await
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(app, request).await
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_analyze_text_normalizes_fenced_reply() {
        let model = StubModel::replying("```json\n{\"score\": 88, \"label\": \"Truth\"}\n```");
        let (app, _) = app_with(Arc::clone(&model), test_config());

        let (status, body) =
            post_json(&app, "/analyze", r#"{"type": "text", "text": "Water boils at 100C"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "score": 88,
                "label": "Truth",
                "reasoning_points": [
                    {"title": "Analysis", "detail": "Verified but details missing."}
                ],
                "sources": []
            })
        );
        let sent = model.last_request.lock().unwrap().clone().unwrap();
        assert!(sent.prompt.contains("Water boils at 100C"));
        assert!(sent.image.is_none());
    }

    #[tokio::test]
    async fn test_analyze_image_is_sent_inline() {
        let model = StubModel::replying(r#"{"score": 12, "label": "High Risk", "reasoning_points": [{"title": "Edited", "detail": "Clone artifacts"}], "sources": []}"#);
        let (app, _) = app_with(Arc::clone(&model), test_config());

        let payload = json!({"type": "image", "file": format!("data:image/png;base64,{}", PNG_BASE64)});
        let (status, body) = post_json(&app, "/analyze", &payload.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["label"], json!("High Risk"));
        let sent = model.last_request.lock().unwrap().clone().unwrap();
        let image = sent.image.unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, PNG_BASE64);
    }

    #[tokio::test]
    async fn test_fact_check_recovers_object_from_prose() {
        let model = StubModel::replying("Sure! {\"score\": 35, \"reasoning\": \"Partly false\"} Hope this helps.");
        let (app, _) = app_with(model, test_config());

        let (status, body) = post_json(&app, "/fact-check", r#"{"text": "claim"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"score": 35, "reasoning": "Partly false", "sources": []}));
    }

    #[tokio::test]
    async fn test_unparseable_reply_returns_placeholder() {
        let (app, state) = app_with(StubModel::replying("I cannot help with that."), test_config());

        let (status, body) = post_json(&app, "/analyze", r#"{"text": "claim"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["label"], json!("Error"));
        assert_eq!(body["reasoning_points"][0]["detail"], json!("Could not parse API output."));
        assert_eq!(state.metrics.snapshot().extraction.failed, 1);
        assert_eq!(state.cache.as_ref().unwrap().stats().entries, 0);
    }

    #[tokio::test]
    async fn test_transient_upstream_errors_are_retried() {
        let model = StubModel::new(|call| {
            if call < 2 {
                Err(ModelError::Status { status: 503, body: "overloaded".to_string() })
            } else {
                Ok(r#"{"score": 70}"#.to_string())
            }
        });
        let (app, _) = app_with(Arc::clone(&model), test_config());

        let (status, body) = post_json(&app, "/fact-check", r#"{"text": "claim"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"score": 70, "sources": []}));
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_500_with_cause() {
        let model = StubModel::new(|_| {
            Err(ModelError::Status { status: 403, body: "API key not valid".to_string() })
        });
        let (app, state) = app_with(Arc::clone(&model), test_config());

        let (status, body) = post_json(&app, "/analyze", r#"{"text": "claim"}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["score"], json!(0));
        assert_eq!(body["label"], json!("Error"));
        let detail = body["reasoning_points"][0]["detail"].as_str().unwrap();
        assert!(detail.contains("API key not valid"), "{}", detail);
        assert_eq!(model.calls(), 1);
        assert_eq!(state.metrics.snapshot().upstream_failures, 1);

        let (status, body) = post_json(&app, "/fact-check", r#"{"text": "claim"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["reasoning"].as_str().unwrap().contains("403"));
        assert_eq!(body["sources"], json!([]));
    }

    #[tokio::test]
    async fn test_slow_model_times_out() {
        let model = Arc::new(StubModel {
            reply: Box::new(|_: usize| -> Result<String, ModelError> { Ok("{}".to_string()) }),
            delay: Duration::from_secs(5),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        });
        let mut config = test_config();
        config.concurrency.request_timeout_secs = 1;
        config.retry.max_retries = 0;
        let (app, _) = app_with(model, config);

        let (status, body) = post_json(&app, "/fact-check", r#"{"text": "claim"}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["reasoning"].as_str().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_invalid_requests_get_placeholder_400() {
        let model = StubModel::replying("{}");
        let (app, state) = app_with(Arc::clone(&model), test_config());

        let (status, body) = post_json(&app, "/analyze", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["label"], json!("Error"));
        assert_eq!(body["sources"], json!([]));

        let (status, body) = post_json(&app, "/analyze", r#"{"type": "image"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reasoning_points"][0]["detail"], json!("No image provided."));

        let (status, body) =
            post_json(&app, "/analyze", r#"{"type": "image", "file": "@@@"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["reasoning_points"][0]["detail"].as_str().unwrap().starts_with("Invalid image"));

        let (status, body) = post_json(&app, "/fact-check", r#"{"text": "   "}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"score": 0, "reasoning": "No text provided.", "sources": []}));

        assert_eq!(model.calls(), 0);
        assert_eq!(state.metrics.snapshot().invalid_requests, 4);
    }

    #[tokio::test]
    async fn test_repeated_request_is_served_from_cache() {
        let model = StubModel::replying(r#"{"score": 90, "reasoning": "Accurate", "sources": ["https://nasa.gov"]}"#);
        let (app, state) = app_with(Arc::clone(&model), test_config());

        let (_, first) = post_json(&app, "/fact-check", r#"{"text": "The earth orbits the sun"}"#).await;
        let (_, second) =
            post_json(&app, "/fact-check", r#"{"text": "The earth orbits the sun "}"#).await;

        assert_eq!(first, second);
        assert_eq!(model.calls(), 1);
        assert_eq!(state.metrics.snapshot().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_cache_disabled_always_calls_model() {
        let model = StubModel::replying(r#"{"score": 90}"#);
        let mut config = test_config();
        config.cache.enabled = false;
        let (app, _) = app_with(Arc::clone(&model), config);

        post_json(&app, "/fact-check", r#"{"text": "claim"}"#).await;
        post_json(&app, "/fact-check", r#"{"text": "claim"}"#).await;

        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_health_and_stats() {
        let (app, _) = app_with(StubModel::replying(r#"{"score": 50}"#), test_config());

        let (status, body) = get_json(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "model": "stub-model"}));

        post_json(&app, "/fact-check", r#"{"text": "claim"}"#).await;

        let (status, body) = get_json(&app, "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["metrics"]["total_requests"], json!(1));
        assert_eq!(body["metrics"]["extraction"]["direct"], json!(1));
        assert_eq!(body["cache"]["entries"], json!(1));
    }

    #[test]
    fn test_body_limit_covers_encoded_image_and_saturates() {
        let max_image_bytes = 8 * 1024 * 1024;
        let encoded_len = (max_image_bytes + 2) / 3 * 4;
        assert!(body_limit(max_image_bytes) >= encoded_len);
        assert_eq!(body_limit(usize::MAX), usize::MAX);
    }

    #[test]
    fn test_text_kind_ignores_file() {
        let req = AnalyzeRequest {
            kind: Some(InputKind::Text),
            file: Some(PNG_BASE64.to_string()),
            text: None,
        };
        assert_eq!(resolve_subject(req, 1024).unwrap_err(), "No text provided.");
    }

    #[tokio::test]
    async fn test_text_request_with_only_file_is_rejected() {
        let model = StubModel::replying("{}");
        let (app, _) = app_with(Arc::clone(&model), test_config());

        let payload = json!({"type": "text", "file": PNG_BASE64});
        let (status, body) = post_json(&app, "/analyze", &payload.to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reasoning_points"][0]["detail"], json!("No text provided."));
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn test_resolve_subject_defaults() {
        let req = AnalyzeRequest { kind: None, file: None, text: Some("hello".to_string()) };
        assert_eq!(resolve_subject(req, 1024).unwrap(), Subject::Text("hello".to_string()));

        let req = AnalyzeRequest { kind: None, file: Some(PNG_BASE64.to_string()), text: None };
        assert!(matches!(resolve_subject(req, 1024).unwrap(), Subject::Image(_)));

        let req = AnalyzeRequest { kind: None, file: None, text: None };
        assert_eq!(resolve_subject(req, 1024).unwrap_err(), "No text provided.");
    }
}
