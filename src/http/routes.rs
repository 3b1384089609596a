use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, Method};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::api::{
    AnalysisService, ApiError, ClassifyRequest, ClusterRequest, FeaturesRequest, HealthResponse,
    LabelsRequest, ReduceRequest, SpecRequest,
};
use crate::error::ErrorKind;

/// Largest accepted request body (uploads carry whole audio files)
pub const MAX_BODY_BYTES: usize = 512 * 1024 * 1024;

/// Shared application state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub service: Arc<AnalysisService>,
}

impl HttpState {
    pub fn new(service: Arc<AnalysisService>) -> Self {
        Self { service }
    }
}

/// Stage failures are reported in-band with HTTP 200.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!("[HTTP] Ignoring invalid CORS origin {:?}: {}", origin, err);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Build the Axum router with all handlers.
pub fn build_router(state: HttpState) -> Router {
    let cors = cors_layer(&state.service.config().server.allowed_origins);
    Router::new()
        .route("/health", get(health))
        .route("/api/features", post(features))
        .route("/api/reduce", post(reduce))
        .route("/api/cluster", post(cluster))
        .route("/api/spectrogram", post(spectrogram))
        .route("/api/classify", post(classify))
        .route("/api/labels", post(labels))
        .route("/api/upload", post(upload))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Run a stage on the blocking pool so the async workers stay responsive
async fn run_stage<T, F>(state: HttpState, stage: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&AnalysisService) -> Result<T, ApiError> + Send + 'static,
{
    let service = Arc::clone(&state.service);
    match tokio::task::spawn_blocking(move || stage(service.as_ref())).await {
        Ok(Ok(body)) => Json(body).into_response(),
        Ok(Err(err)) => err.into_response(),
        Err(join_err) => {
            tracing::error!("[HTTP] Stage worker failed: {}", join_err);
            ApiError::new(ErrorKind::Internal, format!("stage worker failed: {join_err}"))
                .into_response()
        }
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

pub async fn features(State(state): State<HttpState>, Json(request): Json<FeaturesRequest>) -> Response {
    run_stage(state, move |service| service.features(&request)).await
}

pub async fn reduce(State(state): State<HttpState>, Json(request): Json<ReduceRequest>) -> Response {
    run_stage(state, move |service| service.reduce(&request)).await
}

pub async fn cluster(State(state): State<HttpState>, Json(request): Json<ClusterRequest>) -> Response {
    run_stage(state, move |service| service.cluster(&request)).await
}

pub async fn spectrogram(State(state): State<HttpState>, Json(request): Json<SpecRequest>) -> Response {
    run_stage(state, move |service| service.spectrogram(&request)).await
}

pub async fn classify(State(state): State<HttpState>, Json(request): Json<ClassifyRequest>) -> Response {
    run_stage(state, move |service| service.classify(&request)).await
}

pub async fn labels(State(state): State<HttpState>, Json(request): Json<LabelsRequest>) -> Response {
    run_stage(state, move |service| service.set_labels(&request)).await
}

/// Collect every `files` part of a multipart body and store it
pub async fn upload(State(state): State<HttpState>, mut multipart: Multipart) -> Response {
    let mut files = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return ApiError::new(ErrorKind::InputValidation, format!("Upload failed: {err}"))
                    .into_response()
            }
        };
        if field.name() != Some("files") {
            continue;
        }
        let name = field.file_name().unwrap_or("upload").to_string();
        match field.bytes().await {
            Ok(bytes) => files.push((name, bytes.to_vec())),
            Err(err) => {
                return ApiError::new(ErrorKind::InputValidation, format!("Upload failed: {err}"))
                    .into_response()
            }
        }
    }
    run_stage(state, move |service| service.store_uploads(files)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FeatureTable;
    use crate::config::AppConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use ndarray::array;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn make_state(config: AppConfig) -> HttpState {
        HttpState::new(Arc::new(AnalysisService::new(config)))
    }

    async fn response_json(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        let json = serde_json::from_slice::<Value>(&bytes).expect("JSON body");
        (status, json)
    }

    async fn post_json(router: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        response_json(
            router
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri(uri)
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(body.to_string()))
                        .expect("request"),
                )
                .await
                .expect("call"),
        )
        .await
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, json) = response_json(
            build_router(make_state(AppConfig::default()))
                .oneshot(
                    Request::builder()
                        .uri("/health")
                        .body(Body::empty())
                        .expect("health request"),
                )
                .await
                .expect("health call"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({"ok": true}));
    }

    #[tokio::test]
    async fn features_without_files_is_in_band_error() {
        let router = build_router(make_state(AppConfig::default()));
        let (status, json) = post_json(router, "/api/features", json!({"file_paths": []})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["error"], "No valid files");
        assert_eq!(json["kind"], "input_validation");
    }

    #[tokio::test]
    async fn classify_before_labels() {
        let router = build_router(make_state(AppConfig::default()));
        let (_, json) = post_json(
            router,
            "/api/classify",
            json!({"model": "Random Forest", "split_pct": 70}),
        )
        .await;
        assert_eq!(json["error"], "reduced data must include label column");
    }

    #[tokio::test]
    async fn reduce_returns_projected_rows() {
        let state = make_state(AppConfig::default());
        let table = FeatureTable::new(
            vec!["feature_1".into(), "feature_2".into()],
            array![[0.0, 1.0], [1.0, 0.0], [2.0, 2.0], [3.0, 1.0]],
        )
        .unwrap()
        .with_seconds(vec![0.0, 1.0, 2.0, 3.0])
        .unwrap();
        state.service.state().set_features(table).unwrap();

        let router = build_router(state.clone());
        let (status, json) = post_json(router, "/api/reduce", json!({"method": "PCA"})).await;
        assert_eq!(status, StatusCode::OK);
        let rows = json["rows"].as_array().expect("rows array");
        assert_eq!(rows.len(), 4);
        assert!(rows[0]["x"].is_number());
        assert!(rows[0]["y"].is_number());
        assert_eq!(rows[3]["second"], 3.0);
        assert!(state.service.state().reduced().unwrap().is_some());
    }

    #[tokio::test]
    async fn spectrogram_of_missing_file() {
        let router = build_router(make_state(AppConfig::default()));
        let (_, json) = post_json(
            router,
            "/api/spectrogram",
            json!({"file_path": "/no/such/file.wav", "start_s": 0.0, "dur_s": 1.0}),
        )
        .await;
        let message = json["error"].as_str().expect("error message");
        assert!(message.starts_with("Spectrogram failed: "));
    }

    #[tokio::test]
    async fn upload_stores_multipart_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.server.upload_dir = dir.path().to_path_buf();
        let router = build_router(make_state(config));

        let body = concat!(
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"files\"; filename=\"take.csv\"\r\n",
            "Content-Type: text/csv\r\n\r\n",
            "a,b\n1,2\n\r\n",
            "--XBOUNDARY--\r\n"
        );
        let (status, json) = response_json(
            router
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/api/upload")
                        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
                        .body(Body::from(body))
                        .expect("upload request"),
                )
                .await
                .expect("upload call"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let paths = json["file_paths"].as_array().expect("file_paths");
        assert_eq!(paths.len(), 1);
        let stored = std::fs::read_to_string(paths[0].as_str().unwrap()).unwrap();
        assert_eq!(stored, "a,b\n1,2\n");
    }
}
