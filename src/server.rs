//! HTTP front end: static page, result files and the `/analyze` upload endpoint.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::data::{DatasetFiles, DatasetKind};
use crate::model::ForestParams;
use crate::pipeline::{
    run_analysis, AnalysisReport, FEATURE_IMPORTANCE_FILE, FRAUD_DISTRIBUTION_FILE,
    PREDICTIONS_FILE,
};

/// Number of multipart parts `/analyze` requires
pub const EXPECTED_UPLOADS: usize = DatasetKind::ALL.len();

const RESULTS_URL_PREFIX: &str = "/static/results";

/// Runtime settings of the HTTP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Served under `/static`; `index.html` is also served at `/`
    pub static_dir: PathBuf,
    /// Where uploaded CSVs are written before analysis
    pub upload_dir: PathBuf,
    pub forest: ForestParams,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    /// Report artifacts live under `<static_dir>/results`
    pub fn results_dir(&self) -> PathBuf {
        self.static_dir.join("results")
    }
}

#[derive(Clone)]
struct AppState {
    config: Arc<ServerConfig>,
    // Artifact filenames are fixed, so analyses run one at a time.
    analysis_lock: Arc<Mutex<()>>,
}

/// Error body shared by every failure response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

/// Failures surfaced by the HTTP layer
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Analysis(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => {
                tracing::warn!(%message, "rejected analysis request");
                (StatusCode::BAD_REQUEST, message)
            }
            ApiError::Analysis(err) => {
                let message = format!("{err:#}");
                tracing::error!(error = %message, "analysis failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        let body = ErrorBody {
            success: false,
            error: message,
        };
        (status, Json(body)).into_response()
    }
}

/// Successful `/analyze` response
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub predictions_url: String,
    pub feature_importance_url: String,
    pub pie_chart_url: String,
    pub feature_labels: Vec<String>,
    pub feature_values: Vec<f64>,
    pub pie_labels: Vec<String>,
    pub pie_values: Vec<usize>,
}

impl AnalyzeResponse {
    fn from_report(report: AnalysisReport) -> Self {
        let (feature_labels, feature_values): (Vec<String>, Vec<f64>) =
            report.top_features.into_iter().rev().unzip();
        let (pie_labels, pie_values): (Vec<String>, Vec<usize>) =
            report.distribution.into_iter().unzip();
        Self {
            success: true,
            predictions_url: result_url(PREDICTIONS_FILE),
            feature_importance_url: result_url(FEATURE_IMPORTANCE_FILE),
            pie_chart_url: result_url(FRAUD_DISTRIBUTION_FILE),
            feature_labels,
            feature_values,
            pie_labels,
            pie_values,
        }
    }
}

fn result_url(file_name: &str) -> String {
    format!("{RESULTS_URL_PREFIX}/{file_name}")
}

/// Build the application router
pub fn router(config: ServerConfig) -> Router {
    let index = ServeFile::new(config.static_dir.join("index.html"));
    let static_files = ServeDir::new(&config.static_dir);
    let body_limit = config.max_upload_bytes;

    let state = AppState {
        config: Arc::new(config),
        analysis_lock: Arc::new(Mutex::new(())),
    };

    Router::new()
        .route_service("/", index)
        .route("/analyze", post(analyze))
        .nest_service("/static", static_files)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C
pub async fn serve(addr: &str, config: ServerConfig) -> crate::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local_addr: SocketAddr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, static_dir = %config.static_dir.display(), "server listening");

    axum::serve(listener, router(config))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
}

async fn analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let mut uploads = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed upload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload '{name}': {e}")))?;
        uploads.push((name, bytes));
    }

    if uploads.len() != EXPECTED_UPLOADS {
        return Err(ApiError::BadRequest(format!(
            "Please upload all {EXPECTED_UPLOADS} files."
        )));
    }

    let _guard = state.analysis_lock.lock().await;
    let files = save_uploads(&state.config.upload_dir, uploads).await?;

    let config = Arc::clone(&state.config);
    let report = tokio::task::spawn_blocking(move || {
        run_analysis(&files, &config.results_dir(), &config.forest)
    })
    .await
    .context("analysis task panicked")??;

    Ok(Json(AnalyzeResponse::from_report(report)))
}

/// Write each recognised part to `<upload_dir>/<fieldName>.csv`
async fn save_uploads(
    upload_dir: &Path,
    uploads: Vec<(String, axum::body::Bytes)>,
) -> crate::Result<DatasetFiles> {
    tokio::fs::create_dir_all(upload_dir)
        .await
        .with_context(|| format!("failed to create {}", upload_dir.display()))?;

    let mut files = DatasetFiles::new();
    for (name, bytes) in uploads {
        let Some(kind) = DatasetKind::from_field_name(&name) else {
            tracing::warn!(field = %name, "ignoring unexpected upload field");
            continue;
        };
        let path = upload_dir.join(format!("{}.csv", kind.field_name()));
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("failed to save upload '{}'", kind))?;
        files.insert(kind, path);
    }
    tracing::debug!(saved = files.len(), "uploads saved");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    const BOUNDARY: &str = "fraudlens-test-boundary";

    fn test_config(root: &Path) -> ServerConfig {
        ServerConfig {
            static_dir: root.join("static"),
            upload_dir: root.join("uploads"),
            forest: ForestParams::default(),
            max_upload_bytes: 1024 * 1024,
        }
    }

    fn multipart_request(parts: &[(&str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, content) in parts {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{name}.csv\"\r\nContent-Type: text/csv\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method("POST")
            .uri("/analyze")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn too_few_uploads_returns_400() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(test_config(tmp.path()));

        let parts: Vec<(&str, &str)> = DatasetKind::ALL[..7]
            .iter()
            .map(|kind| (kind.field_name(), "Provider\nPRV1\n"))
            .collect();
        let response = app.oneshot(multipart_request(&parts)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Please upload all 8 files.");
        // Rejected before anything is written
        assert!(!tmp.path().join("uploads").exists());
    }

    #[tokio::test]
    async fn too_many_uploads_returns_400() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(test_config(tmp.path()));

        let mut parts: Vec<(&str, &str)> = DatasetKind::ALL
            .iter()
            .map(|kind| (kind.field_name(), "Provider\nPRV1\n"))
            .collect();
        parts.push(("extra", "Provider\nPRV2\n"));
        let response = app.oneshot(multipart_request(&parts)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn unknown_part_name_returns_500() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(test_config(tmp.path()));

        let mut parts: Vec<(&str, &str)> = DatasetKind::ALL[..7]
            .iter()
            .map(|kind| (kind.field_name(), "Provider\nPRV1\n"))
            .collect();
        parts.push(("providerList", "Provider\nPRV1\n"));
        let response = app.oneshot(multipart_request(&parts)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("testProviders"));
    }

    #[tokio::test]
    async fn bad_request_error_body() {
        let response = ApiError::BadRequest("nope".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"], "nope");
    }

    #[tokio::test]
    async fn analysis_error_exposes_message() {
        let err = anyhow::anyhow!("column 'BeneID' not found").context("merge failed");
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert_eq!(json["error"], "merge failed: column 'BeneID' not found");
    }

    #[test]
    fn results_dir_is_under_static() {
        let config = test_config(Path::new("/srv/app"));
        assert_eq!(config.results_dir(), Path::new("/srv/app/static/results"));
        assert_eq!(result_url(PREDICTIONS_FILE), "/static/results/predictions.csv");
    }
}
