// Museum Attendance - Web Server
// REST API with Axum: health, metrics, predict, museums

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use museum_attendance::{
    get_all_museums, metrics, open_store, predict_from_population, HarmonizedMuseumRecord,
    ModelError, RegressionArtifact, DEFAULT_DB_PATH, DEFAULT_MODEL_PATH,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    model_path: Arc<PathBuf>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Map a model error to the HTTP status the caller should see:
/// bad input is the client's fault, a missing artifact means "not ready yet".
fn status_for(err: &ModelError) -> StatusCode {
    match err {
        ModelError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ModelError::ArtifactNotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
        ModelError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ModelError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Deserialize)]
struct PredictRequest {
    population: i64,
}

#[derive(Serialize)]
struct PredictResponse {
    population: i64,
    predicted_visitors_millions: f64,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/metrics - Current model parameters and fit quality
async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match metrics(&state.model_path) {
        Ok(artifact) => (StatusCode::OK, Json(ApiResponse::ok(artifact))).into_response(),
        Err(e) => (
            status_for(&e),
            Json(ApiResponse::<RegressionArtifact>::err(e.to_string())),
        )
            .into_response(),
    }
}

/// POST /api/predict - Predict visitors from a city population
async fn predict_handler(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> impl IntoResponse {
    match predict_from_population(&state.model_path, request.population) {
        Ok(predicted) => (
            StatusCode::OK,
            Json(ApiResponse::ok(PredictResponse {
                population: request.population,
                predicted_visitors_millions: predicted,
            })),
        )
            .into_response(),
        Err(e) => (
            status_for(&e),
            Json(ApiResponse::<PredictResponse>::err(e.to_string())),
        )
            .into_response(),
    }
}

/// GET /api/museums - All harmonized museum rows
async fn get_museums(State(state): State<AppState>) -> impl IntoResponse {
    let conn = match state.db.lock() {
        Ok(conn) => conn,
        Err(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<Vec<HarmonizedMuseumRecord>>::err(
                    "Database lock poisoned".to_string(),
                )),
            )
                .into_response();
        }
    };

    match get_all_museums(&conn) {
        Ok(museums) => (StatusCode::OK, Json(ApiResponse::ok(museums))).into_response(),
        Err(e) => {
            eprintln!("Error getting museums: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<Vec<HarmonizedMuseumRecord>>::err(e.to_string())),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    println!("🌐 Museum Attendance - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = match open_store(std::path::Path::new(DEFAULT_DB_PATH)) {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("❌ Failed to open database at {DEFAULT_DB_PATH}: {e}");
            eprintln!("   Run: cargo run -- etl <wikitext_file> <city_csv>");
            eprintln!("   to ingest data first.");
            std::process::exit(1);
        }
    };
    println!("✓ Database opened: {DEFAULT_DB_PATH}");

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        model_path: Arc::new(PathBuf::from(DEFAULT_MODEL_PATH)),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/predict", post(predict_handler))
        .route("/museums", get(get_museums))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = "0.0.0.0:3000";
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("❌ Failed to bind to {addr}: {e}");
            std::process::exit(1);
        }
    };

    println!("\n🚀 Server running on http://localhost:3000");
    println!("   Predict: POST http://localhost:3000/api/predict");
    println!("   Metrics: GET  http://localhost:3000/api/metrics");
    println!("\n   Press Ctrl+C to stop\n");

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("❌ Server error: {e}");
        std::process::exit(1);
    }
}
