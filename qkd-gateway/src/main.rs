// SPDX-License-Identifier: MIT
//
// QKD Simulator: BB84 Key Establishment with Authenticated Encryption
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara

//! QKD Gateway - HTTP front end for the QKD simulator
//!
//! Thin adapter over `qkd_core::QkdService`: it parses requests, runs the
//! protocol off the async executor, and maps typed core errors onto HTTP status
//! codes. No key material is stored or logged here.
//!
//! # Endpoints
//!
//! - `GET  /api/qkd/encrypt?message=...` - run BB84, encrypt the message
//! - `POST /api/qkd/decrypt` - decrypt with a client-supplied key
//! - `GET  /api/status` - service status
//! - `GET  /health` - liveness
//! - `GET  /metrics` - Prometheus metrics

use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use qkd_core::{
    config::GatewayConfig, metrics::Metrics, protocol::RunReport, Error as QkdError, QkdService,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, warn};

/// Requests still running after this are abandoned by the boundary
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "qkd-gateway")]
#[command(about = "QKD Gateway - Serves BB84-keyed encryption via REST API", long_about = None)]
struct Args {
    /// Path to configuration file (ignored if --env-mode is set)
    #[arg(short, long, default_value = "config/gateway.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Load configuration from environment variables instead of file
    #[arg(long, default_value = "false")]
    env_mode: bool,
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    config: Arc<GatewayConfig>,
    service: Arc<QkdService>,
    metrics: Metrics,
    start_time: Instant,
}

impl AppState {
    fn new(config: GatewayConfig) -> qkd_core::Result<Self> {
        let service = QkdService::new(config.protocol.clone())?;
        Ok(Self {
            config: Arc::new(config),
            service: Arc::new(service),
            metrics: Metrics::new(),
            start_time: Instant::now(),
        })
    }
}

/// Core error rendered as an HTTP response
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<QkdError> for ApiError {
    fn from(e: QkdError) -> Self {
        Self::new(status_for(&e), e.to_string())
    }
}

// Malformed requests are input errors like any other: 400 with a JSON body
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

/// Map a core error class onto an HTTP status
fn status_for(e: &QkdError) -> StatusCode {
    match e {
        e if e.is_input_error() => StatusCode::BAD_REQUEST,
        QkdError::AuthenticationFailure => StatusCode::UNPROCESSABLE_ENTITY,
        // Both are properties of one random run; a fresh run may succeed
        e if e.is_abort() => StatusCode::SERVICE_UNAVAILABLE,
        QkdError::InsufficientKeyMaterial { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Query parameters for /api/qkd/encrypt
#[derive(Deserialize)]
struct EncryptQuery {
    #[serde(default = "default_message")]
    message: String,
}

fn default_message() -> String {
    qkd_core::DEFAULT_MESSAGE.to_string()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EncryptResponse {
    status: &'static str,
    encryption_key: String,
    ciphertext: String,
    report: RunReport,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecryptionRequest {
    encryption_key: String,
    ciphertext: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecryptResponse {
    status: &'static str,
    key_provided: String,
    plaintext: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    version: &'static str,
    uptime_seconds: u64,
    num_qubits: usize,
    eve_attack_rate: f64,
    qber_threshold: f64,
    runs_total: u64,
    runs_aborted: u64,
    abort_rate: f64,
    qber_mean: Option<f64>,
    last_run_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// GET /api/qkd/encrypt - Run the protocol and encrypt the message
async fn encrypt_with_qkd_key(
    State(state): State<AppState>,
    query: Result<Query<EncryptQuery>, QueryRejection>,
) -> Result<Json<EncryptResponse>, ApiError> {
    let Query(params) = query?;
    if params.message.len() > state.config.max_message_bytes {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("Message exceeds {} bytes", state.config.max_message_bytes),
        ));
    }

    let start = Instant::now();
    let service = state.service.clone();

    // CPU-bound and fully synchronous
    let outcome =
        tokio::task::spawn_blocking(move || service.run_protocol_and_encrypt(&params.message))
            .await
            .map_err(|e| {
                error!("Protocol task failed: {}", e);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Protocol task failed")
            })?;

    let latency = start.elapsed().as_micros() as u64;

    match outcome {
        Ok(message) => {
            state
                .metrics
                .record_run(message.report.qber, message.report.key_bits_used, latency);
            Ok(Json(EncryptResponse {
                status: "Successfully generated quantum key and encrypted message.",
                encryption_key: message.encryption_key,
                ciphertext: message.ciphertext,
                report: message.report,
            }))
        }
        Err(e) => {
            match &e {
                QkdError::ProtocolAborted { qber, .. } => {
                    state.metrics.record_abort(*qber, latency);
                    warn!("Protocol aborted: {}", e);
                }
                e if e.is_defect() => {
                    state.metrics.record_run_failure(latency);
                    error!("Internal consistency failure: {}", e);
                }
                _ => {
                    state.metrics.record_run_failure(latency);
                    warn!("Protocol run failed: {}", e);
                }
            }
            Err(e.into())
        }
    }
}

/// POST /api/qkd/decrypt - Decrypt with a client-supplied key
async fn decrypt_message(
    State(state): State<AppState>,
    payload: Result<Json<DecryptionRequest>, JsonRejection>,
) -> Result<Json<DecryptResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        state.metrics.record_decrypt(false);
        ApiError::from(rejection)
    })?;
    let result = state
        .service
        .decrypt_with_key(&request.encryption_key, &request.ciphertext);
    state.metrics.record_decrypt(result.is_ok());

    let plaintext = result.map_err(|e| {
        warn!("Decryption failed: {}", e);
        ApiError::from(e)
    })?;

    let prefix: String = request.encryption_key.chars().take(10).collect();
    Ok(Json(DecryptResponse {
        status: "Decryption successful.",
        key_provided: format!("{}...", prefix),
        plaintext,
    }))
}

/// GET /api/status - Service status
async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let protocol = state.service.config();
    Json(StatusResponse {
        version: qkd_core::VERSION,
        uptime_seconds: state.start_time.elapsed().as_secs(),
        num_qubits: protocol.num_qubits,
        eve_attack_rate: protocol.eve_attack_rate,
        qber_threshold: protocol.qber_threshold,
        runs_total: state.metrics.runs_total(),
        runs_aborted: state.metrics.runs_aborted(),
        abort_rate: state.metrics.abort_rate(),
        qber_mean: state.metrics.qber_mean(),
        last_run_at: state.metrics.last_run_at(),
    })
}

/// GET /health - Simple health check
async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// GET /metrics - Prometheus metrics
async fn get_metrics(State(state): State<AppState>) -> Response {
    if !state.config.metrics_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    (
        StatusCode::OK,
        [(hyper::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.prometheus_format(),
    )
        .into_response()
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/qkd/encrypt", get(encrypt_with_qkd_key))
        .route("/api/qkd/decrypt", post(decrypt_message))
        .route("/api/status", get(get_status))
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Initialize tracing
    let log_level = args.log_level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .json()
        .init();

    info!("QKD Gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = if args.env_mode {
        info!("Loading configuration from environment variables");
        GatewayConfig::from_env().context("Failed to load configuration from environment")?
    } else {
        info!("Loading configuration from file: {:?}", args.config);
        GatewayConfig::from_file(&args.config).context("Failed to load configuration from file")?
    };

    info!(
        "Protocol: {} qubits, eve attack rate {}, QBER threshold {}",
        config.protocol.num_qubits, config.protocol.eve_attack_rate, config.protocol.qber_threshold
    );
    info!("Listen address: {}", config.listen_address);

    let addr: std::net::SocketAddr =
        config.listen_address.parse().context("Invalid listen address")?;

    let state = AppState::new(config).context("Failed to initialize QKD service")?;
    let app = build_router(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
