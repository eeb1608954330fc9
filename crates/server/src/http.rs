//! HTTP endpoints
//!
//! Provider webhooks, outbound call placement, health and metrics.

use axum::{
    extract::{Form, Json, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use voice_bridge_transport::{connect_stream_twiml, CallStatusUpdate};

use crate::media_stream::media_stream_handler;
use crate::metrics::metrics_handler;
use crate::state::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.read();
    let cors_layer = build_cors_layer(&config.server.cors_origins, config.server.cors_enabled);
    drop(config);

    Router::new()
        .route("/health", get(health_check))
        .route("/incoming-call", get(incoming_call).post(incoming_call))
        .route("/call-status", post(call_status))
        .route("/make-call", post(make_call))
        .route("/media-stream", get(media_stream_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        return CorsLayer::permissive();
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Health check
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "active_sessions": state.registry.count(),
    }))
}

/// Voice webhook: answer with TwiML that connects the call to the
/// media-stream WebSocket
async fn incoming_call(State(state): State<AppState>) -> impl IntoResponse {
    let public_host = state.config.read().server.public_host.clone();
    tracing::info!("Incoming call webhook");
    (
        [(header::CONTENT_TYPE, "text/xml")],
        connect_stream_twiml(&public_host),
    )
}

/// Provider status callback (form-encoded)
async fn call_status(
    State(state): State<AppState>,
    Form(update): Form<CallStatusUpdate>,
) -> StatusCode {
    tracing::info!(
        call_sid = %update.call_sid,
        status = %update.call_status,
        duration = ?update.call_duration,
        "Call status callback"
    );
    state
        .registry
        .update_call_status(update.call_sid, update.call_status);
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct MakeCallRequest {
    phone_number: String,
}

#[derive(Debug, Serialize)]
struct MakeCallResponse {
    call_sid: String,
}

/// Place an outbound call
async fn make_call(
    State(state): State<AppState>,
    Json(request): Json<MakeCallRequest>,
) -> Result<Json<MakeCallResponse>, StatusCode> {
    if request.phone_number.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let public_host = state.config.read().server.public_host.clone();
    let call_sid = state
        .call_control
        .place_call(&request.phone_number, &public_host)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Outbound call failed");
            StatusCode::from(crate::ServerError::CallControl(e))
        })?;

    Ok(Json(MakeCallResponse { call_sid }))
}
