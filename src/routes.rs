use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{instrument, warn};

use crate::presence;
use crate::session;
use crate::shared::AppState;
use crate::websockets::websocket_handler;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub db: String,
}

/// HTTP handler reporting process and store health
///
/// GET /api/health
#[instrument(name = "health", skip(state))]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = match state.repository.health_check().await {
        Ok(()) => "connected",
        Err(e) => {
            warn!(error = %e, "Store health check failed");
            "disconnected"
        }
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        db: db.to_string(),
    })
}

/// Builds the full HTTP surface: health, the WebSocket endpoint and the
/// authenticated presence queries
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let authenticated = Router::new()
        .route("/api/presence", get(presence::get_presence))
        .route(
            "/api/channels/:id/voice",
            get(presence::get_voice_participants),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_identity,
        ));

    Router::new()
        .route("/api/health", get(health))
        .route("/api/ws", get(websocket_handler))
        .merge(authenticated)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
