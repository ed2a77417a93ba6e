use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::config::RealtimeSettings;
use crate::hub::Hub;
use crate::session::Authenticator;
use crate::store::ChatRepository;
use crate::websockets::EventRouter;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub router: Arc<EventRouter>,
    pub repository: Arc<dyn ChatRepository>,
    pub authenticator: Arc<dyn Authenticator>,
    pub realtime: RealtimeSettings,
    /// Origins trusted to open the WebSocket besides the server's own host
    pub allowed_origins: Arc<[String]>,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn ChatRepository>,
        authenticator: Arc<dyn Authenticator>,
        realtime: RealtimeSettings,
    ) -> Self {
        let hub = Hub::new(repository.clone(), realtime.hub.clone());
        let router = Arc::new(EventRouter::new(
            hub.clone(),
            repository.clone(),
            realtime.protocol.clone(),
            realtime.hub.store_timeout,
        ));

        Self {
            hub,
            router,
            repository,
            authenticator,
            realtime,
            allowed_origins: Arc::from(Vec::new()),
        }
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Arc::from(origins);
        self
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Internal server error")]
    Internal,
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::JwtError(_) => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            AppError::DatabaseError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", msg),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, format!("Timed out: {}", msg)),
            AppError::Configuration(_) | AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
