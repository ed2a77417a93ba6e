use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{info, instrument, warn};

use crate::shared::{AppError, AppState};

/// Session authentication middleware - resolves the caller through the app's
/// authenticator and adds its `UserIdentity` to the request.
/// Usage: .layer(middleware::from_fn_with_state(app_state.clone(), session::require_identity))
/// Handlers can then extract Extension(identity): Extension<UserIdentity>.
#[instrument(skip(state, req, next))]
pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let headers = req.headers().clone();
    let identity = match state.authenticator.authenticate(&headers).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(uri = %req.uri(), "Authentication failed: {}", e);
            return Err(e);
        }
    };

    info!(
        user_id = identity.user_id,
        username = %identity.username,
        "Authentication successful, adding identity to request"
    );

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}
