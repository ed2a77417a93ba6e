use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    http::{
        header::{HOST, ORIGIN, SEC_WEBSOCKET_PROTOCOL},
        HeaderMap,
    },
    response::Response,
};
use futures::StreamExt;
use tracing::{info, warn};

use super::socket::Connection;
use crate::session::{UserIdentity, WEBSOCKET_PROTOCOL};
use crate::shared::{AppError, AppState};

/// WebSocket endpoint. The caller's origin is checked and the caller is
/// authenticated before the upgrade.
/// GET /api/ws with the session token as a cookie, a Bearer header or a
/// Sec-WebSocket-Protocol value.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(app_state): State<AppState>,
) -> Result<Response, AppError> {
    if !origin_allowed(&headers, &app_state.allowed_origins) {
        warn!(
            origin = ?headers.get(ORIGIN),
            host = ?headers.get(HOST),
            "Rejecting cross-origin WebSocket upgrade"
        );
        return Err(AppError::Unauthorized("origin not allowed".to_string()));
    }

    let user = app_state
        .authenticator
        .authenticate(&headers)
        .await
        .map_err(|e| {
            warn!(error = %e, "Rejecting WebSocket upgrade");
            e
        })?;

    info!(
        user_id = user.user_id,
        username = %user.username,
        "WebSocket authentication successful"
    );

    // The token may ride along as a subprotocol; only the application one is echoed
    let ws = if offers_application_protocol(&headers) {
        ws.protocols([WEBSOCKET_PROTOCOL])
    } else {
        ws
    };

    Ok(ws.on_upgrade(move |socket| handle_websocket_connection(socket, user, app_state)))
}

fn offers_application_protocol(headers: &HeaderMap) -> bool {
    headers
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|protocol| protocol.trim() == WEBSOCKET_PROTOCOL)
}

/// Requests without an Origin (non-browser clients) pass. A browser origin
/// must name this server's host or be one of the configured origins.
fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    let Some(origin) = headers.get(ORIGIN) else {
        return true;
    };
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    if allowed.iter().any(|trusted| trusted == origin) {
        return true;
    }

    let authority = origin
        .split_once("://")
        .map_or(origin, |(_, authority)| authority)
        .trim_end_matches('/');
    headers
        .get(HOST)
        .and_then(|host| host.to_str().ok())
        .is_some_and(|host| host.eq_ignore_ascii_case(authority))
}

/// Handle the upgraded WebSocket connection
async fn handle_websocket_connection(socket: WebSocket, user: UserIdentity, app_state: AppState) {
    let (handle, outbound) = app_state.hub.register(user);
    let connection_id = handle.id();
    let user_id = handle.user().user_id;

    let (sink, stream) = socket.split();
    let connection = Connection::new(
        handle,
        app_state.hub.clone(),
        app_state.router.clone(),
        app_state.realtime.connection.clone(),
    );

    match connection.run(sink, stream, outbound).await {
        Ok(()) => info!(%connection_id, user_id, "WebSocket connection closed cleanly"),
        Err(e) => warn!(%connection_id, user_id, error = %e, "WebSocket connection error"),
    }
}
