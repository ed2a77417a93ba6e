use axum::{
    extract::{Path, State},
    Extension, Json,
};
use tracing::{debug, instrument};

use super::types::{PresenceResponse, VoiceParticipantsResponse};
use crate::session::UserIdentity;
use crate::shared::{AppError, AppState};

/// HTTP handler listing who is currently in voice
///
/// GET /api/presence
#[instrument(name = "get_presence", skip(state, caller))]
pub async fn get_presence(
    State(state): State<AppState>,
    Extension(caller): Extension<UserIdentity>,
) -> Json<PresenceResponse> {
    let user_ids: Vec<i64> = state.hub.voice_user_ids().into_iter().collect();
    debug!(caller_id = caller.user_id, online = user_ids.len(), "Presence listed");

    Json(PresenceResponse { user_ids })
}

/// HTTP handler listing the voice session of one channel
///
/// GET /api/channels/:id/voice
#[instrument(name = "get_voice_participants", skip(state, caller))]
pub async fn get_voice_participants(
    State(state): State<AppState>,
    Extension(caller): Extension<UserIdentity>,
    Path(channel_id): Path<i64>,
) -> Result<Json<VoiceParticipantsResponse>, AppError> {
    if channel_id <= 0 {
        return Err(AppError::NotFound("channel not found".to_string()));
    }
    debug!(caller_id = caller.user_id, channel_id, "Voice participants listed");

    Ok(Json(VoiceParticipantsResponse {
        channel_id,
        participants: state.hub.voice_participants(channel_id),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_utils::AppStateBuilder;
    use crate::store::{ChatRepository, InMemoryChatRepository};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot`

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/api/presence", get(get_presence))
            .route("/api/channels/:id/voice", get(get_voice_participants))
            .layer(Extension(UserIdentity::new(99, "caller")))
            .with_state(state)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(app: Router, uri: &str) -> (StatusCode, Option<T>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).ok())
    }

    #[tokio::test]
    async fn test_presence_lists_voice_users_sorted() {
        let repository = Arc::new(InMemoryChatRepository::new());
        let channel = repository.ensure_channel("lounge", "voice").await.unwrap().id;
        let state = AppStateBuilder::new()
            .with_repository(repository)
            .build();

        let (bob, _qb) = state.hub.register(UserIdentity::new(7, "bob"));
        let (alice, _qa) = state.hub.register(UserIdentity::new(3, "alice"));
        let (_carol, _qc) = state.hub.register(UserIdentity::new(5, "carol"));
        state.hub.join_voice(&bob, channel).await.unwrap();
        state.hub.join_voice(&alice, channel).await.unwrap();

        let (status, body) = get_json::<PresenceResponse>(app(state), "/api/presence").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap().user_ids, vec![3, 7]);
    }

    #[tokio::test]
    async fn test_voice_participants_for_channel() {
        let repository = Arc::new(InMemoryChatRepository::new());
        let channel = repository.ensure_channel("lounge", "voice").await.unwrap().id;
        let state = AppStateBuilder::new()
            .with_repository(repository)
            .build();
        let (alice, _qa) = state.hub.register(UserIdentity::new(3, "alice"));
        state.hub.join_voice(&alice, channel).await.unwrap();

        let uri = format!("/api/channels/{}/voice", channel);
        let (status, body) = get_json::<VoiceParticipantsResponse>(app(state), &uri).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body.unwrap(),
            VoiceParticipantsResponse {
                channel_id: channel,
                participants: vec![UserIdentity::new(3, "alice")],
            }
        );
    }

    #[tokio::test]
    async fn test_voice_participants_rejects_invalid_channel() {
        let state = AppStateBuilder::new().build();

        let (status, _) = get_json::<serde_json::Value>(app(state), "/api/channels/0/voice").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
