use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::messages::{
    ChannelHistoryPayload, InboundEvent, InboundEventType, OutboundEvent, SignalPayload,
};
use super::socket::MessageHandler;
use crate::config::ProtocolLimits;
use crate::hub::{ConnectionHandle, Hub, HubError};
use crate::store::{with_timeout, ChatRepository};

/// Decodes inbound frames and turns them into registry and store operations.
/// Every failure is reported to the sending connection only, as an `error` frame.
pub struct EventRouter {
    hub: Hub,
    repository: Arc<dyn ChatRepository>,
    limits: ProtocolLimits,
    store_timeout: Duration,
}

impl EventRouter {
    pub fn new(
        hub: Hub,
        repository: Arc<dyn ChatRepository>,
        limits: ProtocolLimits,
        store_timeout: Duration,
    ) -> Self {
        Self {
            hub,
            repository,
            limits,
            store_timeout,
        }
    }

    /// Handles one frame, returning the failure that should be reported to the sender
    pub async fn dispatch(
        &self,
        connection: &ConnectionHandle,
        frame: &[u8],
    ) -> Result<(), HubError> {
        if frame.len() > self.limits.max_frame_bytes {
            return Err(HubError::FrameTooLarge);
        }

        let event = InboundEvent::parse(frame)?;
        debug!(
            connection_id = %connection.id(),
            event_type = %event.event_type,
            "Dispatching event"
        );

        match event.event_type {
            InboundEventType::JoinChannel => self.join_channel(connection, &event).await,
            InboundEventType::SendMessage => self.send_message(connection, event).await,
            InboundEventType::JoinVoice => {
                self.hub
                    .join_voice(connection, event.channel_id.unwrap_or_default())
                    .await
            }
            InboundEventType::LeaveVoice => {
                self.hub.leave_voice(connection, event.explicit_channel());
                Ok(())
            }
            InboundEventType::Signal => self.signal(connection, event),
            InboundEventType::Unsupported => Err(HubError::UnsupportedEvent),
        }
    }

    async fn join_channel(
        &self,
        connection: &ConnectionHandle,
        event: &InboundEvent,
    ) -> Result<(), HubError> {
        let channel_id = event.channel_id.unwrap_or_default();
        self.hub.join_text_channel(connection, channel_id).await?;

        let messages = with_timeout(
            self.store_timeout,
            "load_recent_messages",
            self.repository
                .load_recent_messages(channel_id, self.limits.history_limit),
        )
        .await
        .map_err(HubError::HistoryUnavailable)?;

        let history = OutboundEvent::ChannelHistory(ChannelHistoryPayload {
            channel_id,
            messages,
        });
        self.hub.send_to(connection, history.encode()?);
        Ok(())
    }

    async fn send_message(
        &self,
        connection: &ConnectionHandle,
        event: InboundEvent,
    ) -> Result<(), HubError> {
        let channel_id = event
            .explicit_channel()
            .or_else(|| self.hub.text_channel_of(connection.id()))
            .ok_or(HubError::InvalidChannel)?;

        let content = event.content.as_deref().unwrap_or_default().trim();
        if content.is_empty() {
            return Err(HubError::EmptyMessage);
        }
        if content.len() > self.limits.max_message_bytes {
            return Err(HubError::MessageTooLong);
        }

        let message = with_timeout(
            self.store_timeout,
            "create_message",
            self.repository
                .create_message(connection.user(), channel_id, content),
        )
        .await
        .map_err(HubError::MessageNotStored)?;

        let message_id = message.id;
        let delivered = self
            .hub
            .broadcast(channel_id, &OutboundEvent::NewMessage(message).encode()?);

        info!(
            user_id = connection.user().user_id,
            channel_id, message_id, delivered, "Message stored and broadcast"
        );
        Ok(())
    }

    fn signal(&self, connection: &ConnectionHandle, event: InboundEvent) -> Result<(), HubError> {
        let channel_id = event
            .explicit_channel()
            .or_else(|| {
                self.hub
                    .membership(connection.id())
                    .and_then(|m| m.voice_channel.or(m.text_channel))
            })
            .ok_or(HubError::SignalChannelRequired)?;

        let payload = event.payload.ok_or(HubError::SignalPayloadRequired)?;
        let user = connection.user();
        let signal = OutboundEvent::Signal(SignalPayload {
            from_user_id: user.user_id,
            from_name: user.username.clone(),
            target_id: event.target_id.unwrap_or_default(),
            channel_id,
            payload,
        });

        self.hub.broadcast(channel_id, &signal.encode()?);
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for EventRouter {
    #[instrument(skip(self, connection, frame), fields(connection_id = %connection.id(), user_id = connection.user().user_id))]
    async fn handle_message(&self, connection: &ConnectionHandle, frame: &[u8]) {
        let Err(e) = self.dispatch(connection, frame).await else {
            return;
        };

        if e.is_collaborator_failure() {
            warn!(error = %e, cause = ?std::error::Error::source(&e), "Store call failed");
        } else {
            debug!(error = %e, "Rejected event");
        }

        match OutboundEvent::error(e.to_string()).encode() {
            Ok(frame) => {
                self.hub.send_to(connection, frame);
            }
            Err(encode_error) => warn!(error = %encode_error, "Failed to encode error event"),
        }
    }
}
