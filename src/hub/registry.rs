use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::connection::{ConnectionHandle, ConnectionId, EnqueueResult, OutboundQueue};
use super::errors::HubError;
use crate::config::HubSettings;
use crate::session::UserIdentity;
use crate::store::{with_timeout, ChatRepository};
use crate::websockets::{OutboundEvent, VoicePresencePayload};

/// Channel memberships recorded for one connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Membership {
    pub text_channel: Option<i64>,
    pub voice_channel: Option<i64>,
}

struct Member {
    handle: Arc<ConnectionHandle>,
    membership: Membership,
}

/// Everything guarded by the hub lock.
/// Invariant: a connection id is in `channels[c]` iff its member's text channel is `c`.
#[derive(Default)]
struct HubState {
    members: HashMap<ConnectionId, Member>,
    channels: HashMap<i64, HashSet<ConnectionId>>,
}

impl HubState {
    /// Moves a member into `channel_id`, leaving its previous channel in the same step
    fn move_to_channel(&mut self, id: ConnectionId, channel_id: i64) -> bool {
        let Some(member) = self.members.get_mut(&id) else {
            return false;
        };
        let previous = member.membership.text_channel.replace(channel_id);

        if let Some(previous) = previous.filter(|previous| *previous != channel_id) {
            self.detach(id, previous);
        }
        self.channels.entry(channel_id).or_default().insert(id);
        true
    }

    fn detach(&mut self, id: ConnectionId, channel_id: i64) {
        if let Some(members) = self.channels.get_mut(&channel_id) {
            members.remove(&id);
            if members.is_empty() {
                self.channels.remove(&channel_id);
            }
        }
    }

    fn remove_member(&mut self, id: ConnectionId) -> Option<Member> {
        let member = self.members.remove(&id)?;
        if let Some(channel_id) = member.membership.text_channel {
            self.detach(id, channel_id);
        }
        Some(member)
    }

    /// Channel members to tell about a voice join, or `None` once the joiner
    /// no longer holds voice membership in that channel
    fn voice_audience(
        &self,
        id: ConnectionId,
        channel_id: i64,
    ) -> Option<Vec<Arc<ConnectionHandle>>> {
        let member = self.members.get(&id)?;
        (member.membership.voice_channel == Some(channel_id)).then(|| self.snapshot(channel_id))
    }

    fn snapshot(&self, channel_id: i64) -> Vec<Arc<ConnectionHandle>> {
        self.channels
            .get(&channel_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.members.get(id))
            .map(|member| member.handle.clone())
            .collect()
    }
}

/// Process-wide registry of live connections and their channel memberships.
///
/// All state sits behind one mutex that is held only while maps are read or
/// mutated, never across socket I/O or store calls. Cloning is cheap and
/// every clone shares the same registry.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    state: Mutex<HubState>,
    repository: Arc<dyn ChatRepository>,
    settings: HubSettings,
}

impl Hub {
    pub fn new(repository: Arc<dyn ChatRepository>, settings: HubSettings) -> Self {
        Self {
            inner: Arc::new(HubInner {
                state: Mutex::new(HubState::default()),
                repository,
                settings,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        // A panic elsewhere never leaves the maps half-updated, so keep serving
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store_timeout(&self) -> Duration {
        self.inner.settings.store_timeout
    }

    /// Registers a new connection with no channel membership
    pub fn register(&self, user: UserIdentity) -> (Arc<ConnectionHandle>, OutboundQueue) {
        let (handle, queue) =
            ConnectionHandle::new(user, self.inner.settings.outbound_queue_capacity);

        self.state().members.insert(
            handle.id(),
            Member {
                handle: handle.clone(),
                membership: Membership::default(),
            },
        );

        info!(
            connection_id = %handle.id(),
            user_id = handle.user().user_id,
            "Connection registered"
        );
        (handle, queue)
    }

    /// Makes `channel_id` the connection's only text channel.
    /// The channel must exist in the store.
    #[instrument(skip(self, connection), fields(connection_id = %connection.id()))]
    pub async fn join_text_channel(
        &self,
        connection: &ConnectionHandle,
        channel_id: i64,
    ) -> Result<(), HubError> {
        self.ensure_channel_exists(channel_id).await?;

        if !self.state().move_to_channel(connection.id(), channel_id) {
            return Err(HubError::ConnectionClosed);
        }

        debug!(channel_id, "Joined text channel");
        Ok(())
    }

    async fn ensure_channel_exists(&self, channel_id: i64) -> Result<(), HubError> {
        if channel_id <= 0 {
            return Err(HubError::InvalidChannel);
        }

        let exists = with_timeout(
            self.store_timeout(),
            "channel_exists",
            self.inner.repository.channel_exists(channel_id),
        )
        .await
        .map_err(HubError::ChannelLookupFailed)?;

        if exists {
            Ok(())
        } else {
            Err(HubError::ChannelNotFound)
        }
    }

    /// Joins the text channel first so signaling has a route, then records
    /// the voice membership and announces it to the channel
    #[instrument(skip(self, connection), fields(connection_id = %connection.id()))]
    pub async fn join_voice(
        &self,
        connection: &ConnectionHandle,
        channel_id: i64,
    ) -> Result<(), HubError> {
        self.join_text_channel(connection, channel_id).await?;

        let previous = {
            let mut state = self.state();
            let member = state
                .members
                .get_mut(&connection.id())
                .ok_or(HubError::ConnectionClosed)?;
            member.membership.voice_channel.replace(channel_id)
        };

        if let Some(previous) = previous.filter(|previous| *previous != channel_id) {
            self.announce_voice_leave(connection.user(), previous);
        }

        // A teardown or a later voice move may have run since the field was set
        let Some(audience) = self.state().voice_audience(connection.id(), channel_id) else {
            debug!(channel_id, "Voice membership gone before join was announced");
            return Err(HubError::ConnectionClosed);
        };

        let joined = OutboundEvent::UserJoinedVoice(VoicePresencePayload::new(
            connection.user(),
            channel_id,
        ));
        match joined.encode() {
            Ok(payload) => {
                for member in &audience {
                    self.deliver(member, payload.clone());
                }
            }
            Err(e) => warn!(channel_id, error = %e, "Failed to encode voice join"),
        }

        info!(
            user_id = connection.user().user_id,
            channel_id, "User joined voice channel"
        );
        Ok(())
    }

    /// Leaves the recorded voice channel. An explicit channel that differs
    /// from the recorded one, or no voice membership at all, is a silent no-op.
    #[instrument(skip(self, connection), fields(connection_id = %connection.id()))]
    pub fn leave_voice(&self, connection: &ConnectionHandle, channel_id: Option<i64>) -> bool {
        let left = {
            let mut state = self.state();
            let Some(member) = state.members.get_mut(&connection.id()) else {
                return false;
            };
            let recorded = member.membership.voice_channel;
            match channel_id.filter(|id| *id > 0) {
                Some(requested) if Some(requested) != recorded => {
                    debug!(requested, ?recorded, "Ignoring leave for a voice channel not held");
                    None
                }
                _ => member.membership.voice_channel.take(),
            }
        };

        match left {
            Some(channel_id) => {
                self.announce_voice_leave(connection.user(), channel_id);
                true
            }
            None => false,
        }
    }

    fn announce_voice_leave(&self, user: &UserIdentity, channel_id: i64) {
        let event = OutboundEvent::LeaveVoice(VoicePresencePayload::new(user, channel_id));
        self.broadcast_event(channel_id, &event);
        info!(user_id = user.user_id, channel_id, "User left voice channel");
    }

    /// Tears a connection down: removes it from every mapping, announces a
    /// voice leave if it held one and signals its loops to stop.
    /// Safe to call any number of times; only the first call has an effect.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let Some(member) = self.state().remove_member(id) else {
            return false;
        };

        if let Some(voice_channel) = member.membership.voice_channel {
            self.announce_voice_leave(member.handle.user(), voice_channel);
        }
        member.handle.close();

        info!(
            connection_id = %id,
            user_id = member.handle.user().user_id,
            "Connection removed from hub"
        );
        true
    }

    /// Offers `payload` to every current member of the channel.
    /// Members whose queue is full are evicted; the rest still get the frame.
    /// Returns how many members accepted it.
    pub fn broadcast(&self, channel_id: i64, payload: &str) -> usize {
        let members = self.state().snapshot(channel_id);

        let delivered = members
            .iter()
            .filter(|member| self.deliver(member, payload.to_string()))
            .count();

        debug!(
            channel_id,
            recipients = members.len(),
            delivered,
            "Broadcast to channel"
        );
        delivered
    }

    pub fn broadcast_event(&self, channel_id: i64, event: &OutboundEvent) -> usize {
        match event.encode() {
            Ok(payload) => self.broadcast(channel_id, &payload),
            Err(e) => {
                warn!(channel_id, error = %e, event_type = event.event_type(), "Failed to encode event");
                0
            }
        }
    }

    /// Offers `payload` to a single connection under the same eviction policy as broadcast
    pub fn send_to(&self, connection: &ConnectionHandle, payload: String) -> bool {
        self.deliver(connection, payload)
    }

    fn deliver(&self, connection: &ConnectionHandle, payload: String) -> bool {
        match connection.try_enqueue(payload) {
            EnqueueResult::Enqueued => true,
            EnqueueResult::Full => {
                warn!(
                    connection_id = %connection.id(),
                    user_id = connection.user().user_id,
                    "Outbound queue full, evicting slow consumer"
                );
                self.disconnect(connection.id());
                false
            }
            EnqueueResult::Closed => {
                self.disconnect(connection.id());
                false
            }
        }
    }

    pub fn membership(&self, id: ConnectionId) -> Option<Membership> {
        self.state().members.get(&id).map(|member| member.membership)
    }

    pub fn text_channel_of(&self, id: ConnectionId) -> Option<i64> {
        self.membership(id).and_then(|m| m.text_channel)
    }

    pub fn voice_channel_of(&self, id: ConnectionId) -> Option<i64> {
        self.membership(id).and_then(|m| m.voice_channel)
    }

    /// Connections currently in the channel's text membership, in id order
    pub fn channel_members(&self, channel_id: i64) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> = self
            .state()
            .channels
            .get(&channel_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// User ids holding voice membership in any channel
    pub fn voice_user_ids(&self) -> BTreeSet<i64> {
        self.state()
            .members
            .values()
            .filter(|member| member.membership.voice_channel.is_some())
            .map(|member| member.handle.user().user_id)
            .collect()
    }

    /// Users in the voice session of one channel, one entry per user
    pub fn voice_participants(&self, channel_id: i64) -> Vec<UserIdentity> {
        let mut participants: Vec<UserIdentity> = self
            .state()
            .members
            .values()
            .filter(|member| member.membership.voice_channel == Some(channel_id))
            .map(|member| member.handle.user().clone())
            .collect();
        participants.sort_by_key(|user| user.user_id);
        participants.dedup_by_key(|user| user.user_id);
        participants
    }

    pub fn connection_count(&self) -> usize {
        self.state().members.len()
    }
}
