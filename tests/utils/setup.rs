#![allow(dead_code)] // Test utilities may not all be used in every test

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use openvoice::config::{HubSettings, ProtocolLimits};
use openvoice::hub::{ConnectionHandle, Hub, OutboundQueue};
use openvoice::session::UserIdentity;
use openvoice::store::ChatRepository;
use openvoice::websockets::{EventRouter, MessageHandler};

use super::mocks::MockChatRepository;

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

/// One registered connection as seen by a test: its handle plus the frames
/// queued for it
pub struct TestClient {
    pub handle: Arc<ConnectionHandle>,
    queue: Mutex<OutboundQueue>,
}

impl TestClient {
    pub fn user_id(&self) -> i64 {
        self.handle.user().user_id
    }

    /// Takes every frame queued so far, decoded as JSON
    pub fn take_frames(&self) -> Vec<Value> {
        self.queue
            .lock()
            .unwrap()
            .drain()
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }

    /// Takes the next queued frame as raw text
    pub fn take_raw(&self) -> Option<String> {
        self.queue.lock().unwrap().try_recv()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.lock().unwrap().is_closed()
    }
}

pub struct TestSetup {
    pub hub: Hub,
    pub router: Arc<EventRouter>,
    pub repository: Arc<MockChatRepository>,
    channels: HashMap<String, i64>,
}

impl TestSetup {
    pub fn channel(&self, name: &str) -> i64 {
        self.channels[name]
    }

    pub fn connect(&self, user_id: i64, username: &str) -> TestClient {
        let (handle, queue) = self.hub.register(UserIdentity::new(user_id, username));
        TestClient {
            handle,
            queue: Mutex::new(queue),
        }
    }

    pub async fn send(&self, client: &TestClient, frame: Value) {
        self.send_raw(client, frame.to_string().as_bytes()).await;
    }

    pub async fn send_raw(&self, client: &TestClient, frame: &[u8]) {
        self.router.handle_message(&client.handle, frame).await;
    }

    pub async fn join_channel(&self, client: &TestClient, channel_id: i64) {
        self.send(client, json!({ "type": "join_channel", "channel_id": channel_id }))
            .await;
    }

    pub async fn send_message(&self, client: &TestClient, content: &str) {
        self.send(client, json!({ "type": "send_message", "content": content }))
            .await;
    }

    pub async fn join_voice(&self, client: &TestClient, channel_id: i64) {
        self.send(client, json!({ "type": "join_voice", "channel_id": channel_id }))
            .await;
    }

    pub async fn leave_voice(&self, client: &TestClient) {
        self.send(client, json!({ "type": "leave_voice" })).await;
    }

    pub async fn signal(&self, client: &TestClient, target_id: &str, payload: Value) {
        self.send(
            client,
            json!({ "type": "signal", "target_id": target_id, "payload": payload }),
        )
        .await;
    }

    pub async fn store_message(&self, channel_id: i64, author: &str, content: &str) {
        self.repository
            .create_message(&UserIdentity::new(1000, author), channel_id, content)
            .await
            .unwrap();
    }

    pub fn disconnect(&self, client: &TestClient) {
        self.hub.disconnect(client.handle.id());
    }
}

pub struct TestSetupBuilder {
    channels: Vec<String>,
    hub: HubSettings,
    limits: ProtocolLimits,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            channels: vec!["general".to_string()],
            hub: HubSettings::default(),
            limits: ProtocolLimits::default(),
        }
    }

    pub fn with_channels(mut self, channels: Vec<&str>) -> Self {
        self.channels = channels.into_iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.hub.outbound_queue_capacity = capacity;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.hub.store_timeout = timeout;
        self
    }

    pub fn with_history_limit(mut self, limit: i64) -> Self {
        self.limits.history_limit = limit;
        self
    }

    pub fn with_max_message_bytes(mut self, max: usize) -> Self {
        self.limits.max_message_bytes = max;
        self
    }

    pub async fn build(self) -> TestSetup {
        let repository = Arc::new(MockChatRepository::new());

        let mut channels = HashMap::new();
        for name in &self.channels {
            let channel = repository.ensure_channel(name, "text").await.unwrap();
            channels.insert(name.clone(), channel.id);
        }

        let hub = Hub::new(repository.clone(), self.hub.clone());
        let router = Arc::new(EventRouter::new(
            hub.clone(),
            repository.clone(),
            self.limits,
            self.hub.store_timeout,
        ));

        TestSetup {
            hub,
            router,
            repository,
            channels,
        }
    }
}
