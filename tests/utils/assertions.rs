//! Test assertion helpers - fluent API for verifying test expectations
#![allow(dead_code)] // Test utilities may not all be used in every test

use serde_json::Value;

use super::setup::TestClient;

// ============================================================================
// Assertion Helpers
// ============================================================================

pub struct FrameAssertion<'a> {
    clients: Vec<(&'a str, &'a TestClient)>,
}

impl<'a> FrameAssertion<'a> {
    /// Create an assertion for the given named clients
    pub fn for_clients(clients: Vec<(&'a str, &'a TestClient)>) -> Self {
        Self { clients }
    }

    pub fn for_client(name: &'a str, client: &'a TestClient) -> Self {
        Self::for_clients(vec![(name, client)])
    }

    /// Assert that every client received exactly one frame, of `expected_type`
    /// (consumes the frames)
    pub fn received_type(self, expected_type: &str) -> FrameContent {
        let mut data = vec![];

        for (name, client) in &self.clients {
            let frames = client.take_frames();
            assert_eq!(
                frames.len(),
                1,
                "{} should have received exactly one frame, got {:?}",
                name,
                frames
            );
            assert_eq!(
                frames[0]["type"], expected_type,
                "{} received wrong frame type",
                name
            );
            data.push(frames[0]["data"].clone());
        }

        FrameContent { data }
    }

    /// Assert that every client received an error frame with `message`
    pub fn received_error(self, message: &str) {
        self.received_type("error").verify(|data| {
            assert_eq!(data["message"], message);
        });
    }

    /// Assert that no client has anything queued
    pub fn received_nothing(self) {
        for (name, client) in &self.clients {
            let frames = client.take_frames();
            assert!(
                frames.is_empty(),
                "{} should not have received anything, got {:?}",
                name,
                frames
            );
        }
    }
}

/// The `data` part of the frames one assertion consumed, in client order
pub struct FrameContent {
    pub data: Vec<Value>,
}

impl FrameContent {
    /// Run `check` against each client's frame data
    pub fn verify<F: Fn(&Value)>(self, check: F) -> Self {
        for data in &self.data {
            check(data);
        }
        self
    }

    /// Assert that every client received identical data
    pub fn all_equal(self) -> Self {
        if let Some(first) = self.data.first() {
            for data in &self.data[1..] {
                assert_eq!(data, first, "clients received different frames");
            }
        }
        self
    }

    pub fn first(&self) -> &Value {
        &self.data[0]
    }
}
