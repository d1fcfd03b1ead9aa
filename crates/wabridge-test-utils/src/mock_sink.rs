// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock delivery sink with scripted failures and captured requests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use wabridge_core::types::{AdapterType, DeliveryRequest, HealthStatus, SinkMessageId};
use wabridge_core::{DeliverySink, PluginAdapter, WabridgeError};

use crate::lock;

#[derive(Default)]
struct SinkState {
    failures: VecDeque<WabridgeError>,
    attempts: Vec<DeliveryRequest>,
    sent: Vec<DeliveryRequest>,
}

/// A sink that fails as scripted, then accepts everything.
///
/// Scripted failures are consumed one per `deliver()` call, in order.
#[derive(Clone, Default)]
pub struct MockSink {
    state: Arc<Mutex<SinkState>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an error for the next unanswered `deliver()` call.
    pub fn push_failure(&self, error: WabridgeError) {
        lock(&self.state).failures.push_back(error);
    }

    /// Requests the sink accepted, in order.
    pub fn sent(&self) -> Vec<DeliveryRequest> {
        lock(&self.state).sent.clone()
    }

    /// Bodies of accepted requests, in order.
    pub fn sent_bodies(&self) -> Vec<String> {
        lock(&self.state).sent.iter().map(|r| r.body.clone()).collect()
    }

    /// Total `deliver()` calls, failed ones included.
    pub fn call_count(&self) -> usize {
        lock(&self.state).attempts.len()
    }
}

#[async_trait]
impl PluginAdapter for MockSink {
    fn name(&self) -> &str {
        "mock-sink"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Sink
    }

    async fn health_check(&self) -> Result<HealthStatus, WabridgeError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WabridgeError> {
        Ok(())
    }
}

#[async_trait]
impl DeliverySink for MockSink {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<SinkMessageId, WabridgeError> {
        let mut state = lock(&self.state);
        state.attempts.push(request.clone());
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        state.sent.push(request.clone());
        Ok(SinkMessageId(format!("mock-{}", state.sent.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: &str) -> DeliveryRequest {
        DeliveryRequest {
            chat_label: "Family".into(),
            sender_label: "Alice (unknown)".into(),
            body: body.into(),
            media: None,
        }
    }

    #[tokio::test]
    async fn scripted_failures_come_first() {
        let sink = MockSink::new();
        sink.push_failure(WabridgeError::SinkPermanent {
            message: "blocked".into(),
            source: None,
        });

        assert!(sink.deliver(&request("one")).await.is_err());
        let id = sink.deliver(&request("one")).await.unwrap();
        assert_eq!(id, SinkMessageId("mock-1".into()));
        assert_eq!(sink.call_count(), 2);
        assert_eq!(sink.sent_bodies(), vec!["one".to_string()]);
    }
}
