// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock media fetcher with scripted outcomes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use wabridge_core::types::{AdapterType, HealthStatus, MediaPayload};
use wabridge_core::{MediaFetcher, PluginAdapter, WabridgeError};

use crate::lock;

#[derive(Default)]
struct FetcherState {
    outcomes: VecDeque<Result<MediaPayload, WabridgeError>>,
    requested: Vec<String>,
    delay: Duration,
}

/// A media fetcher that answers from a script.
///
/// Each `fetch()` consumes the next scripted outcome. With the script empty
/// it fails with a retryable error.
#[derive(Clone, Default)]
pub struct MockMediaFetcher {
    state: Arc<Mutex<FetcherState>>,
}

impl MockMediaFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_outcome(&self, outcome: Result<MediaPayload, WabridgeError>) {
        lock(&self.state).outcomes.push_back(outcome);
    }

    /// Makes every fetch take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        lock(&self.state).delay = delay;
    }

    /// Number of `fetch()` calls so far, counted when they start.
    pub fn call_count(&self) -> usize {
        lock(&self.state).requested.len()
    }

    /// Media references requested so far.
    pub fn requested(&self) -> Vec<String> {
        lock(&self.state).requested.clone()
    }

    /// A small JPEG-typed payload for tests.
    pub fn sample_payload() -> MediaPayload {
        MediaPayload {
            data: vec![0xFF, 0xD8, 0xFF, 0xE0],
            mime_type: "image/jpeg".into(),
            file_name: "photo.jpg".into(),
        }
    }
}

#[async_trait]
impl PluginAdapter for MockMediaFetcher {
    fn name(&self) -> &str {
        "mock-media"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::MediaFetcher
    }

    async fn health_check(&self) -> Result<HealthStatus, WabridgeError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WabridgeError> {
        Ok(())
    }
}

#[async_trait]
impl MediaFetcher for MockMediaFetcher {
    async fn fetch(&self, media_ref: &str, _max_bytes: u64) -> Result<MediaPayload, WabridgeError> {
        let delay = {
            let mut state = lock(&self.state);
            state.requested.push(media_ref.to_string());
            state.delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        lock(&self.state).outcomes.pop_front().unwrap_or_else(|| {
            Err(WabridgeError::MediaFetchFailed {
                message: format!("no scripted outcome for {media_ref}"),
                source: None,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outcomes_are_consumed_in_order() {
        let fetcher = MockMediaFetcher::new();
        fetcher.push_outcome(Ok(MockMediaFetcher::sample_payload()));

        assert!(fetcher.fetch("blob:1", 1024).await.is_ok());
        let err = fetcher.fetch("blob:2", 1024).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(fetcher.requested(), vec!["blob:1", "blob:2"]);
    }
}
