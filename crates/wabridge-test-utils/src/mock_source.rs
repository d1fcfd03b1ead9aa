// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock raw event source with scripted snapshots.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use wabridge_core::types::{AdapterType, HealthStatus, RawRecord};
use wabridge_core::{PluginAdapter, RawEventSource, WabridgeError};

use crate::lock;

enum ScanStep {
    Snapshot(Vec<RawRecord>),
    Failure(String),
}

#[derive(Default)]
struct SourceState {
    script: VecDeque<ScanStep>,
    current: Vec<RawRecord>,
    scans: usize,
}

/// A source that replays scripted snapshots.
///
/// Each `scan()` consumes the next scripted step. Once the script runs out,
/// the last snapshot is returned again, like a chat view that stopped changing.
#[derive(Clone, Default)]
pub struct MockSource {
    state: Arc<Mutex<SourceState>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a snapshot.
    pub fn push_scan(&self, records: Vec<RawRecord>) {
        lock(&self.state).script.push_back(ScanStep::Snapshot(records));
    }

    /// Queues a failing scan.
    pub fn push_failure(&self, message: &str) {
        lock(&self.state)
            .script
            .push_back(ScanStep::Failure(message.to_string()));
    }

    /// Number of `scan()` calls so far.
    pub fn scan_count(&self) -> usize {
        lock(&self.state).scans
    }

    /// Whether every scripted step has been consumed.
    pub fn script_exhausted(&self) -> bool {
        lock(&self.state).script.is_empty()
    }
}

#[async_trait]
impl PluginAdapter for MockSource {
    fn name(&self) -> &str {
        "mock-source"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Source
    }

    async fn health_check(&self) -> Result<HealthStatus, WabridgeError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WabridgeError> {
        Ok(())
    }
}

#[async_trait]
impl RawEventSource for MockSource {
    async fn scan(&self) -> Result<Vec<RawRecord>, WabridgeError> {
        let mut state = lock(&self.state);
        state.scans += 1;
        match state.script.pop_front() {
            Some(ScanStep::Snapshot(records)) => {
                state.current = records.clone();
                Ok(records)
            }
            Some(ScanStep::Failure(message)) => Err(WabridgeError::Source {
                message,
                source: None,
            }),
            None => Ok(state.current.clone()),
        }
    }
}
