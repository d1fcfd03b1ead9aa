// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for pipeline integration testing.
//!
//! `TestHarness` wires the mock adapters to a real SQLite database in a
//! temp directory, with a configuration tuned for millisecond-scale tests.

use std::path::PathBuf;
use std::sync::Arc;

use wabridge_config::model::{MediaPolicy, WabridgeConfig};
use wabridge_core::{DeliverySink, MediaFetcher, RawEventSource, StorageAdapter, WabridgeError};
use wabridge_storage::SqliteStorage;

use crate::mock_media::MockMediaFetcher;
use crate::mock_sink::MockSink;
use crate::mock_source::MockSource;

/// A configuration with short timers, suitable for tests.
pub fn fast_config() -> WabridgeConfig {
    let mut config = WabridgeConfig::default();
    config.source.scan_interval_ms = 10;
    config.ordering.quiescence_ms = 50;
    config.ordering.max_pending_per_chat = 100;
    config.media.max_attempts = 3;
    config.media.backoff_base_ms = 5;
    config.media.backoff_max_ms = 20;
    config.media.fetch_timeout_secs = 5;
    config.media.hold_timeout_secs = 5;
    config.media.policy = MediaPolicy::Hold;
    config.delivery.min_interval_ms = 0;
    config.delivery.max_attempts = 3;
    config.delivery.backoff_base_ms = 5;
    config.delivery.backoff_max_ms = 20;
    config
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    source: MockSource,
    sink: MockSink,
    fetcher: MockMediaFetcher,
    config: WabridgeConfig,
    database_path: Option<PathBuf>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            source: MockSource::new(),
            sink: MockSink::new(),
            fetcher: MockMediaFetcher::new(),
            config: fast_config(),
            database_path: None,
        }
    }

    pub fn source(mut self, source: MockSource) -> Self {
        self.source = source;
        self
    }

    pub fn sink(mut self, sink: MockSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn fetcher(mut self, fetcher: MockMediaFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replace the configuration. The database path is still set by the harness.
    pub fn config(mut self, config: WabridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing database file instead of a fresh temp one.
    ///
    /// Two harnesses built on the same path simulate a process restart.
    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.database_path = Some(path);
        self
    }

    /// Build the test harness and initialize its storage.
    pub async fn build(self) -> Result<TestHarness, WabridgeError> {
        let (temp_dir, db_path) = match self.database_path {
            Some(path) => (None, path),
            None => {
                let temp_dir = tempfile::TempDir::new().map_err(WabridgeError::persistence)?;
                let path = temp_dir.path().join("test.db");
                (Some(temp_dir), path)
            }
        };

        let mut config = self.config;
        config.storage.database_path = db_path.to_string_lossy().to_string();
        config.storage.wal_mode = true;

        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;

        Ok(TestHarness {
            storage: Arc::new(storage),
            mock_source: self.source,
            mock_sink: self.sink,
            mock_fetcher: self.fetcher,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// Mock adapters plus an initialized SQLite store.
pub struct TestHarness {
    storage: Arc<SqliteStorage>,
    pub mock_source: MockSource,
    pub mock_sink: MockSink,
    pub mock_fetcher: MockMediaFetcher,
    config: WabridgeConfig,
    // Dropped last so the database file outlives the storage handle.
    _temp_dir: Option<tempfile::TempDir>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn storage(&self) -> Arc<dyn StorageAdapter> {
        self.storage.clone()
    }

    pub fn source(&self) -> Arc<dyn RawEventSource> {
        Arc::new(self.mock_source.clone())
    }

    pub fn sink(&self) -> Arc<dyn DeliverySink> {
        Arc::new(self.mock_sink.clone())
    }

    pub fn fetcher(&self) -> Arc<dyn MediaFetcher> {
        Arc::new(self.mock_fetcher.clone())
    }

    pub fn config(&self) -> &WabridgeConfig {
        &self.config
    }

    /// Checkpoint the database, as a clean shutdown would.
    pub async fn close(&self) -> Result<(), WabridgeError> {
        self.storage.close().await
    }
}
