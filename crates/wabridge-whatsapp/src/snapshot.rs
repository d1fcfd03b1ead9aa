// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Snapshot-file raw event source.
//!
//! The external WhatsApp Web scraper rewrites one file with the messages
//! currently visible in the browser, either as a JSON array or as JSON
//! lines. Each scan re-reads the whole file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use wabridge_config::model::SourceConfig;
use wabridge_core::types::{AdapterType, HealthStatus, RawRecord};
use wabridge_core::{PluginAdapter, RawEventSource, WabridgeError};

/// Reads raw records from the scraper's snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotFileSource {
    path: PathBuf,
}

impl SnapshotFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(&config.snapshot_path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parses snapshot file content.
///
/// A JSON array must be valid JSON as a whole, but an element that is not a
/// record is dropped on its own. In JSON-lines mode each line stands alone.
pub fn parse_snapshot(content: &str) -> Result<Vec<RawRecord>, WabridgeError> {
    let trimmed = content.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        let values: Vec<serde_json::Value> =
            serde_json::from_str(trimmed).map_err(|e| WabridgeError::Source {
                message: format!("snapshot is not a valid JSON array: {e}"),
                source: Some(Box::new(e)),
            })?;
        let records = values
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(index, error = %e, "dropping unparseable snapshot record");
                    None
                }
            })
            .collect();
        return Ok(records);
    }

    let records = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(index, line)| match serde_json::from_str(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(line = index + 1, error = %e, "dropping unparseable snapshot line");
                None
            }
        })
        .collect();
    Ok(records)
}

#[async_trait]
impl PluginAdapter for SnapshotFileSource {
    fn name(&self) -> &str {
        "snapshot-file"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Source
    }

    async fn health_check(&self) -> Result<HealthStatus, WabridgeError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HealthStatus::Degraded(
                format!("snapshot file {} not written yet", self.path.display()),
            )),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "snapshot file {} unreadable: {e}",
                self.path.display()
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), WabridgeError> {
        Ok(())
    }
}

#[async_trait]
impl RawEventSource for SnapshotFileSource {
    async fn scan(&self) -> Result<Vec<RawRecord>, WabridgeError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no snapshot yet");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(WabridgeError::Source {
                    message: format!("failed to read {}: {e}", self.path.display()),
                    source: Some(Box::new(e)),
                });
            }
        };
        parse_snapshot(&content)
    }
}
