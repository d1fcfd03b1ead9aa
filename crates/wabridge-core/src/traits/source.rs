// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Raw event source trait for snapshot-producing scrapers.

use async_trait::async_trait;

use crate::error::WabridgeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::RawRecord;

/// A polling source of message snapshots.
///
/// Each call to [`scan`](RawEventSource::scan) returns the messages currently
/// visible. Snapshots are not diffs: records may repeat across scans, appear
/// in any order, or be omitted.
#[async_trait]
pub trait RawEventSource: PluginAdapter {
    /// Takes one snapshot of visible messages.
    async fn scan(&self) -> Result<Vec<RawRecord>, WabridgeError>;
}
