// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media fetcher trait for resolving opaque media references.

use async_trait::async_trait;

use crate::error::WabridgeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::MediaPayload;

/// Retrieves the payload behind a message's `media_ref`.
#[async_trait]
pub trait MediaFetcher: PluginAdapter {
    /// Downloads the payload.
    ///
    /// Must fail with [`WabridgeError::MediaTooLarge`] as soon as the payload
    /// is known to exceed `max_bytes`, and with
    /// [`WabridgeError::MediaFetchFailed`] for anything worth retrying.
    async fn fetch(&self, media_ref: &str, max_bytes: u64) -> Result<MediaPayload, WabridgeError>;
}
