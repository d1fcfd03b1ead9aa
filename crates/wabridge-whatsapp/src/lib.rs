// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp-side adapters for wabridge.
//!
//! Browser automation stays outside this process: a scraper keeps a snapshot
//! file of visible messages up to date and exports media blobs as URLs or
//! files. [`SnapshotFileSource`] reads the snapshot, [`HttpMediaFetcher`]
//! retrieves the media.

pub mod media;
pub mod snapshot;

pub use media::HttpMediaFetcher;
pub use snapshot::SnapshotFileSource;
