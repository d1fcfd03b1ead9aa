// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the pipeline's external edges.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod media;
pub mod sink;
pub mod source;
pub mod storage;

pub use adapter::PluginAdapter;
pub use media::MediaFetcher;
pub use sink::DeliverySink;
pub use source::RawEventSource;
pub use storage::StorageAdapter;
