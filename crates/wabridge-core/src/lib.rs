// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the wabridge WhatsApp-to-Telegram forwarder.
//!
//! This crate provides the domain types, the error taxonomy, and the adapter
//! traits at the pipeline's edges: the raw event source, the media fetcher,
//! the delivery sink, and the storage backend.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::WabridgeError;
pub use types::{AdapterType, HealthStatus, MessageIdentity, SinkMessageId};

pub use traits::{DeliverySink, MediaFetcher, PluginAdapter, RawEventSource, StorageAdapter};
