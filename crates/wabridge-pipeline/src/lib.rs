// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The wabridge forwarding core.
//!
//! Scraped WhatsApp Web snapshots flow through the [`Normalizer`], the
//! [`DedupStore`] gate and the per-chat [`OrderingBuffer`], then through the
//! [`MediaResolver`] and the rate-limited [`DeliveryDispatcher`] to the sink.
//! [`Pipeline`] wires the stages into concurrent tasks; [`HistoryReader`]
//! exposes the read-only history queries.

pub mod backoff;
pub mod contacts;
pub mod dedup;
pub mod dispatcher;
pub mod format;
pub mod media;
pub mod normalizer;
pub mod ordering;
pub mod pipeline;
pub mod query;
pub mod shutdown;

pub use dedup::DedupStore;
pub use dispatcher::DeliveryDispatcher;
pub use media::MediaResolver;
pub use normalizer::Normalizer;
pub use ordering::OrderingBuffer;
pub use pipeline::{Pipeline, PipelineSettings, RecoveryReport, ScanReport};
pub use query::HistoryReader;
