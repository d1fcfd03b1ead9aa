// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the wabridge forwarding pipeline.
//!
//! The variants follow the pipeline's failure taxonomy: record-scoped
//! failures (`MalformedRecord`), media-scoped failures that degrade to
//! text-only delivery, sink failures split into transient and permanent,
//! and `PersistenceUnavailable`, the only error that halts the pipeline.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all wabridge adapter traits and pipeline stages.
#[derive(Debug, Error)]
pub enum WabridgeError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// A scraped record could not be normalized. Dropped and logged, never retried.
    #[error("malformed record: {reason}")]
    MalformedRecord { reason: String },

    /// The message identity was already processed. Filtered silently.
    #[error("duplicate message {identity}")]
    DuplicateMessage { identity: String },

    /// The media payload exceeds the configured size limit.
    #[error("media too large: {size} bytes exceeds limit of {limit} bytes")]
    MediaTooLarge { size: u64, limit: u64 },

    /// The media payload could not be retrieved.
    #[error("media fetch failed: {message}")]
    MediaFetchFailed {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The delivery sink rejected the request in a way that may succeed later
    /// (network failure, rate limiting).
    #[error("transient sink error: {message}")]
    SinkTransient {
        message: String,
        /// Server-provided wait hint, if any.
        retry_after: Option<Duration>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The delivery sink rejected the request permanently.
    #[error("permanent sink error: {message}")]
    SinkPermanent {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The persistence layer could not complete a read or a durable write.
    #[error("persistence unavailable: {source}")]
    PersistenceUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The raw event source failed to produce a snapshot.
    #[error("source error: {message}")]
    Source {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Operation was abandoned because the pipeline is shutting down.
    #[error("operation cancelled")]
    Cancelled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WabridgeError {
    /// Wraps any storage-level error as [`WabridgeError::PersistenceUnavailable`].
    pub fn persistence<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        WabridgeError::PersistenceUnavailable {
            source: Box::new(err),
        }
    }

    /// Builds a [`WabridgeError::MalformedRecord`] from a reason string.
    pub fn malformed(reason: impl Into<String>) -> Self {
        WabridgeError::MalformedRecord {
            reason: reason.into(),
        }
    }

    /// Returns `true` only for errors that must halt the whole pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WabridgeError::PersistenceUnavailable { .. })
    }

    /// Returns `true` for errors worth another attempt with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WabridgeError::SinkTransient { .. } | WabridgeError::MediaFetchFailed { .. }
        )
    }

    /// Returns the sink's wait hint for rate-limited requests.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            WabridgeError::SinkTransient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
