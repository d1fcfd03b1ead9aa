// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the pipeline, the adapters, and the storage layer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Deterministic identity of a scraped message (hex-encoded SHA-256).
///
/// Reproducible across repeated scans and process restarts, so it is the
/// key of the dedup index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageIdentity(pub String);

impl MessageIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation ID assigned by the delivery sink.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SinkMessageId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the role of an adapter at the pipeline's edges.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Source,
    MediaFetcher,
    Sink,
    Storage,
}

/// Whether the forwarded message was received or sent by the account owner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// One entry of a scan snapshot, exactly as the scraper produced it.
///
/// Every field is optional on the wire; required fields are enforced by
/// the normalizer so a bad record is dropped individually rather than
/// failing the whole snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub sender_phone: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub media_ref: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outgoing: bool,
}

/// A normalized message with a stable identity.
///
/// Created by the normalizer on each scan observation and never mutated
/// afterwards; the resolved media payload travels next to it in
/// [`ResolvedMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub identity: MessageIdentity,
    pub chat_id: String,
    pub sender_name: String,
    pub sender_phone: Option<String>,
    pub direction: Direction,
    pub timestamp: Option<DateTime<Utc>>,
    pub body: String,
    pub media_ref: Option<String>,
    /// Monotonic counter assigned at normalization, used as tie-break.
    pub scan_sequence: u64,
}

impl Message {
    pub fn has_media(&self) -> bool {
        self.media_ref.is_some()
    }
}

/// Per-chat ordering state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCursor {
    pub chat_id: String,
    pub last_delivered_scan_sequence: u64,
    pub pending_count: u64,
    pub last_delivered_at: Option<DateTime<Utc>>,
}

/// Lifecycle of a media download.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MediaStatus {
    Pending,
    Downloading,
    Ready,
    Failed,
}

impl MediaStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, MediaStatus::Ready | MediaStatus::Failed)
    }
}

/// Persistent record of one message's media resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaJob {
    pub message_identity: MessageIdentity,
    pub chat_id: String,
    pub media_ref: String,
    pub status: MediaStatus,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl MediaJob {
    /// A fresh job for a message that carries a media reference.
    pub fn new(message_identity: MessageIdentity, chat_id: String, media_ref: String) -> Self {
        Self {
            message_identity,
            chat_id,
            media_ref,
            status: MediaStatus::Pending,
            attempt_count: 0,
            last_attempt_at: None,
            last_error: None,
        }
    }
}

/// Downloaded media bytes ready to attach to a delivery.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

impl fmt::Debug for MediaPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaPayload")
            .field("len", &self.data.len())
            .field("mime_type", &self.mime_type)
            .field("file_name", &self.file_name)
            .finish()
    }
}

/// Result of media resolution as seen by the delivery stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOutcome {
    /// The message carries no media.
    None,
    /// Media resolved and will be attached.
    Ready(MediaPayload),
    /// Media resolution failed; deliver text with a placeholder note.
    Failed { reason: String },
    /// Media is still resolving; deliver text now, media follows separately.
    Deferred,
}

/// A message that has passed dedup, ordering, and media resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMessage {
    pub message: Message,
    pub media: MediaOutcome,
}

/// An outbound request against the delivery sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
    pub chat_label: String,
    pub sender_label: String,
    /// Fully formatted body text.
    pub body: String,
    pub media: Option<MediaPayload>,
}

/// Append-only record of a confirmed delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub message_identity: MessageIdentity,
    pub chat_id: String,
    pub sender_name: String,
    pub sender_phone: Option<String>,
    pub direction: Direction,
    pub body: String,
    pub message_timestamp: Option<DateTime<Utc>>,
    pub had_media: bool,
    pub sink_message_id: String,
    pub delivered_at: DateTime<Utc>,
}

impl DeliveryRecord {
    /// Builds the record for `message` confirmed by the sink as `sink_message_id`.
    pub fn for_message(
        message: &Message,
        sink_message_id: SinkMessageId,
        delivered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            message_identity: message.identity.clone(),
            chat_id: message.chat_id.clone(),
            sender_name: message.sender_name.clone(),
            sender_phone: message.sender_phone.clone(),
            direction: message.direction,
            body: message.body.clone(),
            message_timestamp: message.timestamp,
            had_media: message.has_media(),
            sink_message_id: sink_message_id.0,
            delivered_at,
        }
    }
}

/// State of an identity in the dedup index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DedupState {
    /// Seen and accepted, not yet confirmed by the sink.
    Pending,
    /// Confirmed by the sink.
    Delivered,
    /// Delivery gave up; awaiting a manual retry.
    Failed,
}

/// Minimal dedup index row, loaded into memory at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupEntry {
    pub identity: MessageIdentity,
    pub chat_id: String,
    pub state: DedupState,
    pub last_seen_at: DateTime<Utc>,
}

/// A message whose delivery was abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedMessage {
    pub message: Message,
    pub reason: Option<String>,
    pub first_seen_at: DateTime<Utc>,
}

/// A distinct sender observed in confirmed deliveries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactSummary {
    pub sender_name: String,
    pub sender_phone: Option<String>,
    pub message_count: u64,
    pub last_delivered_at: DateTime<Utc>,
}

/// A chat with at least one confirmed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub chat_id: String,
    pub message_count: u64,
    pub last_delivered_at: DateTime<Utc>,
}

/// Aggregate counters for the stats query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub active_chats: u64,
    pub contacts: u64,
    pub delivered: u64,
    pub pending: u64,
    pub failed: u64,
    pub media_failed: u64,
}
