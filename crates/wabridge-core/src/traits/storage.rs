// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the persistence layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::WabridgeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ChatCursor, ChatSummary, ContactSummary, DedupEntry, DeliveryRecord, FailedMessage,
    ForwardStats, MediaJob, Message, MessageIdentity,
};

/// Adapter for the durable state behind the pipeline.
///
/// Backs the dedup index (which doubles as the outbox of accepted but
/// unconfirmed messages), the per-chat cursors, the media job table, and the
/// append-only delivery log. Every write must be durable when the returned
/// future resolves.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), WabridgeError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), WabridgeError>;

    // --- Dedup index ---

    /// Loads every dedup entry for the in-memory membership cache.
    async fn load_dedup_index(&self) -> Result<Vec<DedupEntry>, WabridgeError>;

    /// Records `message` as seen in state `pending`.
    ///
    /// Returns `false` if the identity was already present.
    async fn insert_seen(
        &self,
        message: &Message,
        seen_at: DateTime<Utc>,
    ) -> Result<bool, WabridgeError>;

    /// Refreshes `last_seen_at` for identities the source showed again.
    async fn touch_seen(
        &self,
        touches: &[(MessageIdentity, DateTime<Utc>)],
    ) -> Result<(), WabridgeError>;

    /// Returns all accepted messages not yet confirmed by the sink.
    async fn pending_messages(&self) -> Result<Vec<Message>, WabridgeError>;

    /// Largest scan sequence ever persisted, used to resume the counter.
    async fn max_scan_sequence(&self) -> Result<Option<u64>, WabridgeError>;

    /// Moves an identity to `failed` with a reason.
    async fn mark_failed(
        &self,
        identity: &MessageIdentity,
        reason: &str,
    ) -> Result<(), WabridgeError>;

    /// Moves a `failed` identity back to `pending`. Returns `false` if it was not failed.
    async fn retry_failed(&self, identity: &MessageIdentity) -> Result<bool, WabridgeError>;

    /// Deletes non-pending entries last seen before `cutoff`, with their
    /// terminal media jobs. Returns the evicted identities.
    async fn evict_seen_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MessageIdentity>, WabridgeError>;

    // --- Delivery log ---

    /// Atomically appends `record`, marks its dedup entry `delivered`, and
    /// advances the chat cursor to `scan_sequence`.
    async fn record_delivery(
        &self,
        record: &DeliveryRecord,
        scan_sequence: u64,
    ) -> Result<(), WabridgeError>;

    /// Looks up the delivery record of one message.
    async fn get_delivery(
        &self,
        identity: &MessageIdentity,
    ) -> Result<Option<DeliveryRecord>, WabridgeError>;

    // --- Chat cursors ---

    /// Upserts the pending count of a chat cursor.
    async fn save_pending_count(&self, chat_id: &str, pending: u64) -> Result<(), WabridgeError>;

    /// Returns one chat cursor.
    async fn get_cursor(&self, chat_id: &str) -> Result<Option<ChatCursor>, WabridgeError>;

    /// Returns all chat cursors ordered by chat.
    async fn list_cursors(&self) -> Result<Vec<ChatCursor>, WabridgeError>;

    // --- Media jobs ---

    /// Inserts or replaces a media job.
    async fn upsert_media_job(&self, job: &MediaJob) -> Result<(), WabridgeError>;

    /// Returns the media job of a message.
    async fn get_media_job(
        &self,
        identity: &MessageIdentity,
    ) -> Result<Option<MediaJob>, WabridgeError>;

    /// Deletes the media job of a message.
    async fn delete_media_job(&self, identity: &MessageIdentity) -> Result<(), WabridgeError>;

    /// Reverts jobs left in `downloading` by an interrupted run. Returns the count.
    async fn reset_downloading_media_jobs(&self) -> Result<u64, WabridgeError>;

    /// Delivered messages whose media job is still `pending` or `ready`,
    /// i.e. whose media follow-up never went out.
    async fn messages_awaiting_media(&self) -> Result<Vec<Message>, WabridgeError>;

    // --- Read-only queries ---

    /// Last `limit` deliveries whose sender name or phone contains `term`, oldest first.
    async fn deliveries_for_contact(
        &self,
        term: &str,
        limit: u32,
    ) -> Result<Vec<DeliveryRecord>, WabridgeError>;

    /// Last `limit` deliveries of one chat, oldest first.
    async fn deliveries_for_chat(
        &self,
        chat_id: &str,
        limit: u32,
    ) -> Result<Vec<DeliveryRecord>, WabridgeError>;

    /// Deliveries confirmed in `[from, to)`, oldest first.
    async fn deliveries_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>, WabridgeError>;

    /// Chats ordered by most recent delivery.
    async fn recent_chats(&self, limit: u32) -> Result<Vec<ChatSummary>, WabridgeError>;

    /// Distinct senders, optionally filtered by a name/phone substring.
    async fn contacts(&self, term: Option<&str>) -> Result<Vec<ContactSummary>, WabridgeError>;

    /// Messages whose delivery was abandoned, newest first.
    async fn failed_messages(&self, limit: u32) -> Result<Vec<FailedMessage>, WabridgeError>;

    /// Aggregate counters.
    async fn stats(&self) -> Result<ForwardStats, WabridgeError>;
}
