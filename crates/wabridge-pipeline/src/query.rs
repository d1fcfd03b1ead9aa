// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only views over the delivery log and chat cursors.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use wabridge_core::types::{
    ChatCursor, ChatSummary, ContactSummary, DeliveryRecord, FailedMessage, ForwardStats,
    MessageIdentity,
};
use wabridge_core::{StorageAdapter, WabridgeError};

/// Lookups backing the history, chats, contacts and stats commands.
///
/// Nothing here writes to storage.
#[derive(Clone)]
pub struct HistoryReader {
    storage: Arc<dyn StorageAdapter>,
}

impl HistoryReader {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Last `limit` deliveries whose sender name or phone contains `term`,
    /// oldest first. Matching is case-insensitive.
    pub async fn history_for_contact(
        &self,
        term: &str,
        limit: u32,
    ) -> Result<Vec<DeliveryRecord>, WabridgeError> {
        self.storage.deliveries_for_contact(term.trim(), limit).await
    }

    /// Last `limit` deliveries in one chat, oldest first.
    pub async fn history_for_chat(
        &self,
        chat_id: &str,
        limit: u32,
    ) -> Result<Vec<DeliveryRecord>, WabridgeError> {
        self.storage.deliveries_for_chat(chat_id, limit).await
    }

    /// Deliveries confirmed in `[from, to)`.
    pub async fn deliveries_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>, WabridgeError> {
        if to <= from {
            return Ok(Vec::new());
        }
        self.storage.deliveries_between(from, to).await
    }

    pub async fn delivery(
        &self,
        identity: &MessageIdentity,
    ) -> Result<Option<DeliveryRecord>, WabridgeError> {
        self.storage.get_delivery(identity).await
    }

    /// Chats ordered by most recent delivery.
    pub async fn recent_chats(&self, limit: u32) -> Result<Vec<ChatSummary>, WabridgeError> {
        self.storage.recent_chats(limit).await
    }

    /// Every distinct sender that has had a message forwarded.
    pub async fn contacts(&self) -> Result<Vec<ContactSummary>, WabridgeError> {
        self.storage.contacts(None).await
    }

    pub async fn search_contacts(&self, term: &str) -> Result<Vec<ContactSummary>, WabridgeError> {
        let term = term.trim();
        if term.is_empty() {
            return self.contacts().await;
        }
        self.storage.contacts(Some(term)).await
    }

    pub async fn cursors(&self) -> Result<Vec<ChatCursor>, WabridgeError> {
        self.storage.list_cursors().await
    }

    pub async fn cursor(&self, chat_id: &str) -> Result<Option<ChatCursor>, WabridgeError> {
        self.storage.get_cursor(chat_id).await
    }

    pub async fn stats(&self) -> Result<ForwardStats, WabridgeError> {
        self.storage.stats().await
    }

    /// Messages whose delivery was abandoned, most recent first.
    pub async fn failed_messages(&self, limit: u32) -> Result<Vec<FailedMessage>, WabridgeError> {
        self.storage.failed_messages(limit).await
    }
}
