// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dedup gate.
//!
//! Membership is answered from an in-memory map mirrored from the
//! `dedup_index` table. A new identity is persisted (with the full message,
//! so the row doubles as the outbox) before it is reported as new.
//!
//! Retention is a best-effort bound: an identity is evicted once the source
//! has not shown it for the whole retention window. If the source re-shows a
//! message after its entry was evicted, it is treated as new.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use wabridge_core::types::{DedupState, Message, MessageIdentity};
use wabridge_core::{StorageAdapter, WabridgeError};

#[derive(Debug, Clone, Copy)]
struct SeenEntry {
    state: DedupState,
    last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct DedupInner {
    seen: HashMap<MessageIdentity, SeenEntry>,
    /// `last_seen_at` refreshes not yet written to storage.
    touched: HashMap<MessageIdentity, DateTime<Utc>>,
}

/// Durable set of processed message identities.
pub struct DedupStore {
    storage: Arc<dyn StorageAdapter>,
    retention: chrono::Duration,
    inner: Mutex<DedupInner>,
}

impl DedupStore {
    pub fn new(storage: Arc<dyn StorageAdapter>, retention: std::time::Duration) -> Self {
        Self {
            storage,
            retention: chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX),
            inner: Mutex::new(DedupInner::default()),
        }
    }

    /// Loads the persisted index into memory. Returns the number of entries.
    pub async fn load(&self) -> Result<usize, WabridgeError> {
        let entries = self.storage.load_dedup_index().await?;
        let mut inner = self.inner.lock().await;
        inner.seen = entries
            .into_iter()
            .map(|e| {
                (
                    e.identity,
                    SeenEntry {
                        state: e.state,
                        last_seen_at: e.last_seen_at,
                    },
                )
            })
            .collect();
        inner.touched.clear();
        debug!(entries = inner.seen.len(), "dedup index loaded");
        Ok(inner.seen.len())
    }

    /// Returns `true` if the identity has already passed the gate.
    pub async fn seen(&self, identity: &MessageIdentity) -> bool {
        self.inner.lock().await.seen.contains_key(identity)
    }

    /// Current state of a known identity.
    pub async fn state(&self, identity: &MessageIdentity) -> Option<DedupState> {
        self.inner.lock().await.seen.get(identity).map(|e| e.state)
    }

    /// Number of identities held in memory.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.seen.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Durably records `message` as seen in state `pending`.
    ///
    /// Returns `false` if the identity was already known, in memory or on disk.
    pub async fn mark_seen(&self, message: &Message) -> Result<bool, WabridgeError> {
        let mut inner = self.inner.lock().await;
        self.mark_locked(&mut inner, message, Utc::now()).await
    }

    /// The gate: admits `message` exactly once.
    ///
    /// A known identity fails with [`WabridgeError::DuplicateMessage`] and has
    /// its `last_seen_at` refreshed. A new identity is persisted before this
    /// returns `Ok`.
    pub async fn check_and_mark(&self, message: &Message) -> Result<(), WabridgeError> {
        let now = Utc::now();
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if let Some(entry) = inner.seen.get_mut(&message.identity) {
            entry.last_seen_at = now;
            inner.touched.insert(message.identity.clone(), now);
            return Err(WabridgeError::DuplicateMessage {
                identity: message.identity.to_string(),
            });
        }

        if self.mark_locked(inner, message, now).await? {
            Ok(())
        } else {
            Err(WabridgeError::DuplicateMessage {
                identity: message.identity.to_string(),
            })
        }
    }

    async fn mark_locked(
        &self,
        inner: &mut DedupInner,
        message: &Message,
        now: DateTime<Utc>,
    ) -> Result<bool, WabridgeError> {
        if inner.seen.contains_key(&message.identity) {
            return Ok(false);
        }
        let inserted = self.storage.insert_seen(message, now).await?;
        inner.seen.insert(
            message.identity.clone(),
            SeenEntry {
                state: DedupState::Pending,
                last_seen_at: now,
            },
        );
        Ok(inserted)
    }

    /// Records in memory that `identity` was confirmed by the sink. Storage
    /// is updated by the delivery transaction itself.
    pub async fn note_delivered(&self, identity: &MessageIdentity) {
        if let Some(entry) = self.inner.lock().await.seen.get_mut(identity) {
            entry.state = DedupState::Delivered;
        }
    }

    /// Records in memory that delivery of `identity` was abandoned.
    pub async fn note_failed(&self, identity: &MessageIdentity) {
        if let Some(entry) = self.inner.lock().await.seen.get_mut(identity) {
            entry.state = DedupState::Failed;
        }
    }

    /// Moves a failed identity back to `pending` so the next run re-delivers it.
    pub async fn retry_failed(&self, identity: &MessageIdentity) -> Result<bool, WabridgeError> {
        let mut inner = self.inner.lock().await;
        let moved = self.storage.retry_failed(identity).await?;
        if moved && let Some(entry) = inner.seen.get_mut(identity) {
            entry.state = DedupState::Pending;
        }
        Ok(moved)
    }

    /// Writes buffered `last_seen_at` refreshes to storage.
    pub async fn flush_touches(&self) -> Result<usize, WabridgeError> {
        let mut inner = self.inner.lock().await;
        if inner.touched.is_empty() {
            return Ok(0);
        }
        let touches: Vec<(MessageIdentity, DateTime<Utc>)> = inner.touched.drain().collect();
        if let Err(e) = self.storage.touch_seen(&touches).await {
            inner.touched.extend(touches);
            return Err(e);
        }
        Ok(touches.len())
    }

    /// Evicts entries not seen within the retention window as of `now`.
    ///
    /// Pending entries are never evicted. Returns the number of evicted identities.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> Result<usize, WabridgeError> {
        self.flush_touches().await?;

        let cutoff = now
            .checked_sub_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let evicted = self.storage.evict_seen_before(cutoff).await?;

        let mut inner = self.inner.lock().await;
        for identity in &evicted {
            inner.seen.remove(identity);
        }
        if !evicted.is_empty() {
            info!(evicted = evicted.len(), cutoff = %cutoff, "dedup entries evicted");
        }
        Ok(evicted.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wabridge_core::types::Direction;
    use wabridge_test_utils::TestHarness;

    fn message(id: &str) -> Message {
        Message {
            identity: MessageIdentity(id.into()),
            chat_id: "Family".into(),
            sender_name: "Alice".into(),
            sender_phone: None,
            direction: Direction::Incoming,
            timestamp: None,
            body: format!("body {id}"),
            media_ref: None,
            scan_sequence: 1,
        }
    }

    async fn store(harness: &TestHarness) -> DedupStore {
        DedupStore::new(harness.storage(), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn gate_admits_each_identity_once() {
        let harness = TestHarness::builder().build().await.unwrap();
        let dedup = store(&harness).await;
        let m = message("a");

        dedup.check_and_mark(&m).await.unwrap();
        let err = dedup.check_and_mark(&m).await.unwrap_err();
        assert!(matches!(err, WabridgeError::DuplicateMessage { .. }));
        assert!(dedup.seen(&m.identity).await);
        assert_eq!(dedup.state(&m.identity).await, Some(DedupState::Pending));

        let pending = harness.storage().pending_messages().await.unwrap();
        assert_eq!(pending, vec![m]);
    }

    #[tokio::test]
    async fn reload_restores_membership() {
        let harness = TestHarness::builder().build().await.unwrap();
        let m = message("a");
        store(&harness).await.mark_seen(&m).await.unwrap();

        let fresh = store(&harness).await;
        assert!(!fresh.seen(&m.identity).await);
        assert_eq!(fresh.load().await.unwrap(), 1);
        assert!(fresh.seen(&m.identity).await);
        assert!(!fresh.mark_seen(&m).await.unwrap());
    }

    #[tokio::test]
    async fn eviction_keeps_pending_and_recent_entries() {
        let harness = TestHarness::builder().build().await.unwrap();
        let storage = harness.storage();
        let dedup = store(&harness).await;

        let delivered = message("old");
        let pending = message("pending");
        dedup.mark_seen(&delivered).await.unwrap();
        dedup.mark_seen(&pending).await.unwrap();
        storage.mark_failed(&delivered.identity, "gone").await.unwrap();

        // Nothing is older than the window yet.
        assert_eq!(dedup.evict_expired(Utc::now()).await.unwrap(), 0);

        let later = Utc::now() + chrono::Duration::hours(2);
        assert_eq!(dedup.evict_expired(later).await.unwrap(), 1);
        assert!(!dedup.seen(&delivered.identity).await);
        assert!(dedup.seen(&pending.identity).await);
    }

    #[tokio::test]
    async fn touches_are_flushed_and_retry_moves_back_to_pending() {
        let harness = TestHarness::builder().build().await.unwrap();
        let storage = harness.storage();
        let dedup = store(&harness).await;
        let m = message("a");

        dedup.check_and_mark(&m).await.unwrap();
        let _ = dedup.check_and_mark(&m).await;
        assert_eq!(dedup.flush_touches().await.unwrap(), 1);
        assert_eq!(dedup.flush_touches().await.unwrap(), 0);

        storage.mark_failed(&m.identity, "blocked").await.unwrap();
        dedup.note_failed(&m.identity).await;
        assert!(dedup.retry_failed(&m.identity).await.unwrap());
        assert_eq!(dedup.state(&m.identity).await, Some(DedupState::Pending));
        assert!(!dedup.retry_failed(&m.identity).await.unwrap());
    }
}
