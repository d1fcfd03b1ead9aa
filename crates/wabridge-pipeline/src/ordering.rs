// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-chat ordering buffer.
//!
//! Messages are keyed by `(effective timestamp, scan sequence)`. A message
//! without a timestamp inherits the largest timestamp seen in its chat so
//! far, so it stays behind everything that came before it.
//!
//! Only the head of a chat's queue can be drained, and only once it has sat
//! in the buffer for the quiescence window. A chat holding more than
//! `max_pending` messages is drained from the head regardless, to bound
//! memory.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::debug;

use wabridge_core::types::{Message, MessageIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    timestamp: Option<DateTime<Utc>>,
    scan_sequence: u64,
}

#[derive(Debug)]
struct Buffered {
    message: Message,
    enqueued_at: Instant,
}

#[derive(Debug, Default)]
struct ChatQueue {
    entries: BTreeMap<OrderKey, Buffered>,
    /// Identities of everything in `entries`.
    identities: HashSet<MessageIdentity>,
    max_timestamp: Option<DateTime<Utc>>,
}

/// Orders messages per chat before they are handed to delivery.
#[derive(Debug)]
pub struct OrderingBuffer {
    quiescence: Duration,
    max_pending: usize,
    chats: HashMap<String, ChatQueue>,
}

impl OrderingBuffer {
    pub fn new(quiescence: Duration, max_pending: usize) -> Self {
        Self {
            quiescence,
            max_pending: max_pending.max(1),
            chats: HashMap::new(),
        }
    }

    /// Adds a message to its chat's queue.
    pub fn enqueue(&mut self, message: Message, now: Instant) {
        let queue = self.chats.entry(message.chat_id.clone()).or_default();

        let timestamp = match message.timestamp {
            Some(ts) => {
                queue.max_timestamp = queue.max_timestamp.max(Some(ts));
                Some(ts)
            }
            None => queue.max_timestamp,
        };
        let key = OrderKey {
            timestamp,
            scan_sequence: message.scan_sequence,
        };
        let identity = message.identity.clone();
        let replaced = queue.entries.insert(
            key,
            Buffered {
                message,
                enqueued_at: now,
            },
        );
        if let Some(old) = replaced {
            queue.identities.remove(&old.message.identity);
        }
        queue.identities.insert(identity);
    }

    /// Removes and returns the ready prefix of one chat's queue, in order.
    pub fn drain_ready(&mut self, chat_id: &str, now: Instant) -> Vec<Message> {
        let Some(queue) = self.chats.get_mut(chat_id) else {
            return Vec::new();
        };

        let mut drained = Vec::new();
        loop {
            let overflow = queue.entries.len() > self.max_pending;
            let Some(entry) = queue.entries.first_entry() else {
                break;
            };
            let quiet = now >= entry.get().enqueued_at + self.quiescence;
            if !(quiet || overflow) {
                break;
            }
            if overflow && !quiet {
                debug!(chat_id, "ordering buffer over capacity, draining early");
            }
            let message = entry.remove().message;
            queue.identities.remove(&message.identity);
            drained.push(message);
        }

        if queue.entries.is_empty() {
            // The watermark goes with the queue.
            self.chats.remove(chat_id);
        }
        drained
    }

    /// Drains every chat that has a ready prefix.
    pub fn drain_all_ready(&mut self, now: Instant) -> Vec<(String, Vec<Message>)> {
        let chat_ids: Vec<String> = self.chats.keys().cloned().collect();
        chat_ids
            .into_iter()
            .filter_map(|chat_id| {
                let drained = self.drain_ready(&chat_id, now);
                (!drained.is_empty()).then_some((chat_id, drained))
            })
            .collect()
    }

    /// Earliest instant at which some chat's head becomes ready.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.chats
            .values()
            .filter_map(|q| q.entries.first_key_value())
            .map(|(_, head)| head.enqueued_at + self.quiescence)
            .min()
    }

    /// Whether a message with the same identity is already buffered.
    pub fn contains(&self, message: &Message) -> bool {
        self.chats
            .get(&message.chat_id)
            .is_some_and(|q| q.identities.contains(&message.identity))
    }

    /// Number of messages buffered for `chat_id`.
    pub fn pending_count(&self, chat_id: &str) -> usize {
        self.chats.get(chat_id).map_or(0, |q| q.entries.len())
    }

    /// Total number of buffered messages.
    pub fn len(&self) -> usize {
        self.chats.values().map(|q| q.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    /// Chats with at least one buffered message.
    pub fn chat_ids(&self) -> impl Iterator<Item = &str> {
        self.chats.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use wabridge_core::types::Direction;

    const QUIET: Duration = Duration::from_secs(3);

    fn msg(chat: &str, id: &str, minute: Option<u32>, seq: u64) -> Message {
        Message {
            identity: MessageIdentity(id.into()),
            chat_id: chat.into(),
            sender_name: "Alice".into(),
            sender_phone: None,
            direction: Direction::Incoming,
            timestamp: minute.map(|m| Utc.with_ymd_and_hms(2024, 5, 1, 10, m, 0).unwrap()),
            body: id.into(),
            media_ref: None,
            scan_sequence: seq,
        }
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.identity.as_str()).collect()
    }

    #[test]
    fn nothing_drains_before_quiescence() {
        let now = Instant::now();
        let mut buffer = OrderingBuffer::new(QUIET, 100);
        buffer.enqueue(msg("X", "a", Some(1), 1), now);

        assert!(buffer.drain_ready("X", now + Duration::from_secs(1)).is_empty());
        assert_eq!(buffer.next_deadline(), Some(now + QUIET));
        assert_eq!(ids(&buffer.drain_ready("X", now + QUIET)), vec!["a"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn late_earlier_message_is_reordered_in() {
        let now = Instant::now();
        let mut buffer = OrderingBuffer::new(QUIET, 100);
        buffer.enqueue(msg("X", "b", Some(2), 1), now);
        buffer.enqueue(msg("X", "c", Some(3), 2), now);
        buffer.enqueue(msg("X", "a", Some(1), 3), now + Duration::from_secs(1));

        // `a` is now the head and blocks `b` and `c` until its own window ends.
        assert!(buffer.drain_ready("X", now + QUIET).is_empty());
        let drained = buffer.drain_ready("X", now + QUIET + Duration::from_secs(1));
        assert_eq!(ids(&drained), vec!["a", "b", "c"]);
    }

    #[test]
    fn timestamp_ties_break_on_scan_sequence() {
        let now = Instant::now();
        let mut buffer = OrderingBuffer::new(QUIET, 100);
        buffer.enqueue(msg("X", "second", Some(5), 8), now);
        buffer.enqueue(msg("X", "first", Some(5), 7), now);
        assert_eq!(ids(&buffer.drain_ready("X", now + QUIET)), vec!["first", "second"]);
    }

    #[test]
    fn untimestamped_message_inherits_chat_watermark() {
        let now = Instant::now();
        let mut buffer = OrderingBuffer::new(QUIET, 100);
        buffer.enqueue(msg("X", "late", Some(9), 1), now);
        buffer.enqueue(msg("X", "no-ts", None, 2), now);
        buffer.enqueue(msg("X", "early", Some(1), 3), now);

        assert_eq!(
            ids(&buffer.drain_ready("X", now + QUIET)),
            vec!["early", "late", "no-ts"]
        );
    }

    #[test]
    fn overflow_forces_eager_drain() {
        let now = Instant::now();
        let mut buffer = OrderingBuffer::new(QUIET, 2);
        for (i, id) in ["a", "b", "c", "d"].into_iter().enumerate() {
            buffer.enqueue(msg("X", id, Some(i as u32), i as u64), now);
        }
        assert_eq!(ids(&buffer.drain_ready("X", now)), vec!["a", "b"]);
        assert_eq!(buffer.pending_count("X"), 2);
    }

    #[test]
    fn chats_drain_independently() {
        let now = Instant::now();
        let mut buffer = OrderingBuffer::new(QUIET, 100);
        buffer.enqueue(msg("X", "x1", Some(1), 1), now);
        buffer.enqueue(msg("Y", "y1", Some(1), 2), now + Duration::from_secs(2));

        let drained = buffer.drain_all_ready(now + QUIET);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, "X");
        assert_eq!(buffer.chat_ids().collect::<Vec<_>>(), vec!["Y"]);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn contains_tracks_enqueue_and_drain() {
        let now = Instant::now();
        let mut buffer = OrderingBuffer::new(QUIET, 100);
        let a = msg("X", "a", Some(1), 1);
        let b = msg("X", "b", Some(2), 2);
        buffer.enqueue(a.clone(), now);
        buffer.enqueue(b.clone(), now + Duration::from_secs(2));

        assert!(buffer.contains(&a));
        assert!(buffer.contains(&b));
        assert!(!buffer.contains(&msg("Y", "a", Some(1), 1)));

        assert_eq!(ids(&buffer.drain_ready("X", now + QUIET)), vec!["a"]);
        assert!(!buffer.contains(&a));
        assert!(buffer.contains(&b));
    }

    #[test]
    fn re_enqueued_slot_replaces_identity() {
        let now = Instant::now();
        let mut buffer = OrderingBuffer::new(QUIET, 100);
        let old = msg("X", "old", Some(1), 1);
        let new = msg("X", "new", Some(1), 1);
        buffer.enqueue(old.clone(), now);
        buffer.enqueue(new.clone(), now);

        assert!(!buffer.contains(&old));
        assert!(buffer.contains(&new));
        assert_eq!(buffer.pending_count("X"), 1);
    }

    #[test]
    fn membership_check_scales_to_large_recovery() {
        let now = Instant::now();
        let mut buffer = OrderingBuffer::new(QUIET, usize::MAX);
        let messages: Vec<Message> = (0..20_000u64)
            .map(|i| msg("X", &format!("m{i}"), Some((i % 60) as u32), i))
            .collect();
        for m in &messages {
            assert!(!buffer.contains(m));
            buffer.enqueue(m.clone(), now);
        }
        assert!(messages.iter().all(|m| buffer.contains(m)));
        assert_eq!(buffer.len(), messages.len());
    }

    proptest! {
        #[test]
        fn drained_chat_is_non_decreasing_in_timestamp(
            minutes in proptest::collection::vec(0u32..60, 1..40),
            max_pending in 1usize..50,
        ) {
            let now = Instant::now();
            let mut buffer = OrderingBuffer::new(QUIET, max_pending);
            for (i, minute) in minutes.iter().enumerate() {
                buffer.enqueue(msg("X", &format!("m{i}"), Some(*minute), i as u64), now);
            }
            let drained = buffer.drain_ready("X", now + QUIET);
            prop_assert_eq!(drained.len(), minutes.len());
            for pair in drained.windows(2) {
                prop_assert!(pair[0].timestamp <= pair[1].timestamp);
            }
        }
    }
}
