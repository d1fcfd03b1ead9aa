// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Raw record normalization and message identity.
//!
//! The identity is a SHA-256 over the fields that stay stable while the
//! source re-renders a message: chat, sender, trimmed text, whether media is
//! attached, and the timestamp floored to the source's display granularity.
//! The scan sequence is deliberately not part of it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use wabridge_core::WabridgeError;
use wabridge_core::types::{Direction, Message, MessageIdentity, RawRecord};

use crate::contacts::{normalize_phone, parse_sender};

const FIELD_SEPARATOR: u8 = 0x1f;

/// Turns raw scan records into [`Message`]s and owns the scan-sequence counter.
#[derive(Debug)]
pub struct Normalizer {
    granularity_secs: i64,
    next_sequence: AtomicU64,
}

impl Normalizer {
    pub fn new(timestamp_granularity: Duration) -> Self {
        Self {
            granularity_secs: i64::try_from(timestamp_granularity.as_secs()).unwrap_or(i64::MAX),
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Moves the counter past `last`, the largest sequence persisted by an
    /// earlier run. Never moves it backwards.
    pub fn resume_after(&self, last: u64) {
        self.next_sequence
            .fetch_max(last.saturating_add(1), Ordering::SeqCst);
    }

    /// The sequence the next accepted record will get.
    pub fn peek_sequence(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }

    /// Normalizes one record, assigning the next scan sequence.
    ///
    /// Malformed records do not consume a sequence number.
    pub fn normalize(&self, raw: &RawRecord) -> Result<Message, WabridgeError> {
        validate(raw)?;
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        normalize(raw, sequence, self.granularity_secs)
    }
}

/// Normalizes `raw` with an explicit `scan_sequence`.
pub fn normalize(
    raw: &RawRecord,
    scan_sequence: u64,
    granularity_secs: i64,
) -> Result<Message, WabridgeError> {
    validate(raw)?;

    let chat_id = raw.chat_id.as_deref().unwrap_or_default().trim().to_string();
    let body = raw.body.as_deref().unwrap_or_default().trim().to_string();
    let media_ref = non_empty(raw.media_ref.as_deref()).map(str::to_string);

    let contact = parse_sender(raw.sender.as_deref().unwrap_or_default());
    let sender_phone = raw
        .sender_phone
        .as_deref()
        .and_then(normalize_phone)
        .or(contact.phone);

    let sender_key = sender_phone.as_deref().unwrap_or(&contact.display_name);
    let identity = message_identity(
        &chat_id,
        sender_key,
        &body,
        media_ref.is_some(),
        raw.timestamp,
        granularity_secs,
    );

    Ok(Message {
        identity,
        chat_id,
        sender_name: contact.display_name,
        sender_phone,
        direction: if raw.outgoing {
            Direction::Outgoing
        } else {
            Direction::Incoming
        },
        timestamp: raw.timestamp,
        body,
        media_ref,
        scan_sequence,
    })
}

/// Computes the deterministic identity of a message.
pub fn message_identity(
    chat_id: &str,
    sender_key: &str,
    body: &str,
    has_media: bool,
    timestamp: Option<DateTime<Utc>>,
    granularity_secs: i64,
) -> MessageIdentity {
    let bucket = timestamp
        .map(|ts| timestamp_bucket(ts, granularity_secs).to_string())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    for (i, field) in [
        chat_id,
        sender_key,
        body.trim(),
        if has_media { "1" } else { "0" },
        bucket.as_str(),
    ]
    .iter()
    .enumerate()
    {
        if i > 0 {
            hasher.update([FIELD_SEPARATOR]);
        }
        hasher.update(field.as_bytes());
    }
    MessageIdentity(hex::encode(hasher.finalize()))
}

/// Floors a timestamp to the start of its granularity bucket, in epoch seconds.
pub fn timestamp_bucket(ts: DateTime<Utc>, granularity_secs: i64) -> i64 {
    let secs = ts.timestamp();
    if granularity_secs <= 1 {
        secs
    } else {
        secs.div_euclid(granularity_secs) * granularity_secs
    }
}

fn validate(raw: &RawRecord) -> Result<(), WabridgeError> {
    if non_empty(raw.chat_id.as_deref()).is_none() {
        return Err(WabridgeError::malformed("missing chat_id"));
    }
    if non_empty(raw.body.as_deref()).is_none() && non_empty(raw.media_ref.as_deref()).is_none() {
        return Err(WabridgeError::malformed("record has neither text nor media"));
    }
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::UNKNOWN_SENDER;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn record(chat: &str, sender: &str, body: &str) -> RawRecord {
        RawRecord {
            chat_id: Some(chat.into()),
            sender: Some(sender.into()),
            body: Some(body.into()),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 0).unwrap()),
            ..Default::default()
        }
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(Duration::from_secs(60))
    }

    #[test]
    fn identity_ignores_scan_sequence_and_whitespace() {
        let a = normalize(&record("Family", "Alice", "hi"), 1, 60).unwrap();
        let b = normalize(&record("Family", "Alice", "  hi \n"), 99, 60).unwrap();
        assert_eq!(a.identity, b.identity);
        assert_ne!(a.scan_sequence, b.scan_sequence);
    }

    #[test]
    fn identity_is_stable_within_timestamp_bucket() {
        let mut later = record("Family", "Alice", "hi");
        later.timestamp = Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 42).unwrap());
        let a = normalize(&record("Family", "Alice", "hi"), 1, 60).unwrap();
        let b = normalize(&later, 2, 60).unwrap();
        assert_eq!(a.identity, b.identity);

        later.timestamp = Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 16, 0).unwrap());
        let c = normalize(&later, 3, 60).unwrap();
        assert_ne!(a.identity, c.identity);
    }

    #[test]
    fn identity_distinguishes_chat_sender_body_and_media() {
        let base = normalize(&record("Family", "Alice", "hi"), 1, 60).unwrap();
        let other_chat = normalize(&record("Work", "Alice", "hi"), 1, 60).unwrap();
        let other_sender = normalize(&record("Family", "Bob", "hi"), 1, 60).unwrap();
        let other_body = normalize(&record("Family", "Alice", "hello"), 1, 60).unwrap();
        let mut with_media = record("Family", "Alice", "hi");
        with_media.media_ref = Some("blob:1".into());
        let with_media = normalize(&with_media, 1, 60).unwrap();

        for other in [other_chat, other_sender, other_body, with_media] {
            assert_ne!(base.identity, other.identity);
        }
    }

    #[test]
    fn phone_is_sender_key_when_known() {
        let a = normalize(&record("Family", "Alice (+49 151 2345678)", "hi"), 1, 60).unwrap();
        let mut renamed = record("Family", "Ali", "hi");
        renamed.sender_phone = Some("+49 151 2345678".into());
        let b = normalize(&renamed, 2, 60).unwrap();

        assert_eq!(a.sender_name, "Alice");
        assert_eq!(a.sender_phone.as_deref(), Some("491512345678"));
        assert_eq!(a.identity, b.identity);
    }

    #[test]
    fn missing_fields_are_malformed() {
        let mut no_chat = record("", "Alice", "hi");
        no_chat.chat_id = None;
        let err = normalize(&no_chat, 1, 60).unwrap_err();
        assert!(matches!(err, WabridgeError::MalformedRecord { .. }));

        let empty = record("Family", "Alice", "   ");
        let err = normalize(&empty, 1, 60).unwrap_err();
        assert!(err.to_string().contains("neither text nor media"));
    }

    #[test]
    fn media_only_record_is_accepted() {
        let mut raw = record("Family", "Alice", "");
        raw.media_ref = Some("blob:abc".into());
        let msg = normalize(&raw, 1, 60).unwrap();
        assert!(msg.has_media());
        assert_eq!(msg.body, "");
    }

    #[test]
    fn missing_sender_and_outgoing_direction() {
        let raw = RawRecord {
            chat_id: Some("Family".into()),
            body: Some("on my way".into()),
            outgoing: true,
            ..Default::default()
        };
        let msg = normalize(&raw, 1, 60).unwrap();
        assert_eq!(msg.sender_name, UNKNOWN_SENDER);
        assert_eq!(msg.direction, Direction::Outgoing);
        assert_eq!(msg.timestamp, None);
    }

    #[test]
    fn counter_is_monotonic_and_resumable() {
        let n = normalizer();
        let first = n.normalize(&record("Family", "Alice", "a")).unwrap();
        assert!(n.normalize(&RawRecord::default()).is_err());
        let second = n.normalize(&record("Family", "Alice", "b")).unwrap();
        assert_eq!((first.scan_sequence, second.scan_sequence), (1, 2));

        n.resume_after(41);
        assert_eq!(n.peek_sequence(), 42);
        n.resume_after(5);
        assert_eq!(n.peek_sequence(), 42);
    }

    #[test]
    fn bucket_floors_negative_epochs() {
        let ts = Utc.timestamp_opt(-30, 0).unwrap();
        assert_eq!(timestamp_bucket(ts, 60), -60);
    }

    proptest! {
        #[test]
        fn normalizing_twice_yields_same_identity(
            chat in "[A-Za-z ]{1,12}",
            sender in "[A-Za-z ]{0,12}",
            body in "[a-z0-9 ]{1,40}",
            secs in 0i64..4_000_000_000,
            seq_a in 1u64..1_000_000,
            seq_b in 1u64..1_000_000,
        ) {
            prop_assume!(!chat.trim().is_empty() && !body.trim().is_empty());
            let raw = RawRecord {
                chat_id: Some(chat),
                sender: Some(sender),
                body: Some(body),
                timestamp: Utc.timestamp_opt(secs, 0).single(),
                ..Default::default()
            };
            let a = normalize(&raw, seq_a, 60).unwrap();
            let b = Normalizer::new(Duration::from_secs(60)).normalize(&raw).unwrap();
            prop_assert_eq!(&a.identity, &b.identity);
            prop_assert_eq!(a.identity, normalize(&raw, seq_b, 60).unwrap().identity);
        }
    }
}
