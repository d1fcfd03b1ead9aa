// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dedup index operations.
//!
//! The dedup index is also the outbox: a `pending` row carries the
//! serialized message until the delivery is recorded.

use chrono::{DateTime, Utc};
use rusqlite::params;
use wabridge_core::WabridgeError;
use wabridge_core::types::{
    DedupEntry, DedupState, DeliveryRecord, FailedMessage, Message, MessageIdentity,
};

use crate::database::{Database, map_tr_err};
use crate::rows::{fmt_ts, get_enum, get_message, get_ts, message_json};

/// Inserts a newly seen message in state `pending`.
///
/// Returns `false` without touching the row if the identity already exists.
pub async fn insert_seen(
    db: &Database,
    message: &Message,
    seen_at: DateTime<Utc>,
) -> Result<bool, WabridgeError> {
    let identity = message.identity.0.clone();
    let chat_id = message.chat_id.clone();
    let scan_sequence = message.scan_sequence as i64;
    let seen_at = fmt_ts(&seen_at);
    let json = message_json(message).map_err(WabridgeError::persistence)?;

    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO dedup_index
                     (identity, chat_id, scan_sequence, state, message_json, first_seen_at, last_seen_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?5)
                 ON CONFLICT(identity) DO NOTHING",
                params![identity, chat_id, scan_sequence, json, seen_at],
            )?;
            Ok(inserted == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Refreshes `last_seen_at` for a batch of identities in one transaction.
pub async fn touch_seen(
    db: &Database,
    touches: &[(MessageIdentity, DateTime<Utc>)],
) -> Result<(), WabridgeError> {
    if touches.is_empty() {
        return Ok(());
    }
    let touches: Vec<(String, String)> = touches
        .iter()
        .map(|(id, at)| (id.0.clone(), fmt_ts(at)))
        .collect();

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "UPDATE dedup_index SET last_seen_at = ?2
                     WHERE identity = ?1 AND last_seen_at < ?2",
                )?;
                for (identity, at) in &touches {
                    stmt.execute(params![identity, at])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Loads the whole index for the in-memory membership cache.
pub async fn load_index(db: &Database) -> Result<Vec<DedupEntry>, WabridgeError> {
    db.connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare("SELECT identity, chat_id, state, last_seen_at FROM dedup_index")?;
            let rows = stmt.query_map([], |row| {
                Ok(DedupEntry {
                    identity: MessageIdentity(row.get(0)?),
                    chat_id: row.get(1)?,
                    state: get_enum::<DedupState>(row, 2)?,
                    last_seen_at: get_ts(row, 3)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Returns every `pending` message, in scan order.
pub async fn pending_messages(db: &Database) -> Result<Vec<Message>, WabridgeError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT message_json FROM dedup_index
                 WHERE state = 'pending'
                 ORDER BY scan_sequence ASC",
            )?;
            let rows = stmt.query_map([], |row| get_message(row, 0))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Largest scan sequence recorded in the index or any chat cursor.
pub async fn max_scan_sequence(db: &Database) -> Result<Option<u64>, WabridgeError> {
    let max: Option<i64> = db
        .connection()
        .call(|conn| {
            conn.query_row(
                "SELECT MAX(seq) FROM (
                     SELECT MAX(scan_sequence) AS seq FROM dedup_index
                     UNION ALL
                     SELECT MAX(last_delivered_scan_sequence) AS seq FROM chat_cursors
                 )",
                [],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(max.map(|m| m.max(0) as u64))
}

/// Moves an identity to `failed`.
pub async fn mark_failed(
    db: &Database,
    identity: &MessageIdentity,
    reason: &str,
) -> Result<(), WabridgeError> {
    let identity = identity.0.clone();
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE dedup_index SET state = 'failed', failure_reason = ?2
                 WHERE identity = ?1",
                params![identity, reason],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Moves a `failed` identity back to `pending`.
pub async fn retry_failed(db: &Database, identity: &MessageIdentity) -> Result<bool, WabridgeError> {
    let identity = identity.0.clone();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE dedup_index SET state = 'pending', failure_reason = NULL
                 WHERE identity = ?1 AND state = 'failed'",
                params![identity],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Deletes settled entries last seen before `cutoff`, along with their
/// terminal media jobs. Pending entries are never evicted.
pub async fn evict_seen_before(
    db: &Database,
    cutoff: DateTime<Utc>,
) -> Result<Vec<MessageIdentity>, WabridgeError> {
    let cutoff = fmt_ts(&cutoff);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let evicted: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT identity FROM dedup_index
                     WHERE state != 'pending' AND last_seen_at < ?1",
                )?;
                let rows = stmt.query_map(params![cutoff], |row| row.get(0))?;
                rows.collect::<Result<_, _>>()?
            };
            tx.execute(
                "DELETE FROM media_jobs
                 WHERE status IN ('ready', 'failed')
                   AND message_identity IN (
                       SELECT identity FROM dedup_index
                       WHERE state != 'pending' AND last_seen_at < ?1)",
                params![cutoff],
            )?;
            tx.execute(
                "DELETE FROM dedup_index WHERE state != 'pending' AND last_seen_at < ?1",
                params![cutoff],
            )?;
            tx.commit()?;
            Ok(evicted.into_iter().map(MessageIdentity).collect())
        })
        .await
        .map_err(map_tr_err)
}

/// Records a confirmed delivery in one transaction: appends the delivery
/// record, flips the dedup entry to `delivered`, and advances the chat cursor.
///
/// Appending the same record twice is a no-op. A message forwarded again
/// after eviction is appended as a new row.
pub async fn record_delivery(
    db: &Database,
    record: &DeliveryRecord,
    scan_sequence: u64,
) -> Result<(), WabridgeError> {
    let record = record.clone();
    let scan_sequence = scan_sequence as i64;
    db.connection()
        .call(move |conn| {
            let delivered_at = fmt_ts(&record.delivered_at);
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO deliveries
                     (message_identity, chat_id, sender_name, sender_phone, direction, body,
                      message_timestamp, had_media, sink_message_id, delivered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(message_identity, delivered_at) DO NOTHING",
                params![
                    record.message_identity.0,
                    record.chat_id,
                    record.sender_name,
                    record.sender_phone,
                    record.direction.to_string(),
                    record.body,
                    record.message_timestamp.as_ref().map(fmt_ts),
                    record.had_media,
                    record.sink_message_id,
                    delivered_at,
                ],
            )?;
            tx.execute(
                "UPDATE dedup_index
                 SET state = 'delivered', delivered_at = ?2, failure_reason = NULL
                 WHERE identity = ?1",
                params![record.message_identity.0, delivered_at],
            )?;
            tx.execute(
                "INSERT INTO chat_cursors (chat_id, last_delivered_scan_sequence, pending_count, last_delivered_at)
                 VALUES (?1, ?2, 0, ?3)
                 ON CONFLICT(chat_id) DO UPDATE SET
                     last_delivered_scan_sequence =
                         MAX(last_delivered_scan_sequence, excluded.last_delivered_scan_sequence),
                     last_delivered_at = excluded.last_delivered_at",
                params![record.chat_id, scan_sequence, delivered_at],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Messages whose delivery was abandoned, newest first.
pub async fn failed_messages(db: &Database, limit: u32) -> Result<Vec<FailedMessage>, WabridgeError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT message_json, failure_reason, first_seen_at FROM dedup_index
                 WHERE state = 'failed'
                 ORDER BY first_seen_at DESC, scan_sequence DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| {
                Ok(FailedMessage {
                    message: get_message(row, 0)?,
                    reason: row.get(1)?,
                    first_seen_at: get_ts(row, 2)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Current state of one identity, if present.
pub async fn state_of(
    db: &Database,
    identity: &MessageIdentity,
) -> Result<Option<DedupState>, WabridgeError> {
    let identity = identity.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare("SELECT state FROM dedup_index WHERE identity = ?1")?;
            let mut rows = stmt.query(params![identity])?;
            match rows.next()? {
                Some(row) => Ok(Some(get_enum::<DedupState>(row, 0)?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;
    use wabridge_core::types::{Direction, SinkMessageId};

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn message(id: &str, chat: &str, seq: u64) -> Message {
        Message {
            identity: MessageIdentity(id.to_string()),
            chat_id: chat.to_string(),
            sender_name: "Alice".to_string(),
            sender_phone: Some("491512345678".to_string()),
            direction: Direction::Incoming,
            timestamp: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()),
            body: format!("body {id}"),
            media_ref: None,
            scan_sequence: seq,
        }
    }

    #[tokio::test]
    async fn insert_seen_is_idempotent() {
        let (db, _dir) = setup_db().await;
        let m = message("a", "Family", 1);

        assert!(insert_seen(&db, &m, Utc::now()).await.unwrap());
        assert!(!insert_seen(&db, &m, Utc::now()).await.unwrap());

        let pending = pending_messages(&db).await.unwrap();
        assert_eq!(pending, vec![m]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn record_delivery_moves_entry_out_of_pending() {
        let (db, _dir) = setup_db().await;
        let m = message("a", "Family", 7);
        insert_seen(&db, &m, Utc::now()).await.unwrap();

        let record = DeliveryRecord::for_message(&m, SinkMessageId("42".into()), Utc::now());
        record_delivery(&db, &record, m.scan_sequence).await.unwrap();
        // Recording twice must not fail or duplicate.
        record_delivery(&db, &record, m.scan_sequence).await.unwrap();

        assert!(pending_messages(&db).await.unwrap().is_empty());
        assert_eq!(
            state_of(&db, &m.identity).await.unwrap(),
            Some(DedupState::Delivered)
        );
        let count: i64 = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM deliveries", [], |row| row.get(0))
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(max_scan_sequence(&db).await.unwrap(), Some(7));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_entries_can_be_retried() {
        let (db, _dir) = setup_db().await;
        let m = message("a", "Family", 1);
        insert_seen(&db, &m, Utc::now()).await.unwrap();

        mark_failed(&db, &m.identity, "chat not found").await.unwrap();
        assert!(pending_messages(&db).await.unwrap().is_empty());

        let failed = failed_messages(&db, 10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].reason.as_deref(), Some("chat not found"));

        assert!(retry_failed(&db, &m.identity).await.unwrap());
        assert!(!retry_failed(&db, &m.identity).await.unwrap());
        assert_eq!(pending_messages(&db).await.unwrap().len(), 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn eviction_skips_pending_and_recently_seen() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let old = now - Duration::days(10);

        let delivered_old = message("old", "Family", 1);
        let pending_old = message("pending", "Family", 2);
        let delivered_touched = message("touched", "Family", 3);
        for m in [&delivered_old, &pending_old, &delivered_touched] {
            insert_seen(&db, m, old).await.unwrap();
        }
        for m in [&delivered_old, &delivered_touched] {
            let record = DeliveryRecord::for_message(m, SinkMessageId("1".into()), old);
            record_delivery(&db, &record, m.scan_sequence).await.unwrap();
        }
        touch_seen(&db, &[(delivered_touched.identity.clone(), now)])
            .await
            .unwrap();

        let evicted = evict_seen_before(&db, now - Duration::days(7)).await.unwrap();
        assert_eq!(evicted, vec![delivered_old.identity.clone()]);

        let remaining: Vec<MessageIdentity> = load_index(&db)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.identity)
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&pending_old.identity));
        assert!(remaining.contains(&delivered_touched.identity));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn message_forwarded_again_after_eviction_is_logged_twice() {
        let (db, _dir) = setup_db().await;
        let first_at = Utc::now() - Duration::days(10);
        let m = message("a", "Family", 1);

        insert_seen(&db, &m, first_at).await.unwrap();
        let first = DeliveryRecord::for_message(&m, SinkMessageId("1".into()), first_at);
        record_delivery(&db, &first, m.scan_sequence).await.unwrap();
        assert_eq!(
            evict_seen_before(&db, Utc::now() - Duration::days(7)).await.unwrap(),
            vec![m.identity.clone()]
        );

        // The source shows the message again; the gate treats it as new.
        let again = Message {
            scan_sequence: 9,
            ..m.clone()
        };
        let second_at = Utc::now();
        assert!(insert_seen(&db, &again, second_at).await.unwrap());
        let second = DeliveryRecord::for_message(&again, SinkMessageId("2".into()), second_at);
        record_delivery(&db, &second, again.scan_sequence).await.unwrap();

        let count: i64 = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM deliveries", [], |row| row.get(0))
            })
            .await
            .unwrap();
        assert_eq!(count, 2);
        let latest = crate::queries::deliveries::get(&db, &m.identity)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.sink_message_id, "2");
        db.close().await.unwrap();
    }
}
