// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only queries over the delivery log.
//!
//! Appends happen only through [`super::dedup::record_delivery`] so the log,
//! the dedup state and the cursor move together.

use chrono::{DateTime, Utc};
use rusqlite::params;
use wabridge_core::WabridgeError;
use wabridge_core::types::{
    ChatSummary, ContactSummary, DeliveryRecord, ForwardStats, MessageIdentity,
};

use crate::database::{Database, map_tr_err};
use crate::rows::{DELIVERY_COLUMNS, delivery_from_row, fmt_ts, get_ts, get_u64};

/// Most recent delivery record of one message.
pub async fn get(
    db: &Database,
    identity: &MessageIdentity,
) -> Result<Option<DeliveryRecord>, WabridgeError> {
    let identity = identity.0.clone();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries
                 WHERE message_identity = ?1
                 ORDER BY id DESC LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![identity])?;
            match rows.next()? {
                Some(row) => Ok(Some(delivery_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Last `limit` deliveries whose sender name (case-insensitive) or phone
/// contains `term`, returned oldest first.
pub async fn for_contact(
    db: &Database,
    term: &str,
    limit: u32,
) -> Result<Vec<DeliveryRecord>, WabridgeError> {
    let term = term.to_lowercase();
    let mut records = db
        .connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries
                 WHERE instr(lower(sender_name), ?1) > 0
                    OR instr(IFNULL(sender_phone, ''), ?1) > 0
                 ORDER BY id DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![term, limit as i64], delivery_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)?;
    records.reverse();
    Ok(records)
}

/// Last `limit` deliveries of one chat, oldest first.
pub async fn for_chat(
    db: &Database,
    chat_id: &str,
    limit: u32,
) -> Result<Vec<DeliveryRecord>, WabridgeError> {
    let chat_id = chat_id.to_string();
    let mut records = db
        .connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries
                 WHERE chat_id = ?1 ORDER BY id DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![chat_id, limit as i64], delivery_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)?;
    records.reverse();
    Ok(records)
}

/// Deliveries confirmed in `[from, to)`, oldest first.
pub async fn between(
    db: &Database,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<DeliveryRecord>, WabridgeError> {
    let from = fmt_ts(&from);
    let to = fmt_ts(&to);
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries
                 WHERE delivered_at >= ?1 AND delivered_at < ?2
                 ORDER BY delivered_at ASC, id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![from, to], delivery_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Chats ordered by most recent delivery.
pub async fn recent_chats(db: &Database, limit: u32) -> Result<Vec<ChatSummary>, WabridgeError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT chat_id, COUNT(*), MAX(delivered_at) AS last_at
                 FROM deliveries
                 GROUP BY chat_id
                 ORDER BY last_at DESC, chat_id ASC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| {
                Ok(ChatSummary {
                    chat_id: row.get(0)?,
                    message_count: get_u64(row, 1)?,
                    last_delivered_at: get_ts(row, 2)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Distinct senders of incoming deliveries, optionally filtered by a
/// case-insensitive name or phone substring.
pub async fn contacts(
    db: &Database,
    term: Option<&str>,
) -> Result<Vec<ContactSummary>, WabridgeError> {
    let term = term.map(str::to_lowercase).unwrap_or_default();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT sender_name, sender_phone, COUNT(*), MAX(delivered_at)
                 FROM deliveries
                 WHERE direction = 'incoming'
                   AND (?1 = ''
                        OR instr(lower(sender_name), ?1) > 0
                        OR instr(IFNULL(sender_phone, ''), ?1) > 0)
                 GROUP BY sender_name, sender_phone
                 ORDER BY sender_name COLLATE NOCASE ASC",
            )?;
            let rows = stmt.query_map(params![term], |row| {
                Ok(ContactSummary {
                    sender_name: row.get(0)?,
                    sender_phone: row.get(1)?,
                    message_count: get_u64(row, 2)?,
                    last_delivered_at: get_ts(row, 3)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Aggregate counters across the delivery log, the dedup index and media jobs.
pub async fn stats(db: &Database) -> Result<ForwardStats, WabridgeError> {
    db.connection()
        .call(|conn| {
            conn.query_row(
                "SELECT
                     (SELECT COUNT(DISTINCT chat_id) FROM deliveries),
                     (SELECT COUNT(*) FROM (
                          SELECT 1 FROM deliveries WHERE direction = 'incoming'
                          GROUP BY sender_name, sender_phone)),
                     (SELECT COUNT(*) FROM deliveries),
                     (SELECT COUNT(*) FROM dedup_index WHERE state = 'pending'),
                     (SELECT COUNT(*) FROM dedup_index WHERE state = 'failed'),
                     (SELECT COUNT(*) FROM media_jobs WHERE status = 'failed')",
                [],
                |row| {
                    Ok(ForwardStats {
                        active_chats: get_u64(row, 0)?,
                        contacts: get_u64(row, 1)?,
                        delivered: get_u64(row, 2)?,
                        pending: get_u64(row, 3)?,
                        failed: get_u64(row, 4)?,
                        media_failed: get_u64(row, 5)?,
                    })
                },
            )
        })
        .await
        .map_err(map_tr_err)
}
