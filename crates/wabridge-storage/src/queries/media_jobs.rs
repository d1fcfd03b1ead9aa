// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media job table operations.

use rusqlite::params;
use wabridge_core::WabridgeError;
use wabridge_core::types::{MediaJob, MediaStatus, Message, MessageIdentity};

use crate::database::{Database, map_tr_err};
use crate::rows::{fmt_opt_ts, get_enum, get_message, get_opt_ts};

/// Inserts a job or overwrites the stored state of an existing one.
pub async fn upsert(db: &Database, job: &MediaJob) -> Result<(), WabridgeError> {
    let job = job.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO media_jobs
                     (message_identity, chat_id, media_ref, status, attempt_count, last_attempt_at, last_error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(message_identity) DO UPDATE SET
                     status = excluded.status,
                     attempt_count = excluded.attempt_count,
                     last_attempt_at = excluded.last_attempt_at,
                     last_error = excluded.last_error",
                params![
                    job.message_identity.0,
                    job.chat_id,
                    job.media_ref,
                    job.status.to_string(),
                    job.attempt_count,
                    fmt_opt_ts(job.last_attempt_at.as_ref()),
                    job.last_error,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Returns the job of one message.
pub async fn get(db: &Database, identity: &MessageIdentity) -> Result<Option<MediaJob>, WabridgeError> {
    let identity = identity.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT message_identity, chat_id, media_ref, status, attempt_count,
                        last_attempt_at, last_error
                 FROM media_jobs WHERE message_identity = ?1",
            )?;
            let mut rows = stmt.query(params![identity])?;
            match rows.next()? {
                Some(row) => Ok(Some(MediaJob {
                    message_identity: MessageIdentity(row.get(0)?),
                    chat_id: row.get(1)?,
                    media_ref: row.get(2)?,
                    status: get_enum::<MediaStatus>(row, 3)?,
                    attempt_count: row.get(4)?,
                    last_attempt_at: get_opt_ts(row, 5)?,
                    last_error: row.get(6)?,
                })),
                None => Ok(None),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Deletes the job of one message.
pub async fn delete(db: &Database, identity: &MessageIdentity) -> Result<(), WabridgeError> {
    let identity = identity.0.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM media_jobs WHERE message_identity = ?1",
                params![identity],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Reverts jobs interrupted mid-download to `pending`.
///
/// The interrupted attempt is not charged against the retry budget.
pub async fn reset_downloading(db: &Database) -> Result<u64, WabridgeError> {
    db.connection()
        .call(|conn| {
            let changed = conn.execute(
                "UPDATE media_jobs
                 SET status = 'pending', attempt_count = MAX(attempt_count - 1, 0)
                 WHERE status = 'downloading'",
                [],
            )?;
            Ok(changed as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Delivered messages whose media never followed.
///
/// Covers jobs left `pending` by a text-first delivery and `ready` jobs whose
/// bytes were lost with the process. Ordered by scan sequence.
pub async fn awaiting_follow_up(db: &Database) -> Result<Vec<Message>, WabridgeError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT d.message_json FROM media_jobs m
                 JOIN dedup_index d ON d.identity = m.message_identity
                 WHERE d.state = 'delivered' AND m.status IN ('pending', 'ready')
                 ORDER BY d.scan_sequence ASC",
            )?;
            let rows = stmt.query_map([], |row| get_message(row, 0))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
